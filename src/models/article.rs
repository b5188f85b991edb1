//! Article model
//!
//! Articles move through an editorial workflow:
//! `draft` → `pending` → `published` | `rejected`, and may be `archived`.
//! Deleting an article only stamps `deleted_at`; it can be restored until it
//! is force-deleted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Category, Tag, UserSummary};

string_enum! {
    ArticleStatus {
        Draft => "draft",
        Pending => "pending",
        Published => "published",
        Rejected => "rejected",
        Archived => "archived",
    }
}

impl Default for ArticleStatus {
    fn default() -> Self {
        Self::Draft
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Article {
    pub id: i64,
    pub slug: String,
    pub title: String,
    pub excerpt: Option<String>,
    /// Markdown source
    pub content: String,
    pub content_html: String,
    pub author_id: i64,
    pub status: ArticleStatus,
    pub is_featured: bool,
    pub view_count: i64,
    pub report_count: i64,
    pub approved_by: Option<i64>,
    pub approved_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Article {
    pub fn new(
        slug: String,
        title: String,
        content: String,
        content_html: String,
        author_id: i64,
        status: ArticleStatus,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            slug,
            title,
            excerpt: None,
            content,
            content_html,
            author_id,
            status,
            is_featured: false,
            view_count: 0,
            report_count: 0,
            approved_by: None,
            approved_at: None,
            rejection_reason: None,
            published_at: None,
            deleted_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_published(&self) -> bool {
        self.status == ArticleStatus::Published && self.deleted_at.is_none()
    }

    pub fn is_trashed(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Mark as published by `approver`, keeping an earlier publication date
    pub fn publish(&mut self, approver: i64) {
        let now = Utc::now();
        self.status = ArticleStatus::Published;
        self.approved_by = Some(approver);
        self.approved_at = Some(now);
        self.rejection_reason = None;
        if self.published_at.is_none() {
            self.published_at = Some(now);
        }
    }
}

/// Article with its author, categories and tags loaded
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArticleWithRelations {
    #[serde(flatten)]
    pub article: Article,
    pub author: Option<UserSummary>,
    pub categories: Vec<Category>,
    pub tags: Vec<Tag>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateArticleInput {
    pub title: String,
    /// Generated from the title when empty
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub excerpt: Option<String>,
    pub content: String,
    #[serde(default)]
    pub status: Option<ArticleStatus>,
    #[serde(default)]
    pub category_ids: Vec<i64>,
    /// Tag names; unknown tags are created
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateArticleInput {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub excerpt: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub status: Option<ArticleStatus>,
    #[serde(default)]
    pub category_ids: Option<Vec<i64>>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArticleSort {
    #[default]
    Latest,
    Popular,
    Oldest,
}

/// Query filters for article listings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArticleFilter {
    /// Category slug
    #[serde(default)]
    pub category: Option<String>,
    /// Tag slug
    #[serde(default)]
    pub tag: Option<String>,
    #[serde(default)]
    pub author_id: Option<i64>,
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub featured: Option<bool>,
    #[serde(default)]
    pub status: Option<ArticleStatus>,
    /// Only articles with at least one report
    #[serde(default)]
    pub reported: Option<bool>,
    /// Soft-deleted articles instead of live ones
    #[serde(default)]
    pub trashed: Option<bool>,
    #[serde(default)]
    pub sort: ArticleSort,
}

impl ArticleFilter {
    /// Stable fragment for cache keys
    pub fn cache_fragment(&self) -> String {
        format!(
            "c={};t={};a={};q={};f={};s={};r={};d={};o={:?}",
            self.category.as_deref().unwrap_or(""),
            self.tag.as_deref().unwrap_or(""),
            self.author_id.map(|v| v.to_string()).unwrap_or_default(),
            self.search.as_deref().unwrap_or(""),
            self.featured.map(|v| v.to_string()).unwrap_or_default(),
            self.status.map(|v| v.as_str()).unwrap_or(""),
            self.reported.map(|v| v.to_string()).unwrap_or_default(),
            self.trashed.map(|v| v.to_string()).unwrap_or_default(),
            self.sort,
        )
    }
}
