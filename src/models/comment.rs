//! Comment model
//!
//! Comments are one level of a thread tree: `parent_id` points at another
//! comment on the same article.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::UserSummary;

string_enum! {
    CommentStatus {
        Pending => "pending",
        Approved => "approved",
        Rejected => "rejected",
    }
}

impl Default for CommentStatus {
    fn default() -> Self {
        Self::Pending
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    pub id: i64,
    pub article_id: i64,
    pub user_id: i64,
    pub parent_id: Option<i64>,
    pub content: String,
    pub status: CommentStatus,
    pub report_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Comment {
    pub fn new(
        article_id: i64,
        user_id: i64,
        parent_id: Option<i64>,
        content: String,
        status: CommentStatus,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            article_id,
            user_id,
            parent_id,
            content,
            status,
            report_count: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommentWithAuthor {
    #[serde(flatten)]
    pub comment: Comment,
    pub author: Option<UserSummary>,
}

/// Approved comment with its approved replies nested beneath it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommentThread {
    #[serde(flatten)]
    pub comment: Comment,
    pub author: Option<UserSummary>,
    pub replies: Vec<CommentThread>,
}

/// Deepest nesting level a reply is rendered at. Replies below it are
/// attached next to their parent instead of under it.
pub const MAX_REPLY_DEPTH: usize = 8;

impl CommentThread {
    /// Build the reply tree from a flat list ordered by creation time.
    ///
    /// Replies whose parent is absent from the list (rejected or deleted)
    /// are dropped along with their own replies. Nesting stops at
    /// [`MAX_REPLY_DEPTH`].
    pub fn build(comments: Vec<CommentWithAuthor>) -> Vec<CommentThread> {
        use std::collections::HashMap;

        // id -> (slot it was attached under, depth)
        let mut placed: HashMap<i64, (Option<i64>, usize)> = HashMap::new();
        let mut children: HashMap<Option<i64>, Vec<CommentWithAuthor>> = HashMap::new();
        for c in comments {
            let slot = match c.comment.parent_id {
                None => Some((None, 0)),
                Some(parent_id) => placed.get(&parent_id).map(|&(grandparent, depth)| {
                    if depth >= MAX_REPLY_DEPTH {
                        (grandparent, depth)
                    } else {
                        (Some(parent_id), depth + 1)
                    }
                }),
            };
            let Some((parent, depth)) = slot else {
                continue;
            };
            placed.insert(c.comment.id, (parent, depth));
            children.entry(parent).or_default().push(c);
        }

        fn attach(
            parent: Option<i64>,
            children: &mut HashMap<Option<i64>, Vec<CommentWithAuthor>>,
        ) -> Vec<CommentThread> {
            let Some(level) = children.remove(&parent) else {
                return Vec::new();
            };
            level
                .into_iter()
                .map(|c| {
                    let replies = attach(Some(c.comment.id), children);
                    CommentThread {
                        comment: c.comment,
                        author: c.author,
                        replies,
                    }
                })
                .collect()
        }

        attach(None, &mut children)
    }

    pub fn depth(&self) -> usize {
        self.replies.iter().map(|r| 1 + r.depth()).max().unwrap_or(0)
    }

    pub fn count(&self) -> usize {
        1 + self.replies.iter().map(CommentThread::count).sum::<usize>()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateCommentInput {
    pub content: String,
    #[serde(default)]
    pub parent_id: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommentFilter {
    #[serde(default)]
    pub status: Option<CommentStatus>,
    #[serde(default)]
    pub reported: Option<bool>,
    #[serde(default)]
    pub article_id: Option<i64>,
}
