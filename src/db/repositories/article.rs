//! Article repository
//!
//! Articles, their category and tag pivots, and the dynamic listing query.
//! Soft-deleted rows are still returned by the id/slug getters; callers
//! decide visibility.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;

use super::category::CategoryRow;
use super::tag::TagRow;
use crate::db::{
    bind_all, like_pattern, placeholders, with_pool, BindValue, DynDatabasePool, LastInsertId,
};
use crate::models::{Article, ArticleFilter, ArticleSort, Category, ListParams, Tag};

#[async_trait]
pub trait ArticleRepository: Send + Sync {
    async fn create(&self, article: &Article) -> Result<Article>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Article>>;

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Article>>;

    /// Persist every mutable column of `article`
    async fn update(&self, article: &Article) -> Result<Article>;

    /// Whether `slug` is taken by an article other than `except_id`
    async fn slug_exists(&self, slug: &str, except_id: Option<i64>) -> Result<bool>;

    /// Filtered page plus total. With `published_only` the status and
    /// trashed filters are ignored.
    async fn list(
        &self,
        filter: &ArticleFilter,
        published_only: bool,
        params: &ListParams,
    ) -> Result<(Vec<Article>, i64)>;

    async fn increment_view_count(&self, id: i64) -> Result<()>;

    /// Returns the new report count
    async fn increment_report_count(&self, id: i64) -> Result<i64>;

    async fn soft_delete(&self, id: i64) -> Result<bool>;

    async fn restore(&self, id: i64) -> Result<bool>;

    /// Remove the row and its pivots
    async fn force_delete(&self, id: i64) -> Result<bool>;

    async fn sync_categories(&self, article_id: i64, category_ids: &[i64]) -> Result<()>;

    async fn sync_tags(&self, article_id: i64, tag_ids: &[i64]) -> Result<()>;

    /// Categories of several articles in one query
    async fn categories_for(&self, article_ids: &[i64]) -> Result<HashMap<i64, Vec<Category>>>;

    /// Tags of several articles in one query
    async fn tags_for(&self, article_ids: &[i64]) -> Result<HashMap<i64, Vec<Tag>>>;
}

pub struct SqlxArticleRepository {
    pool: DynDatabasePool,
}

impl SqlxArticleRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn ArticleRepository> {
        Arc::new(Self::new(pool))
    }

    async fn find_one(&self, column: &str, bind: BindValue) -> Result<Option<Article>> {
        let sql = format!(
            "SELECT {} FROM articles a WHERE a.{} = ?",
            prefixed_columns(),
            column
        );
        let binds = [bind];
        let row = with_pool!(self.pool, pool => {
            bind_all!(sqlx::query_as::<_, ArticleRow>(&sql), binds)
                .fetch_optional(pool)
                .await
                .with_context(|| format!("Failed to get article by {}", column))?
        });
        row.map(Article::try_from).transpose()
    }

    async fn sync_pivot(
        &self,
        table: &'static str,
        column: &'static str,
        article_id: i64,
        ids: &[i64],
    ) -> Result<()> {
        let delete_sql = format!("DELETE FROM {} WHERE article_id = ?", table);
        let insert_sql = format!("INSERT INTO {} (article_id, {}) VALUES (?, ?)", table, column);

        let mut unique = ids.to_vec();
        unique.sort_unstable();
        unique.dedup();

        with_pool!(self.pool, pool => {
            let mut tx = pool.begin().await.context("Failed to begin transaction")?;
            sqlx::query(&delete_sql)
                .bind(article_id)
                .execute(&mut *tx)
                .await
                .with_context(|| format!("Failed to clear {}", table))?;
            for id in &unique {
                sqlx::query(&insert_sql)
                    .bind(article_id)
                    .bind(*id)
                    .execute(&mut *tx)
                    .await
                    .with_context(|| format!("Failed to insert into {}", table))?;
            }
            tx.commit().await.context("Failed to commit pivot sync")?;
        });
        Ok(())
    }
}

const ARTICLE_COLUMNS: &[&str] = &[
    "id",
    "slug",
    "title",
    "excerpt",
    "content",
    "content_html",
    "author_id",
    "status",
    "is_featured",
    "view_count",
    "report_count",
    "approved_by",
    "approved_at",
    "rejection_reason",
    "published_at",
    "deleted_at",
    "created_at",
    "updated_at",
];

fn prefixed_columns() -> String {
    ARTICLE_COLUMNS
        .iter()
        .map(|c| format!("a.{}", c))
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(sqlx::FromRow)]
struct ArticleRow {
    id: i64,
    slug: String,
    title: String,
    excerpt: Option<String>,
    content: String,
    content_html: String,
    author_id: i64,
    status: String,
    is_featured: bool,
    view_count: i64,
    report_count: i64,
    approved_by: Option<i64>,
    approved_at: Option<DateTime<Utc>>,
    rejection_reason: Option<String>,
    published_at: Option<DateTime<Utc>>,
    deleted_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ArticleRow> for Article {
    type Error = anyhow::Error;

    fn try_from(row: ArticleRow) -> Result<Self> {
        Ok(Article {
            status: row
                .status
                .parse()
                .with_context(|| format!("Invalid status for article {}", row.id))?,
            id: row.id,
            slug: row.slug,
            title: row.title,
            excerpt: row.excerpt,
            content: row.content,
            content_html: row.content_html,
            author_id: row.author_id,
            is_featured: row.is_featured,
            view_count: row.view_count,
            report_count: row.report_count,
            approved_by: row.approved_by,
            approved_at: row.approved_at,
            rejection_reason: row.rejection_reason,
            published_at: row.published_at,
            deleted_at: row.deleted_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ArticleCategoryRow {
    article_id: i64,
    #[sqlx(flatten)]
    category: CategoryRow,
}

#[derive(sqlx::FromRow)]
struct ArticleTagRow {
    article_id: i64,
    #[sqlx(flatten)]
    tag: TagRow,
}

/// WHERE clause and binds for a listing
fn build_filter(filter: &ArticleFilter, published_only: bool) -> (String, Vec<BindValue>) {
    let mut sql = String::from(" WHERE 1 = 1");
    let mut binds = Vec::new();

    if published_only {
        sql.push_str(" AND a.status = 'published' AND a.deleted_at IS NULL");
    } else {
        if filter.trashed == Some(true) {
            sql.push_str(" AND a.deleted_at IS NOT NULL");
        } else {
            sql.push_str(" AND a.deleted_at IS NULL");
        }
        if let Some(status) = filter.status {
            sql.push_str(" AND a.status = ?");
            binds.push(BindValue::Text(status.as_str().to_string()));
        }
        match filter.reported {
            Some(true) => sql.push_str(" AND a.report_count > 0"),
            Some(false) => sql.push_str(" AND a.report_count = 0"),
            None => {}
        }
    }

    if let Some(category) = filter.category.as_deref().filter(|s| !s.is_empty()) {
        sql.push_str(
            " AND EXISTS (SELECT 1 FROM article_categories ac JOIN categories c ON c.id = ac.category_id \
             WHERE ac.article_id = a.id AND c.slug = ?)",
        );
        binds.push(BindValue::Text(category.to_string()));
    }
    if let Some(tag) = filter.tag.as_deref().filter(|s| !s.is_empty()) {
        sql.push_str(
            " AND EXISTS (SELECT 1 FROM article_tags atg JOIN tags t ON t.id = atg.tag_id \
             WHERE atg.article_id = a.id AND t.slug = ?)",
        );
        binds.push(BindValue::Text(tag.to_string()));
    }
    if let Some(author_id) = filter.author_id {
        sql.push_str(" AND a.author_id = ?");
        binds.push(BindValue::Int(author_id));
    }
    if let Some(search) = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        sql.push_str(
            " AND (a.title LIKE ? ESCAPE '!' OR a.excerpt LIKE ? ESCAPE '!' OR a.content LIKE ? ESCAPE '!')",
        );
        let pattern = like_pattern(search);
        for _ in 0..3 {
            binds.push(BindValue::Text(pattern.clone()));
        }
    }
    match filter.featured {
        Some(true) => sql.push_str(" AND a.is_featured = 1"),
        Some(false) => sql.push_str(" AND a.is_featured = 0"),
        None => {}
    }

    (sql, binds)
}

fn order_clause(sort: ArticleSort) -> &'static str {
    match sort {
        ArticleSort::Latest => " ORDER BY COALESCE(a.published_at, a.created_at) DESC, a.id DESC",
        ArticleSort::Popular => " ORDER BY a.view_count DESC, a.id DESC",
        ArticleSort::Oldest => " ORDER BY COALESCE(a.published_at, a.created_at) ASC, a.id ASC",
    }
}

#[async_trait]
impl ArticleRepository for SqlxArticleRepository {
    async fn create(&self, article: &Article) -> Result<Article> {
        let now = Utc::now();
        let id = with_pool!(self.pool, pool => {
            sqlx::query(
                r#"
                INSERT INTO articles (slug, title, excerpt, content, content_html, author_id, status,
                                      is_featured, view_count, report_count, approved_by, approved_at,
                                      rejection_reason, published_at, deleted_at, created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&article.slug)
            .bind(&article.title)
            .bind(&article.excerpt)
            .bind(&article.content)
            .bind(&article.content_html)
            .bind(article.author_id)
            .bind(article.status.as_str())
            .bind(article.is_featured)
            .bind(article.view_count)
            .bind(article.report_count)
            .bind(article.approved_by)
            .bind(article.approved_at)
            .bind(&article.rejection_reason)
            .bind(article.published_at)
            .bind(article.deleted_at)
            .bind(now)
            .bind(now)
            .execute(pool)
            .await
            .context("Failed to create article")?
            .last_id()
        });

        Ok(Article {
            id,
            created_at: now,
            updated_at: now,
            ..article.clone()
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Article>> {
        self.find_one("id", BindValue::Int(id)).await
    }

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Article>> {
        self.find_one("slug", BindValue::Text(slug.to_string())).await
    }

    async fn update(&self, article: &Article) -> Result<Article> {
        let now = Utc::now();
        with_pool!(self.pool, pool => {
            sqlx::query(
                r#"
                UPDATE articles
                SET slug = ?, title = ?, excerpt = ?, content = ?, content_html = ?, status = ?,
                    is_featured = ?, approved_by = ?, approved_at = ?, rejection_reason = ?,
                    published_at = ?, deleted_at = ?, updated_at = ?
                WHERE id = ?
                "#,
            )
            .bind(&article.slug)
            .bind(&article.title)
            .bind(&article.excerpt)
            .bind(&article.content)
            .bind(&article.content_html)
            .bind(article.status.as_str())
            .bind(article.is_featured)
            .bind(article.approved_by)
            .bind(article.approved_at)
            .bind(&article.rejection_reason)
            .bind(article.published_at)
            .bind(article.deleted_at)
            .bind(now)
            .bind(article.id)
            .execute(pool)
            .await
            .context("Failed to update article")?;
        });

        self.get_by_id(article.id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Article {} not found after update", article.id))
    }

    async fn slug_exists(&self, slug: &str, except_id: Option<i64>) -> Result<bool> {
        let count = with_pool!(self.pool, pool => {
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM articles WHERE slug = ? AND id <> ?")
                .bind(slug)
                .bind(except_id.unwrap_or(0))
                .fetch_one(pool)
                .await
                .context("Failed to check article slug")?
        });
        Ok(count > 0)
    }

    async fn list(
        &self,
        filter: &ArticleFilter,
        published_only: bool,
        params: &ListParams,
    ) -> Result<(Vec<Article>, i64)> {
        let (where_sql, binds) = build_filter(filter, published_only);
        let count_sql = format!("SELECT COUNT(*) FROM articles a{}", where_sql);
        let list_sql = format!(
            "SELECT {} FROM articles a{}{} LIMIT ? OFFSET ?",
            prefixed_columns(),
            where_sql,
            order_clause(filter.sort)
        );

        let (rows, total) = with_pool!(self.pool, pool => {
            let total: i64 = bind_all!(sqlx::query_scalar(&count_sql), binds)
                .fetch_one(pool)
                .await
                .context("Failed to count articles")?;
            let rows: Vec<ArticleRow> = bind_all!(sqlx::query_as(&list_sql), binds)
                .bind(params.limit())
                .bind(params.offset())
                .fetch_all(pool)
                .await
                .context("Failed to list articles")?;
            (rows, total)
        });

        let articles = rows
            .into_iter()
            .map(Article::try_from)
            .collect::<Result<Vec<_>>>()?;
        Ok((articles, total))
    }

    async fn increment_view_count(&self, id: i64) -> Result<()> {
        with_pool!(self.pool, pool => {
            sqlx::query("UPDATE articles SET view_count = view_count + 1 WHERE id = ?")
                .bind(id)
                .execute(pool)
                .await
                .context("Failed to increment view count")?;
        });
        Ok(())
    }

    async fn increment_report_count(&self, id: i64) -> Result<i64> {
        let count = with_pool!(self.pool, pool => {
            sqlx::query("UPDATE articles SET report_count = report_count + 1 WHERE id = ?")
                .bind(id)
                .execute(pool)
                .await
                .context("Failed to increment report count")?;
            sqlx::query_scalar::<_, i64>("SELECT report_count FROM articles WHERE id = ?")
                .bind(id)
                .fetch_one(pool)
                .await
                .context("Failed to read report count")?
        });
        Ok(count)
    }

    async fn soft_delete(&self, id: i64) -> Result<bool> {
        let now = Utc::now();
        let affected = with_pool!(self.pool, pool => {
            sqlx::query("UPDATE articles SET deleted_at = ?, updated_at = ? WHERE id = ? AND deleted_at IS NULL")
                .bind(now)
                .bind(now)
                .bind(id)
                .execute(pool)
                .await
                .context("Failed to soft delete article")?
                .rows_affected()
        });
        Ok(affected > 0)
    }

    async fn restore(&self, id: i64) -> Result<bool> {
        let now = Utc::now();
        let affected = with_pool!(self.pool, pool => {
            sqlx::query("UPDATE articles SET deleted_at = NULL, updated_at = ? WHERE id = ? AND deleted_at IS NOT NULL")
                .bind(now)
                .bind(id)
                .execute(pool)
                .await
                .context("Failed to restore article")?
                .rows_affected()
        });
        Ok(affected > 0)
    }

    async fn force_delete(&self, id: i64) -> Result<bool> {
        let affected = with_pool!(self.pool, pool => {
            let mut tx = pool.begin().await.context("Failed to begin transaction")?;
            sqlx::query("DELETE FROM article_categories WHERE article_id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await
                .context("Failed to delete article categories")?;
            sqlx::query("DELETE FROM article_tags WHERE article_id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await
                .context("Failed to delete article tags")?;
            let affected = sqlx::query("DELETE FROM articles WHERE id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await
                .context("Failed to delete article")?
                .rows_affected();
            tx.commit().await.context("Failed to commit article delete")?;
            affected
        });
        Ok(affected > 0)
    }

    async fn sync_categories(&self, article_id: i64, category_ids: &[i64]) -> Result<()> {
        self.sync_pivot("article_categories", "category_id", article_id, category_ids)
            .await
    }

    async fn sync_tags(&self, article_id: i64, tag_ids: &[i64]) -> Result<()> {
        self.sync_pivot("article_tags", "tag_id", article_id, tag_ids).await
    }

    async fn categories_for(&self, article_ids: &[i64]) -> Result<HashMap<i64, Vec<Category>>> {
        if article_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let sql = format!(
            "SELECT ac.article_id, c.id, c.slug, c.name, c.description, c.created_at \
             FROM article_categories ac JOIN categories c ON c.id = ac.category_id \
             WHERE ac.article_id IN ({}) ORDER BY c.name",
            placeholders(article_ids.len())
        );
        let binds: Vec<BindValue> = article_ids.iter().map(|id| BindValue::Int(*id)).collect();
        let rows = with_pool!(self.pool, pool => {
            bind_all!(sqlx::query_as::<_, ArticleCategoryRow>(&sql), binds)
                .fetch_all(pool)
                .await
                .context("Failed to load article categories")?
        });

        let mut map: HashMap<i64, Vec<Category>> = HashMap::new();
        for row in rows {
            map.entry(row.article_id).or_default().push(row.category.into());
        }
        Ok(map)
    }

    async fn tags_for(&self, article_ids: &[i64]) -> Result<HashMap<i64, Vec<Tag>>> {
        if article_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let sql = format!(
            "SELECT atg.article_id, t.id, t.slug, t.name, t.created_at \
             FROM article_tags atg JOIN tags t ON t.id = atg.tag_id \
             WHERE atg.article_id IN ({}) ORDER BY t.name",
            placeholders(article_ids.len())
        );
        let binds: Vec<BindValue> = article_ids.iter().map(|id| BindValue::Int(*id)).collect();
        let rows = with_pool!(self.pool, pool => {
            bind_all!(sqlx::query_as::<_, ArticleTagRow>(&sql), binds)
                .fetch_all(pool)
                .await
                .context("Failed to load article tags")?
        });

        let mut map: HashMap<i64, Vec<Tag>> = HashMap::new();
        for row in rows {
            map.entry(row.article_id).or_default().push(row.tag.into());
        }
        Ok(map)
    }
}
