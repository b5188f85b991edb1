//! Comment repository
//!
//! Deleting a comment cascades to its replies through the `parent_id`
//! foreign key.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::db::{bind_all, with_pool, BindValue, DynDatabasePool, LastInsertId};
use crate::models::{Comment, CommentFilter, CommentStatus, ListParams};

#[async_trait]
pub trait CommentRepository: Send + Sync {
    async fn create(&self, comment: &Comment) -> Result<Comment>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Comment>>;

    /// Persist content and status
    async fn update(&self, comment: &Comment) -> Result<Comment>;

    async fn delete(&self, id: i64) -> Result<bool>;

    /// Approved comments of an article, oldest first
    async fn list_approved_for_article(&self, article_id: i64) -> Result<Vec<Comment>>;

    /// Moderation listing, newest first
    async fn list(&self, filter: &CommentFilter, params: &ListParams) -> Result<(Vec<Comment>, i64)>;

    /// Returns the new report count
    async fn increment_report_count(&self, id: i64) -> Result<i64>;
}

pub struct SqlxCommentRepository {
    pool: DynDatabasePool,
}

impl SqlxCommentRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn CommentRepository> {
        Arc::new(Self::new(pool))
    }
}

const COMMENT_COLUMNS: &str =
    "id, article_id, user_id, parent_id, content, status, report_count, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct CommentRow {
    id: i64,
    article_id: i64,
    user_id: i64,
    parent_id: Option<i64>,
    content: String,
    status: String,
    report_count: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<CommentRow> for Comment {
    type Error = anyhow::Error;

    fn try_from(row: CommentRow) -> Result<Self> {
        Ok(Comment {
            status: row
                .status
                .parse()
                .with_context(|| format!("Invalid status for comment {}", row.id))?,
            id: row.id,
            article_id: row.article_id,
            user_id: row.user_id,
            parent_id: row.parent_id,
            content: row.content,
            report_count: row.report_count,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn into_comments(rows: Vec<CommentRow>) -> Result<Vec<Comment>> {
    rows.into_iter().map(Comment::try_from).collect()
}

#[async_trait]
impl CommentRepository for SqlxCommentRepository {
    async fn create(&self, comment: &Comment) -> Result<Comment> {
        let now = Utc::now();
        let id = with_pool!(self.pool, pool => {
            sqlx::query(
                r#"
                INSERT INTO comments (article_id, user_id, parent_id, content, status, report_count,
                                      created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(comment.article_id)
            .bind(comment.user_id)
            .bind(comment.parent_id)
            .bind(&comment.content)
            .bind(comment.status.as_str())
            .bind(comment.report_count)
            .bind(now)
            .bind(now)
            .execute(pool)
            .await
            .context("Failed to create comment")?
            .last_id()
        });

        Ok(Comment {
            id,
            created_at: now,
            updated_at: now,
            ..comment.clone()
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Comment>> {
        let sql = format!("SELECT {} FROM comments WHERE id = ?", COMMENT_COLUMNS);
        let row = with_pool!(self.pool, pool => {
            sqlx::query_as::<_, CommentRow>(&sql)
                .bind(id)
                .fetch_optional(pool)
                .await
                .context("Failed to get comment by ID")?
        });
        row.map(Comment::try_from).transpose()
    }

    async fn update(&self, comment: &Comment) -> Result<Comment> {
        let now = Utc::now();
        with_pool!(self.pool, pool => {
            sqlx::query("UPDATE comments SET content = ?, status = ?, updated_at = ? WHERE id = ?")
                .bind(&comment.content)
                .bind(comment.status.as_str())
                .bind(now)
                .bind(comment.id)
                .execute(pool)
                .await
                .context("Failed to update comment")?;
        });
        self.get_by_id(comment.id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Comment {} not found after update", comment.id))
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let affected = with_pool!(self.pool, pool => {
            sqlx::query("DELETE FROM comments WHERE id = ?")
                .bind(id)
                .execute(pool)
                .await
                .context("Failed to delete comment")?
                .rows_affected()
        });
        Ok(affected > 0)
    }

    async fn list_approved_for_article(&self, article_id: i64) -> Result<Vec<Comment>> {
        let sql = format!(
            "SELECT {} FROM comments WHERE article_id = ? AND status = ? ORDER BY created_at, id",
            COMMENT_COLUMNS
        );
        let rows = with_pool!(self.pool, pool => {
            sqlx::query_as::<_, CommentRow>(&sql)
                .bind(article_id)
                .bind(CommentStatus::Approved.as_str())
                .fetch_all(pool)
                .await
                .context("Failed to list article comments")?
        });
        into_comments(rows)
    }

    async fn list(&self, filter: &CommentFilter, params: &ListParams) -> Result<(Vec<Comment>, i64)> {
        let mut where_sql = String::from(" WHERE 1 = 1");
        let mut binds = Vec::new();

        if let Some(status) = filter.status {
            where_sql.push_str(" AND status = ?");
            binds.push(BindValue::Text(status.as_str().to_string()));
        }
        if let Some(article_id) = filter.article_id {
            where_sql.push_str(" AND article_id = ?");
            binds.push(BindValue::Int(article_id));
        }
        match filter.reported {
            Some(true) => where_sql.push_str(" AND report_count > 0"),
            Some(false) => where_sql.push_str(" AND report_count = 0"),
            None => {}
        }

        let count_sql = format!("SELECT COUNT(*) FROM comments{}", where_sql);
        let list_sql = format!(
            "SELECT {} FROM comments{} ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?",
            COMMENT_COLUMNS, where_sql
        );

        let (rows, total) = with_pool!(self.pool, pool => {
            let total: i64 = bind_all!(sqlx::query_scalar(&count_sql), binds)
                .fetch_one(pool)
                .await
                .context("Failed to count comments")?;
            let rows: Vec<CommentRow> = bind_all!(sqlx::query_as(&list_sql), binds)
                .bind(params.limit())
                .bind(params.offset())
                .fetch_all(pool)
                .await
                .context("Failed to list comments")?;
            (rows, total)
        });

        Ok((into_comments(rows)?, total))
    }

    async fn increment_report_count(&self, id: i64) -> Result<i64> {
        let count = with_pool!(self.pool, pool => {
            sqlx::query("UPDATE comments SET report_count = report_count + 1 WHERE id = ?")
                .bind(id)
                .execute(pool)
                .await
                .context("Failed to increment comment report count")?;
            sqlx::query_scalar::<_, i64>("SELECT report_count FROM comments WHERE id = ?")
                .bind(id)
                .fetch_one(pool)
                .await
                .context("Failed to read comment report count")?
        });
        Ok(count)
    }
}
