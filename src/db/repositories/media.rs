//! Media repository

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::db::{bind_all, like_pattern, with_pool, BindValue, DynDatabasePool, LastInsertId};
use crate::models::{ListParams, Media, MediaFilter};

#[async_trait]
pub trait MediaRepository: Send + Sync {
    async fn create(&self, media: &Media) -> Result<Media>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Media>>;

    async fn list(&self, filter: &MediaFilter, params: &ListParams) -> Result<(Vec<Media>, i64)>;

    async fn update_alt_text(&self, id: i64, alt_text: Option<&str>) -> Result<()>;

    async fn delete(&self, id: i64) -> Result<bool>;
}

pub struct SqlxMediaRepository {
    pool: DynDatabasePool,
}

impl SqlxMediaRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn MediaRepository> {
        Arc::new(Self::new(pool))
    }
}

const MEDIA_COLUMNS: &str =
    "id, user_id, file_name, original_name, mime_type, size, checksum, alt_text, created_at";

#[derive(sqlx::FromRow)]
struct MediaRow {
    id: i64,
    user_id: i64,
    file_name: String,
    original_name: String,
    mime_type: String,
    size: i64,
    checksum: String,
    alt_text: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<MediaRow> for Media {
    fn from(row: MediaRow) -> Self {
        Media {
            id: row.id,
            user_id: row.user_id,
            file_name: row.file_name,
            original_name: row.original_name,
            mime_type: row.mime_type,
            size: row.size,
            checksum: row.checksum,
            alt_text: row.alt_text,
            created_at: row.created_at,
        }
    }
}

#[async_trait]
impl MediaRepository for SqlxMediaRepository {
    async fn create(&self, media: &Media) -> Result<Media> {
        let now = Utc::now();
        let id = with_pool!(self.pool, pool => {
            sqlx::query(
                r#"
                INSERT INTO media (user_id, file_name, original_name, mime_type, size, checksum,
                                   alt_text, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(media.user_id)
            .bind(&media.file_name)
            .bind(&media.original_name)
            .bind(&media.mime_type)
            .bind(media.size)
            .bind(&media.checksum)
            .bind(&media.alt_text)
            .bind(now)
            .execute(pool)
            .await
            .context("Failed to create media record")?
            .last_id()
        });
        Ok(Media {
            id,
            created_at: now,
            ..media.clone()
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Media>> {
        let sql = format!("SELECT {} FROM media WHERE id = ?", MEDIA_COLUMNS);
        let row = with_pool!(self.pool, pool => {
            sqlx::query_as::<_, MediaRow>(&sql)
                .bind(id)
                .fetch_optional(pool)
                .await
                .context("Failed to get media by ID")?
        });
        Ok(row.map(Media::from))
    }

    async fn list(&self, filter: &MediaFilter, params: &ListParams) -> Result<(Vec<Media>, i64)> {
        let mut where_sql = String::from(" WHERE 1 = 1");
        let mut binds = Vec::new();

        if let Some(user_id) = filter.user_id {
            where_sql.push_str(" AND user_id = ?");
            binds.push(BindValue::Int(user_id));
        }
        if let Some(prefix) = filter.mime_prefix.as_deref().filter(|p| !p.is_empty()) {
            // like_pattern wraps in `%..%`; a prefix match only needs the trailing one
            let pattern = like_pattern(prefix);
            where_sql.push_str(" AND mime_type LIKE ? ESCAPE '!'");
            binds.push(BindValue::Text(pattern[1..].to_string()));
        }

        let count_sql = format!("SELECT COUNT(*) FROM media{}", where_sql);
        let list_sql = format!(
            "SELECT {} FROM media{} ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?",
            MEDIA_COLUMNS, where_sql
        );

        let (rows, total) = with_pool!(self.pool, pool => {
            let total: i64 = bind_all!(sqlx::query_scalar(&count_sql), binds)
                .fetch_one(pool)
                .await
                .context("Failed to count media")?;
            let rows: Vec<MediaRow> = bind_all!(sqlx::query_as(&list_sql), binds)
                .bind(params.limit())
                .bind(params.offset())
                .fetch_all(pool)
                .await
                .context("Failed to list media")?;
            (rows, total)
        });

        Ok((rows.into_iter().map(Media::from).collect(), total))
    }

    async fn update_alt_text(&self, id: i64, alt_text: Option<&str>) -> Result<()> {
        with_pool!(self.pool, pool => {
            sqlx::query("UPDATE media SET alt_text = ? WHERE id = ?")
                .bind(alt_text)
                .bind(id)
                .execute(pool)
                .await
                .context("Failed to update alt text")?;
        });
        Ok(())
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let affected = with_pool!(self.pool, pool => {
            sqlx::query("DELETE FROM media WHERE id = ?")
                .bind(id)
                .execute(pool)
                .await
                .context("Failed to delete media record")?
                .rows_affected()
        });
        Ok(affected > 0)
    }
}
