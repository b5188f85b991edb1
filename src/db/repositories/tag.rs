//! Tag repository

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::db::{bind_all, placeholders, with_pool, BindValue, DynDatabasePool, LastInsertId};
use crate::models::{Tag, TagWithCount};

#[async_trait]
pub trait TagRepository: Send + Sync {
    async fn create(&self, tag: &Tag) -> Result<Tag>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Tag>>;

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Tag>>;

    /// Tags whose slug is in `slugs`; unknown slugs are skipped
    async fn get_by_slugs(&self, slugs: &[String]) -> Result<Vec<Tag>>;

    /// Every tag with its published article count, most used first
    async fn list_with_counts(&self) -> Result<Vec<TagWithCount>>;

    async fn delete(&self, id: i64) -> Result<bool>;
}

pub struct SqlxTagRepository {
    pool: DynDatabasePool,
}

impl SqlxTagRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn TagRepository> {
        Arc::new(Self::new(pool))
    }
}

#[derive(sqlx::FromRow)]
pub(super) struct TagRow {
    id: i64,
    slug: String,
    name: String,
    created_at: DateTime<Utc>,
}

impl From<TagRow> for Tag {
    fn from(row: TagRow) -> Self {
        Tag {
            id: row.id,
            slug: row.slug,
            name: row.name,
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct TagCountRow {
    #[sqlx(flatten)]
    tag: TagRow,
    article_count: i64,
}

#[async_trait]
impl TagRepository for SqlxTagRepository {
    async fn create(&self, tag: &Tag) -> Result<Tag> {
        let now = Utc::now();
        let id = with_pool!(self.pool, pool => {
            sqlx::query("INSERT INTO tags (slug, name, created_at) VALUES (?, ?, ?)")
                .bind(&tag.slug)
                .bind(&tag.name)
                .bind(now)
                .execute(pool)
                .await
                .context("Failed to create tag")?
                .last_id()
        });
        Ok(Tag {
            id,
            created_at: now,
            ..tag.clone()
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Tag>> {
        let row = with_pool!(self.pool, pool => {
            sqlx::query_as::<_, TagRow>("SELECT id, slug, name, created_at FROM tags WHERE id = ?")
                .bind(id)
                .fetch_optional(pool)
                .await
                .context("Failed to get tag by ID")?
        });
        Ok(row.map(Tag::from))
    }

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Tag>> {
        let row = with_pool!(self.pool, pool => {
            sqlx::query_as::<_, TagRow>("SELECT id, slug, name, created_at FROM tags WHERE slug = ?")
                .bind(slug)
                .fetch_optional(pool)
                .await
                .context("Failed to get tag by slug")?
        });
        Ok(row.map(Tag::from))
    }

    async fn get_by_slugs(&self, slugs: &[String]) -> Result<Vec<Tag>> {
        if slugs.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT id, slug, name, created_at FROM tags WHERE slug IN ({}) ORDER BY name",
            placeholders(slugs.len())
        );
        let binds: Vec<BindValue> = slugs.iter().map(|s| BindValue::Text(s.clone())).collect();
        let rows = with_pool!(self.pool, pool => {
            bind_all!(sqlx::query_as::<_, TagRow>(&sql), binds)
                .fetch_all(pool)
                .await
                .context("Failed to load tags by slug")?
        });
        Ok(rows.into_iter().map(Tag::from).collect())
    }

    async fn list_with_counts(&self) -> Result<Vec<TagWithCount>> {
        let rows = with_pool!(self.pool, pool => {
            sqlx::query_as::<_, TagCountRow>(
                r#"
                SELECT t.id, t.slug, t.name, t.created_at, COUNT(a.id) AS article_count
                FROM tags t
                LEFT JOIN article_tags atg ON atg.tag_id = t.id
                LEFT JOIN articles a ON a.id = atg.article_id
                    AND a.status = 'published' AND a.deleted_at IS NULL
                GROUP BY t.id, t.slug, t.name, t.created_at
                ORDER BY article_count DESC, t.name
                "#,
            )
            .fetch_all(pool)
            .await
            .context("Failed to list tags")?
        });
        Ok(rows
            .into_iter()
            .map(|row| TagWithCount {
                tag: row.tag.into(),
                article_count: row.article_count,
            })
            .collect())
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let affected = with_pool!(self.pool, pool => {
            sqlx::query("DELETE FROM tags WHERE id = ?")
                .bind(id)
                .execute(pool)
                .await
                .context("Failed to delete tag")?
                .rows_affected()
        });
        Ok(affected > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations};

    async fn setup() -> (DynDatabasePool, SqlxTagRepository) {
        let pool = create_test_pool().await.unwrap();
        migrations::run_migrations(&pool).await.unwrap();
        (pool.clone(), SqlxTagRepository::new(pool))
    }

    fn tag(slug: &str) -> Tag {
        Tag {
            id: 0,
            slug: slug.to_string(),
            name: slug.to_uppercase(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_create_and_get_by_slugs() {
        let (_pool, repo) = setup().await;
        repo.create(&tag("async")).await.unwrap();
        repo.create(&tag("tokio")).await.unwrap();

        let found = repo
            .get_by_slugs(&["tokio".into(), "async".into(), "missing".into()])
            .await
            .unwrap();
        assert_eq!(found.len(), 2);
        assert!(repo.get_by_slug("tokio").await.unwrap().is_some());
        assert!(repo.create(&tag("tokio")).await.is_err());
    }

    #[tokio::test]
    async fn test_list_with_counts_orders_by_usage() {
        let (pool, repo) = setup().await;
        let a = repo.create(&tag("alpha")).await.unwrap();
        let b = repo.create(&tag("beta")).await.unwrap();
        let db = pool.as_sqlite().unwrap();

        sqlx::query("INSERT INTO users (username, email, password_hash) VALUES ('u', 'u@x.io', 'h')")
            .execute(db)
            .await
            .unwrap();
        sqlx::query(
            "INSERT INTO articles (slug, title, content, content_html, author_id, status) \
             VALUES ('p', 't', 'c', 'c', 1, 'published')",
        )
        .execute(db)
        .await
        .unwrap();
        sqlx::query("INSERT INTO article_tags (article_id, tag_id) VALUES (1, ?)")
            .bind(b.id)
            .execute(db)
            .await
            .unwrap();

        let list = repo.list_with_counts().await.unwrap();
        assert_eq!(list[0].tag.id, b.id);
        assert_eq!(list[0].article_count, 1);
        assert_eq!(list[1].tag.id, a.id);
        assert_eq!(list[1].article_count, 0);
    }

    #[tokio::test]
    async fn test_delete() {
        let (_pool, repo) = setup().await;
        let t = repo.create(&tag("gone")).await.unwrap();
        assert!(repo.delete(t.id).await.unwrap());
        assert!(repo.get_by_id(t.id).await.unwrap().is_none());
    }
}
