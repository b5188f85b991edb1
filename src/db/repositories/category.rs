//! Category repository
//!
//! Article counts only include published, non-deleted articles.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::db::{bind_all, placeholders, with_pool, BindValue, DynDatabasePool, LastInsertId};
use crate::models::{Category, CategoryWithCount};

#[async_trait]
pub trait CategoryRepository: Send + Sync {
    async fn create(&self, category: &Category) -> Result<Category>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Category>>;

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Category>>;

    async fn get_many(&self, ids: &[i64]) -> Result<Vec<Category>>;

    /// Every category, alphabetically, with its published article count
    async fn list_with_counts(&self) -> Result<Vec<CategoryWithCount>>;

    async fn update(&self, category: &Category) -> Result<Category>;

    async fn delete(&self, id: i64) -> Result<bool>;

    /// Whether `slug` is taken by a category other than `except_id`
    async fn slug_exists(&self, slug: &str, except_id: Option<i64>) -> Result<bool>;
}

pub struct SqlxCategoryRepository {
    pool: DynDatabasePool,
}

impl SqlxCategoryRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn CategoryRepository> {
        Arc::new(Self::new(pool))
    }
}

const CATEGORY_COLUMNS: &str = "id, slug, name, description, created_at";

#[derive(sqlx::FromRow)]
pub(super) struct CategoryRow {
    id: i64,
    slug: String,
    name: String,
    description: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<CategoryRow> for Category {
    fn from(row: CategoryRow) -> Self {
        Category {
            id: row.id,
            slug: row.slug,
            name: row.name,
            description: row.description,
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct CategoryCountRow {
    #[sqlx(flatten)]
    category: CategoryRow,
    article_count: i64,
}

#[async_trait]
impl CategoryRepository for SqlxCategoryRepository {
    async fn create(&self, category: &Category) -> Result<Category> {
        let now = Utc::now();
        let id = with_pool!(self.pool, pool => {
            sqlx::query("INSERT INTO categories (slug, name, description, created_at) VALUES (?, ?, ?, ?)")
                .bind(&category.slug)
                .bind(&category.name)
                .bind(&category.description)
                .bind(now)
                .execute(pool)
                .await
                .context("Failed to create category")?
                .last_id()
        });
        Ok(Category {
            id,
            created_at: now,
            ..category.clone()
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Category>> {
        let sql = format!("SELECT {} FROM categories WHERE id = ?", CATEGORY_COLUMNS);
        let row = with_pool!(self.pool, pool => {
            sqlx::query_as::<_, CategoryRow>(&sql)
                .bind(id)
                .fetch_optional(pool)
                .await
                .context("Failed to get category by ID")?
        });
        Ok(row.map(Category::from))
    }

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Category>> {
        let sql = format!("SELECT {} FROM categories WHERE slug = ?", CATEGORY_COLUMNS);
        let row = with_pool!(self.pool, pool => {
            sqlx::query_as::<_, CategoryRow>(&sql)
                .bind(slug)
                .fetch_optional(pool)
                .await
                .context("Failed to get category by slug")?
        });
        Ok(row.map(Category::from))
    }

    async fn get_many(&self, ids: &[i64]) -> Result<Vec<Category>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT {} FROM categories WHERE id IN ({}) ORDER BY name",
            CATEGORY_COLUMNS,
            placeholders(ids.len())
        );
        let binds: Vec<BindValue> = ids.iter().map(|id| BindValue::Int(*id)).collect();
        let rows = with_pool!(self.pool, pool => {
            bind_all!(sqlx::query_as::<_, CategoryRow>(&sql), binds)
                .fetch_all(pool)
                .await
                .context("Failed to load categories")?
        });
        Ok(rows.into_iter().map(Category::from).collect())
    }

    async fn list_with_counts(&self) -> Result<Vec<CategoryWithCount>> {
        let rows = with_pool!(self.pool, pool => {
            sqlx::query_as::<_, CategoryCountRow>(
                r#"
                SELECT c.id, c.slug, c.name, c.description, c.created_at,
                       COUNT(a.id) AS article_count
                FROM categories c
                LEFT JOIN article_categories ac ON ac.category_id = c.id
                LEFT JOIN articles a ON a.id = ac.article_id
                    AND a.status = 'published' AND a.deleted_at IS NULL
                GROUP BY c.id, c.slug, c.name, c.description, c.created_at
                ORDER BY c.name
                "#,
            )
            .fetch_all(pool)
            .await
            .context("Failed to list categories")?
        });
        Ok(rows
            .into_iter()
            .map(|row| CategoryWithCount {
                category: row.category.into(),
                article_count: row.article_count,
            })
            .collect())
    }

    async fn update(&self, category: &Category) -> Result<Category> {
        with_pool!(self.pool, pool => {
            sqlx::query("UPDATE categories SET slug = ?, name = ?, description = ? WHERE id = ?")
                .bind(&category.slug)
                .bind(&category.name)
                .bind(&category.description)
                .bind(category.id)
                .execute(pool)
                .await
                .context("Failed to update category")?;
        });
        self.get_by_id(category.id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Category {} not found after update", category.id))
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let affected = with_pool!(self.pool, pool => {
            sqlx::query("DELETE FROM categories WHERE id = ?")
                .bind(id)
                .execute(pool)
                .await
                .context("Failed to delete category")?
                .rows_affected()
        });
        Ok(affected > 0)
    }

    async fn slug_exists(&self, slug: &str, except_id: Option<i64>) -> Result<bool> {
        let count = with_pool!(self.pool, pool => {
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM categories WHERE slug = ? AND id <> ?")
                .bind(slug)
                .bind(except_id.unwrap_or(0))
                .fetch_one(pool)
                .await
                .context("Failed to check category slug")?
        });
        Ok(count > 0)
    }
}
