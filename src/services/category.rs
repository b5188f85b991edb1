//! Category service
//!
//! The listing (with published article counts) is cached under
//! `categories:all` and dropped on every category mutation. The seeded
//! `uncategorized` category is permanent.

use std::sync::Arc;

use crate::cache::CacheService;
use crate::db::repositories::CategoryRepository;
use crate::models::{Category, CategoryWithCount, CreateCategoryInput, UpdateCategoryInput};
use crate::services::error::{ServiceError, ServiceResult, Validator};
use crate::services::role::RoleService;
use crate::services::validation::{is_valid_slug, slugify};

const MANAGE_CATEGORIES: &str = "categories.manage";
const LIST_KEY: &str = "categories:all";
const MAX_NAME_LEN: usize = 100;

pub struct CategoryService {
    categories: Arc<dyn CategoryRepository>,
    rbac: Arc<RoleService>,
    cache: CacheService,
}

impl CategoryService {
    pub fn new(
        categories: Arc<dyn CategoryRepository>,
        rbac: Arc<RoleService>,
        cache: CacheService,
    ) -> Self {
        Self {
            categories,
            rbac,
            cache,
        }
    }

    pub async fn list(&self) -> ServiceResult<Vec<CategoryWithCount>> {
        let categories = self.categories.clone();
        self.cache
            .remember(LIST_KEY, || async move {
                Ok::<_, ServiceError>(categories.list_with_counts().await?)
            })
            .await
    }

    pub async fn get_by_slug(&self, slug: &str) -> ServiceResult<Category> {
        self.categories
            .get_by_slug(slug)
            .await?
            .ok_or_else(|| ServiceError::not_found("Category"))
    }

    pub async fn create(&self, actor_id: i64, input: CreateCategoryInput) -> ServiceResult<Category> {
        self.rbac.authorize(actor_id, MANAGE_CATEGORIES).await?;

        let name = input.name.trim().to_string();
        let slug = match input.slug.as_deref().map(str::trim) {
            Some(s) if !s.is_empty() => s.to_string(),
            _ => slugify(&name),
        };
        self.validate(&name, &slug, None).await?;

        let category = Category {
            id: 0,
            slug,
            name,
            description: input.description.filter(|d| !d.trim().is_empty()),
            created_at: chrono::Utc::now(),
        };
        let category = self.categories.create(&category).await?;

        tracing::info!(category_id = category.id, slug = %category.slug, "Category created");
        self.invalidate().await;
        Ok(category)
    }

    pub async fn update(
        &self,
        actor_id: i64,
        id: i64,
        input: UpdateCategoryInput,
    ) -> ServiceResult<Category> {
        self.rbac.authorize(actor_id, MANAGE_CATEGORIES).await?;
        let mut category = self.find(id).await?;

        let name = input
            .name
            .map(|n| n.trim().to_string())
            .unwrap_or_else(|| category.name.clone());
        let slug = match input.slug.as_deref().map(str::trim) {
            Some(s) if !s.is_empty() => s.to_string(),
            _ => category.slug.clone(),
        };
        if category.is_default() && slug != category.slug {
            return Err(ServiceError::field(
                "slug",
                "The slug of the default category cannot be changed",
            ));
        }
        self.validate(&name, &slug, Some(id)).await?;

        category.name = name;
        category.slug = slug;
        if let Some(description) = input.description {
            category.description = Some(description).filter(|d| !d.trim().is_empty());
        }

        let category = self.categories.update(&category).await?;
        self.invalidate().await;
        Ok(category)
    }

    pub async fn delete(&self, actor_id: i64, id: i64) -> ServiceResult<()> {
        self.rbac.authorize(actor_id, MANAGE_CATEGORIES).await?;
        let category = self.find(id).await?;

        if category.is_default() {
            return Err(ServiceError::forbidden("The default category cannot be deleted"));
        }

        self.categories.delete(id).await?;
        tracing::info!(category_id = id, "Category deleted");
        self.invalidate().await;
        Ok(())
    }

    async fn find(&self, id: i64) -> ServiceResult<Category> {
        self.categories
            .get_by_id(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Category"))
    }

    async fn validate(&self, name: &str, slug: &str, except_id: Option<i64>) -> ServiceResult<()> {
        let mut v = Validator::new();
        v.check(
            !name.is_empty() && name.chars().count() <= MAX_NAME_LEN,
            "name",
            "The name is required and may not exceed 100 characters",
        );
        if slug.is_empty() {
            v.add("slug", "A slug could not be derived from the name; provide one");
        } else if !is_valid_slug(slug) || slug.len() > MAX_NAME_LEN {
            v.add("slug", "The slug may only contain lowercase letters, digits and hyphens");
        } else if self.categories.slug_exists(slug, except_id).await? {
            v.add("slug", "The slug has already been taken");
        }
        v.finish()
    }

    /// Article listings embed categories, so they go too
    async fn invalidate(&self) {
        self.cache.forget_prefix("categories:").await;
        self.cache.forget_prefix("articles:").await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::testing;

    fn input(name: &str) -> CreateCategoryInput {
        CreateCategoryInput {
            name: name.to_string(),
            slug: None,
            description: None,
        }
    }

    #[tokio::test]
    async fn test_create_generates_slug() {
        let ctx = testing::context().await;
        let admin = ctx.user("root", "admin").await;

        let category = ctx
            .services
            .categories
            .create(admin.id, input("Rust & Systems"))
            .await
            .unwrap();
        assert_eq!(category.slug, "rust-systems");
        assert_eq!(
            ctx.services.categories.get_by_slug("rust-systems").await.unwrap().id,
            category.id
        );
    }

    #[tokio::test]
    async fn test_create_rejects_duplicate_and_bad_slug() {
        let ctx = testing::context().await;
        let admin = ctx.user("root", "admin").await;
        let categories = &ctx.services.categories;

        categories.create(admin.id, input("News")).await.unwrap();
        assert!(matches!(
            categories.create(admin.id, input("news")).await,
            Err(ServiceError::Validation { .. })
        ));

        let bad = CreateCategoryInput {
            slug: Some("Not A Slug".into()),
            ..input("Whatever")
        };
        assert!(matches!(
            categories.create(admin.id, bad).await,
            Err(ServiceError::Validation { .. })
        ));

        assert!(matches!(
            categories.create(admin.id, input("日本語")).await,
            Err(ServiceError::Validation { .. })
        ));
    }

    #[tokio::test]
    async fn test_authors_cannot_manage_categories() {
        let ctx = testing::context().await;
        let author = ctx.user("writer", "author").await;

        assert!(matches!(
            ctx.services.categories.create(author.id, input("Mine")).await,
            Err(ServiceError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn test_default_category_is_permanent() {
        let ctx = testing::context().await;
        let admin = ctx.user("root", "admin").await;
        let categories = &ctx.services.categories;

        let default = categories.get_by_slug(Category::DEFAULT_SLUG).await.unwrap();
        assert!(matches!(
            categories.delete(admin.id, default.id).await,
            Err(ServiceError::Forbidden(_))
        ));
        let renamed = categories
            .update(
                admin.id,
                default.id,
                UpdateCategoryInput {
                    slug: Some("misc".into()),
                    ..Default::default()
                },
            )
            .await;
        assert!(matches!(renamed, Err(ServiceError::Validation { .. })));
    }

    #[tokio::test]
    async fn test_list_is_cached_until_mutation() {
        let ctx = testing::context().await;
        let admin = ctx.user("root", "admin").await;
        let categories = &ctx.services.categories;

        assert_eq!(categories.list().await.unwrap().len(), 1);
        let cached: Option<Vec<CategoryWithCount>> = ctx.services.cache.get(LIST_KEY).await;
        assert!(cached.is_some());

        let created = categories.create(admin.id, input("Guides")).await.unwrap();
        assert_eq!(categories.list().await.unwrap().len(), 2);

        let updated = categories
            .update(
                admin.id,
                created.id,
                UpdateCategoryInput {
                    name: Some("How-to Guides".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.slug, "guides");

        categories.delete(admin.id, created.id).await.unwrap();
        assert_eq!(categories.list().await.unwrap().len(), 1);
        assert!(matches!(
            categories.get_by_slug("guides").await,
            Err(ServiceError::NotFound(_))
        ));
    }
}
