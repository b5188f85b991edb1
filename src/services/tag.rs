//! Tag service
//!
//! Tags are created on demand when an article names them. Names without any
//! ASCII letters or digits get a stable hashed slug so that the same name
//! always resolves to the same tag.

use std::collections::HashSet;
use std::sync::Arc;

use crate::cache::CacheService;
use crate::db::repositories::TagRepository;
use crate::models::{CreateTagInput, Tag, TagWithCount};
use crate::services::error::{ServiceError, ServiceResult};
use crate::services::role::RoleService;
use crate::services::validation::{is_valid_slug, slugify};

const MANAGE_TAGS: &str = "categories.manage";
const LIST_KEY: &str = "tags:all";
const MAX_NAME_LEN: usize = 100;

/// Slug for a tag name, hashed when slugify leaves nothing
pub fn tag_slug(name: &str) -> String {
    let slug = slugify(name);
    if !slug.is_empty() {
        return slug;
    }
    let digest = format!("{:x}", md5::compute(name.trim().to_lowercase().as_bytes()));
    format!("tag-{}", &digest[..10])
}

pub struct TagService {
    tags: Arc<dyn TagRepository>,
    rbac: Arc<RoleService>,
    cache: CacheService,
}

impl TagService {
    pub fn new(tags: Arc<dyn TagRepository>, rbac: Arc<RoleService>, cache: CacheService) -> Self {
        Self { tags, rbac, cache }
    }

    pub async fn list(&self) -> ServiceResult<Vec<TagWithCount>> {
        let tags = self.tags.clone();
        self.cache
            .remember(LIST_KEY, || async move {
                Ok::<_, ServiceError>(tags.list_with_counts().await?)
            })
            .await
    }

    pub async fn get_by_slug(&self, slug: &str) -> ServiceResult<Tag> {
        self.tags
            .get_by_slug(slug)
            .await?
            .ok_or_else(|| ServiceError::not_found("Tag"))
    }

    pub async fn create(&self, actor_id: i64, input: CreateTagInput) -> ServiceResult<Tag> {
        self.rbac.authorize(actor_id, MANAGE_TAGS).await?;

        let name = input.name.trim().to_string();
        if name.is_empty() || name.chars().count() > MAX_NAME_LEN {
            return Err(ServiceError::field(
                "name",
                "The name is required and may not exceed 100 characters",
            ));
        }
        let slug = match input.slug.as_deref().map(str::trim) {
            Some(s) if !s.is_empty() => s.to_string(),
            _ => tag_slug(&name),
        };
        if !is_valid_slug(&slug) || slug.len() > MAX_NAME_LEN {
            return Err(ServiceError::field(
                "slug",
                "The slug may only contain lowercase letters, digits and hyphens",
            ));
        }
        if self.tags.get_by_slug(&slug).await?.is_some() {
            return Err(ServiceError::field("slug", "The slug has already been taken"));
        }

        let tag = self.tags.create(&new_tag(slug, name)).await?;
        self.invalidate().await;
        Ok(tag)
    }

    pub async fn delete(&self, actor_id: i64, id: i64) -> ServiceResult<()> {
        self.rbac.authorize(actor_id, MANAGE_TAGS).await?;
        if !self.tags.delete(id).await? {
            return Err(ServiceError::not_found("Tag"));
        }
        self.invalidate().await;
        Ok(())
    }

    /// Resolve tag names, creating the ones that do not exist yet.
    ///
    /// Blank names are ignored and names mapping to the same slug collapse
    /// into one tag. Order follows first appearance in `names`.
    pub async fn find_or_create_by_names(&self, names: &[String]) -> ServiceResult<Vec<Tag>> {
        let mut seen = HashSet::new();
        let mut wanted: Vec<(String, String)> = Vec::new();
        for name in names {
            let name = name.trim();
            if name.is_empty() {
                continue;
            }
            if name.chars().count() > MAX_NAME_LEN {
                return Err(ServiceError::field(
                    "tags",
                    "Tag names may not exceed 100 characters",
                ));
            }
            let slug = tag_slug(name);
            if seen.insert(slug.clone()) {
                wanted.push((slug, name.to_string()));
            }
        }
        if wanted.is_empty() {
            return Ok(Vec::new());
        }

        let slugs: Vec<String> = wanted.iter().map(|(slug, _)| slug.clone()).collect();
        let existing = self.tags.get_by_slugs(&slugs).await?;

        let mut created_any = false;
        let mut result = Vec::with_capacity(wanted.len());
        for (slug, name) in wanted {
            match existing.iter().find(|t| t.slug == slug) {
                Some(tag) => result.push(tag.clone()),
                None => {
                    result.push(self.tags.create(&new_tag(slug, name)).await?);
                    created_any = true;
                }
            }
        }

        if created_any {
            self.cache.forget_prefix("tags:").await;
        }
        Ok(result)
    }

    async fn invalidate(&self) {
        self.cache.forget_prefix("tags:").await;
        self.cache.forget_prefix("articles:").await;
    }
}

fn new_tag(slug: String, name: String) -> Tag {
    Tag {
        id: 0,
        slug,
        name,
        created_at: chrono::Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::testing;

    #[test]
    fn test_tag_slug_falls_back_to_hash() {
        assert_eq!(tag_slug("Async Rust"), "async-rust");
        let hashed = tag_slug("日本語");
        assert!(hashed.starts_with("tag-"));
        assert_eq!(hashed, tag_slug(" 日本語 "));
        assert!(is_valid_slug(&hashed));
    }

    #[tokio::test]
    async fn test_find_or_create_reuses_existing() {
        let ctx = testing::context().await;
        let tags = &ctx.services.tags;

        let first = tags
            .find_or_create_by_names(&["Rust".into(), "tokio".into(), "  ".into()])
            .await
            .unwrap();
        assert_eq!(first.len(), 2);

        let second = tags
            .find_or_create_by_names(&["rust".into(), "Axum".into(), "RUST".into()])
            .await
            .unwrap();
        assert_eq!(second.len(), 2);
        assert_eq!(second[0].id, first[0].id);
        assert_eq!(second[1].slug, "axum");
        assert_eq!(tags.list().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_create_and_delete_require_permission() {
        let ctx = testing::context().await;
        let admin = ctx.user("root", "admin").await;
        let author = ctx.user("writer", "author").await;
        let tags = &ctx.services.tags;

        let input = || CreateTagInput {
            name: "Databases".into(),
            slug: None,
        };
        assert!(matches!(
            tags.create(author.id, input()).await,
            Err(ServiceError::Forbidden(_))
        ));

        let tag = tags.create(admin.id, input()).await.unwrap();
        assert!(matches!(
            tags.create(admin.id, input()).await,
            Err(ServiceError::Validation { .. })
        ));
        assert_eq!(tags.get_by_slug("databases").await.unwrap().id, tag.id);

        tags.delete(admin.id, tag.id).await.unwrap();
        assert!(matches!(
            tags.delete(admin.id, tag.id).await,
            Err(ServiceError::NotFound(_))
        ));
    }
}
