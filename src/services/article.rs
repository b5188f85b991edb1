//! Article service
//!
//! Editorial workflow, visibility rules and listings. Authors write drafts
//! and submit them as `pending`; holders of `articles.approve` publish or
//! reject them. Published listings are cached per query under `articles:`;
//! every mutation drops that prefix.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;

use crate::cache::CacheService;
use crate::db::repositories::{ArticleRepository, CategoryRepository, UserRepository};
use crate::events::{DomainEvent, EventBus};
use crate::models::{
    Article, ArticleFilter, ArticleStatus, ArticleWithRelations, Category, CreateArticleInput,
    ListParams, PagedResult, UpdateArticleInput, UserSummary,
};
use crate::services::error::{ServiceError, ServiceResult, Validator};
use crate::services::markdown::MarkdownRenderer;
use crate::services::role::RoleService;
use crate::services::tag::TagService;
use crate::services::validation::{is_valid_slug, slugify};

pub const CREATE: &str = "articles.create";
pub const UPDATE_ANY: &str = "articles.update.any";
pub const DELETE_ANY: &str = "articles.delete.any";
pub const APPROVE: &str = "articles.approve";
pub const FEATURE: &str = "articles.feature";

const MAX_TITLE_LEN: usize = 255;
const EXCERPT_LEN: usize = 200;

pub struct ArticleService {
    articles: Arc<dyn ArticleRepository>,
    users: Arc<dyn UserRepository>,
    categories: Arc<dyn CategoryRepository>,
    tags: Arc<TagService>,
    rbac: Arc<RoleService>,
    cache: CacheService,
    events: Arc<EventBus>,
    markdown: MarkdownRenderer,
}

impl ArticleService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        articles: Arc<dyn ArticleRepository>,
        users: Arc<dyn UserRepository>,
        categories: Arc<dyn CategoryRepository>,
        tags: Arc<TagService>,
        rbac: Arc<RoleService>,
        cache: CacheService,
        events: Arc<EventBus>,
        markdown: MarkdownRenderer,
    ) -> Self {
        Self {
            articles,
            users,
            categories,
            tags,
            rbac,
            cache,
            events,
            markdown,
        }
    }

    // ------------------------------------------------------------------
    // Writing
    // ------------------------------------------------------------------

    pub async fn create(
        &self,
        author_id: i64,
        input: CreateArticleInput,
    ) -> ServiceResult<ArticleWithRelations> {
        self.rbac.authorize(author_id, CREATE).await?;

        let title = input.title.trim().to_string();
        let slug = match input.slug.as_deref().map(str::trim) {
            Some(s) if !s.is_empty() => s.to_string(),
            _ => generate_slug(&title),
        };

        let mut v = Validator::new();
        check_title(&mut v, &title);
        v.check(
            !input.content.trim().is_empty(),
            "content",
            "The content is required",
        );
        self.check_slug(&mut v, &slug, None).await?;
        v.finish()?;

        let category_ids = self.resolve_categories(&input.category_ids).await?;
        let tags = self.tags.find_or_create_by_names(&input.tags).await?;

        let requested = input.status.unwrap_or_default();
        let can_approve = self.rbac.has_permission(author_id, APPROVE).await?;
        let status = match requested {
            ArticleStatus::Draft | ArticleStatus::Pending => requested,
            ArticleStatus::Published if can_approve => ArticleStatus::Published,
            ArticleStatus::Published => ArticleStatus::Pending,
            ArticleStatus::Rejected | ArticleStatus::Archived => {
                return Err(ServiceError::field(
                    "status",
                    "New articles must be draft, pending or published",
                ))
            }
        };

        let mut article = Article::new(
            slug,
            title,
            input.content.clone(),
            self.markdown.render(&input.content),
            author_id,
            status,
        );
        article.excerpt = non_blank(input.excerpt)
            .or_else(|| Some(self.markdown.excerpt(&input.content, EXCERPT_LEN)));
        if status == ArticleStatus::Published {
            article.publish(author_id);
        }

        let article = self.articles.create(&article).await?;
        self.articles.sync_categories(article.id, &category_ids).await?;
        let tag_ids: Vec<i64> = tags.iter().map(|t| t.id).collect();
        self.articles.sync_tags(article.id, &tag_ids).await?;

        tracing::info!(
            article_id = article.id,
            author_id,
            status = %article.status,
            "Article created"
        );
        self.invalidate().await;
        self.events
            .publish(DomainEvent::ArticleCreated {
                article_id: article.id,
                author_id,
                status: article.status.to_string(),
            })
            .await;

        self.with_relations(article).await
    }

    pub async fn update(
        &self,
        actor_id: i64,
        id: i64,
        input: UpdateArticleInput,
    ) -> ServiceResult<ArticleWithRelations> {
        let mut article = self.find_live(id).await?;
        if article.author_id != actor_id && !self.rbac.has_permission(actor_id, UPDATE_ANY).await? {
            return Err(ServiceError::forbidden("You cannot edit this article"));
        }
        let can_approve = self.rbac.has_permission(actor_id, APPROVE).await?;
        let was_published = article.status == ArticleStatus::Published;

        let mut v = Validator::new();
        if let Some(title) = input.title {
            let title = title.trim().to_string();
            check_title(&mut v, &title);
            article.title = title;
        }
        if let Some(slug) = input.slug {
            let slug = slug.trim().to_string();
            self.check_slug(&mut v, &slug, Some(id)).await?;
            article.slug = slug;
        }
        if let Some(content) = input.content {
            v.check(!content.trim().is_empty(), "content", "The content is required");
            article.content_html = self.markdown.render(&content);
            article.content = content;
        }
        if input.excerpt.is_some() {
            article.excerpt = non_blank(input.excerpt)
                .or_else(|| Some(self.markdown.excerpt(&article.content, EXCERPT_LEN)));
        }
        v.finish()?;

        match input.status {
            None => {}
            Some(ArticleStatus::Published) if can_approve => {
                if article.status != ArticleStatus::Published {
                    article.publish(actor_id);
                }
            }
            Some(ArticleStatus::Published) => article.status = ArticleStatus::Pending,
            Some(ArticleStatus::Rejected) => {
                return Err(ServiceError::field(
                    "status",
                    "Use the reject action to reject an article",
                ))
            }
            Some(status) => article.status = status,
        }
        if was_published && article.status == ArticleStatus::Published && !can_approve {
            // Edits to live content go back through review
            article.status = ArticleStatus::Pending;
        }

        let category_ids = match &input.category_ids {
            Some(ids) => Some(self.resolve_categories(ids).await?),
            None => None,
        };

        article.updated_at = Utc::now();
        let article = self.articles.update(&article).await?;

        if let Some(ids) = &category_ids {
            self.articles.sync_categories(id, ids).await?;
        }
        if let Some(names) = &input.tags {
            let tags = self.tags.find_or_create_by_names(names).await?;
            let tag_ids: Vec<i64> = tags.iter().map(|t| t.id).collect();
            self.articles.sync_tags(id, &tag_ids).await?;
        }

        self.invalidate().await;
        self.events
            .publish(DomainEvent::ArticleUpdated {
                article_id: id,
                actor_id,
            })
            .await;
        self.with_relations(article).await
    }

    /// Move to trash; owner or `articles.delete.any`
    pub async fn delete(&self, actor_id: i64, id: i64) -> ServiceResult<()> {
        let article = self.find_live(id).await?;
        if article.author_id != actor_id && !self.rbac.has_permission(actor_id, DELETE_ANY).await? {
            return Err(ServiceError::forbidden("You cannot delete this article"));
        }

        self.articles.soft_delete(id).await?;
        self.invalidate().await;
        self.events
            .publish(DomainEvent::ArticleDeleted {
                article_id: id,
                actor_id,
                permanent: false,
            })
            .await;
        Ok(())
    }

    pub async fn restore(&self, actor_id: i64, id: i64) -> ServiceResult<ArticleWithRelations> {
        self.rbac.authorize(actor_id, DELETE_ANY).await?;
        let article = self.find_any(id).await?;
        if !article.is_trashed() {
            return Err(ServiceError::invalid("The article is not deleted"));
        }

        self.articles.restore(id).await?;
        self.invalidate().await;
        self.events
            .publish(DomainEvent::ArticleRestored {
                article_id: id,
                actor_id,
            })
            .await;

        let article = self.find_any(id).await?;
        self.with_relations(article).await
    }

    /// Remove permanently, trashed or not
    pub async fn force_delete(&self, actor_id: i64, id: i64) -> ServiceResult<()> {
        self.rbac.authorize(actor_id, DELETE_ANY).await?;
        self.find_any(id).await?;

        self.articles.force_delete(id).await?;
        tracing::info!(article_id = id, actor_id, "Article permanently deleted");
        self.invalidate().await;
        self.events
            .publish(DomainEvent::ArticleDeleted {
                article_id: id,
                actor_id,
                permanent: true,
            })
            .await;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Moderation
    // ------------------------------------------------------------------

    pub async fn approve(&self, actor_id: i64, id: i64) -> ServiceResult<ArticleWithRelations> {
        self.rbac.authorize(actor_id, APPROVE).await?;
        let mut article = self.find_live(id).await?;

        article.publish(actor_id);
        article.updated_at = Utc::now();
        let article = self.articles.update(&article).await?;

        tracing::info!(article_id = id, actor_id, "Article approved");
        self.invalidate().await;
        self.events
            .publish(DomainEvent::ArticleApproved {
                article_id: id,
                author_id: article.author_id,
                actor_id,
                title: article.title.clone(),
            })
            .await;
        self.with_relations(article).await
    }

    pub async fn reject(
        &self,
        actor_id: i64,
        id: i64,
        reason: &str,
    ) -> ServiceResult<ArticleWithRelations> {
        self.rbac.authorize(actor_id, APPROVE).await?;

        let reason = reason.trim();
        if reason.is_empty() || reason.chars().count() > 1000 {
            return Err(ServiceError::field(
                "reason",
                "A rejection reason of at most 1000 characters is required",
            ));
        }
        let mut article = self.find_live(id).await?;

        article.status = ArticleStatus::Rejected;
        article.rejection_reason = Some(reason.to_string());
        article.approved_by = None;
        article.approved_at = None;
        article.updated_at = Utc::now();
        let article = self.articles.update(&article).await?;

        tracing::info!(article_id = id, actor_id, "Article rejected");
        self.invalidate().await;
        self.events
            .publish(DomainEvent::ArticleRejected {
                article_id: id,
                author_id: article.author_id,
                actor_id,
                title: article.title.clone(),
                reason: reason.to_string(),
            })
            .await;
        self.with_relations(article).await
    }

    /// Flag a published article for moderators
    pub async fn report(&self, actor_id: i64, id: i64) -> ServiceResult<Article> {
        let article = self.find_live(id).await?;
        if !article.is_published() {
            return Err(ServiceError::not_found("Article"));
        }

        let report_count = self.articles.increment_report_count(id).await?;
        tracing::info!(article_id = id, actor_id, report_count, "Article reported");
        self.events
            .publish(DomainEvent::ArticleReported {
                article_id: id,
                actor_id,
                report_count,
            })
            .await;

        self.find_any(id).await
    }

    pub async fn set_featured(&self, actor_id: i64, id: i64, featured: bool) -> ServiceResult<Article> {
        self.rbac.authorize(actor_id, FEATURE).await?;
        let mut article = self.find_live(id).await?;

        article.is_featured = featured;
        article.updated_at = Utc::now();
        let article = self.articles.update(&article).await?;

        self.invalidate().await;
        self.events
            .publish(DomainEvent::ArticleUpdated {
                article_id: id,
                actor_id,
            })
            .await;
        Ok(article)
    }

    // ------------------------------------------------------------------
    // Reading
    // ------------------------------------------------------------------

    /// Public article page. Counts a view when the article is published.
    pub async fn get_by_slug(
        &self,
        slug: &str,
        viewer: Option<i64>,
    ) -> ServiceResult<ArticleWithRelations> {
        let mut article = self
            .articles
            .get_by_slug(slug)
            .await?
            .ok_or_else(|| ServiceError::not_found("Article"))?;
        self.ensure_visible(&article, viewer).await?;

        if article.is_published() {
            self.articles.increment_view_count(article.id).await?;
            article.view_count += 1;
        }
        self.with_relations(article).await
    }

    pub async fn get_by_id(&self, id: i64, viewer: Option<i64>) -> ServiceResult<ArticleWithRelations> {
        let article = self.find_any(id).await?;
        self.ensure_visible(&article, viewer).await?;
        self.with_relations(article).await
    }

    pub async fn list_published(
        &self,
        filter: &ArticleFilter,
        params: &ListParams,
    ) -> ServiceResult<PagedResult<ArticleWithRelations>> {
        let params = params.normalized();
        let key = format!(
            "articles:list:{}:p{}:n{}",
            filter.cache_fragment(),
            params.page,
            params.per_page
        );

        self.cache
            .remember(&key, || async {
                let (articles, total) = self.articles.list(filter, true, &params).await?;
                let items = self.load_relations(articles).await?;
                Ok::<_, ServiceError>(PagedResult::new(items, total, &params))
            })
            .await
    }

    /// Every status, including trash when asked. Actors without
    /// `articles.update.any` only see their own articles.
    pub async fn list_for_management(
        &self,
        actor_id: i64,
        filter: &ArticleFilter,
        params: &ListParams,
    ) -> ServiceResult<PagedResult<ArticleWithRelations>> {
        let params = params.normalized();
        let mut filter = filter.clone();
        if !self.rbac.has_permission(actor_id, UPDATE_ANY).await? {
            filter.author_id = Some(actor_id);
        }

        let (articles, total) = self.articles.list(&filter, false, &params).await?;
        let items = self.load_relations(articles).await?;
        Ok(PagedResult::new(items, total, &params))
    }

    /// Author, categories and tags for a whole page, one concurrent query each
    pub async fn load_relations(
        &self,
        articles: Vec<Article>,
    ) -> ServiceResult<Vec<ArticleWithRelations>> {
        if articles.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<i64> = articles.iter().map(|a| a.id).collect();
        let author_ids: Vec<i64> = articles
            .iter()
            .map(|a| a.author_id)
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();

        let (users, mut categories, mut tags) = futures::try_join!(
            self.users.get_many(&author_ids),
            self.articles.categories_for(&ids),
            self.articles.tags_for(&ids),
        )?;
        let authors: HashMap<i64, UserSummary> =
            users.into_iter().map(|u| (u.id, u.summary())).collect();

        Ok(articles
            .into_iter()
            .map(|article| ArticleWithRelations {
                author: authors.get(&article.author_id).cloned(),
                categories: categories.remove(&article.id).unwrap_or_default(),
                tags: tags.remove(&article.id).unwrap_or_default(),
                article,
            })
            .collect())
    }

    async fn with_relations(&self, article: Article) -> ServiceResult<ArticleWithRelations> {
        self.load_relations(vec![article])
            .await?
            .pop()
            .ok_or_else(|| ServiceError::not_found("Article"))
    }

    /// Unpublished and trashed articles look missing to everyone except
    /// their author and editors
    async fn ensure_visible(&self, article: &Article, viewer: Option<i64>) -> ServiceResult<()> {
        if article.is_published() {
            return Ok(());
        }
        let allowed = match viewer {
            Some(id) if id == article.author_id => true,
            Some(id) => self.rbac.has_permission(id, UPDATE_ANY).await?,
            None => false,
        };
        if allowed {
            Ok(())
        } else {
            Err(ServiceError::not_found("Article"))
        }
    }

    async fn find_any(&self, id: i64) -> ServiceResult<Article> {
        self.articles
            .get_by_id(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Article"))
    }

    async fn find_live(&self, id: i64) -> ServiceResult<Article> {
        let article = self.find_any(id).await?;
        if article.is_trashed() {
            return Err(ServiceError::not_found("Article"));
        }
        Ok(article)
    }

    async fn check_slug(
        &self,
        v: &mut Validator,
        slug: &str,
        except_id: Option<i64>,
    ) -> ServiceResult<()> {
        if !is_valid_slug(slug) {
            v.add("slug", "The slug may only contain lowercase letters, digits and hyphens");
        } else if self.articles.slug_exists(slug, except_id).await? {
            v.add("slug", "The slug has already been taken");
        }
        Ok(())
    }

    /// Validate category ids; none means the default category
    async fn resolve_categories(&self, ids: &[i64]) -> ServiceResult<Vec<i64>> {
        let mut seen = HashSet::new();
        let ids: Vec<i64> = ids.iter().copied().filter(|id| seen.insert(*id)).collect();

        if ids.is_empty() {
            let default = self
                .categories
                .get_by_slug(Category::DEFAULT_SLUG)
                .await?
                .ok_or_else(|| anyhow::anyhow!("Default category is missing"))?;
            return Ok(vec![default.id]);
        }

        let found = self.categories.get_many(&ids).await?;
        if found.len() != ids.len() {
            return Err(ServiceError::field(
                "category_ids",
                "One or more categories do not exist",
            ));
        }
        Ok(ids)
    }

    async fn invalidate(&self) {
        self.cache.forget_prefix("articles:").await;
    }
}

/// Slug from the title, or a random one when the title has no ASCII
/// letters or digits
pub fn generate_slug(title: &str) -> String {
    let slug = slugify(title);
    if slug.is_empty() {
        let id = uuid::Uuid::new_v4().simple().to_string();
        format!("article-{}", &id[..8])
    } else {
        slug
    }
}

fn check_title(v: &mut Validator, title: &str) {
    v.check(
        !title.is_empty() && title.chars().count() <= MAX_TITLE_LEN,
        "title",
        "The title is required and may not exceed 255 characters",
    );
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CreateCategoryInput, User};
    use crate::services::testing::{self, TestContext};

    fn input(title: &str, status: ArticleStatus) -> CreateArticleInput {
        CreateArticleInput {
            title: title.to_string(),
            slug: None,
            excerpt: None,
            content: format!("# {}\n\nSome **markdown** body.", title),
            status: Some(status),
            category_ids: vec![],
            tags: vec![],
        }
    }

    struct Cast {
        ctx: TestContext,
        editor: User,
        author: User,
        reader: User,
    }

    async fn cast() -> Cast {
        let ctx = testing::context().await;
        let editor = ctx.user("editor", "editor").await;
        let author = ctx.user("writer", "author").await;
        let reader = ctx.user("reader", "subscriber").await;
        Cast {
            ctx,
            editor,
            author,
            reader,
        }
    }

    #[test]
    fn test_generate_slug() {
        assert_eq!(generate_slug("Hello, World!"), "hello-world");
        let fallback = generate_slug("你好");
        assert!(fallback.starts_with("article-"));
        assert!(is_valid_slug(&fallback));
    }

    #[tokio::test]
    async fn test_author_publish_is_downgraded_to_pending() {
        let c = cast().await;
        let articles = &c.ctx.services.articles;

        let created = articles
            .create(c.author.id, input("First Post", ArticleStatus::Published))
            .await
            .unwrap();
        assert_eq!(created.article.status, ArticleStatus::Pending);
        assert_eq!(created.article.slug, "first-post");
        assert!(created.article.content_html.contains("<strong>markdown</strong>"));
        assert_eq!(created.author.as_ref().map(|a| a.id), Some(c.author.id));
        assert_eq!(created.categories[0].slug, Category::DEFAULT_SLUG);
        assert!(created.article.excerpt.as_deref().unwrap().starts_with("First Post"));

        let direct = articles
            .create(c.editor.id, input("Editor Post", ArticleStatus::Published))
            .await
            .unwrap();
        assert_eq!(direct.article.status, ArticleStatus::Published);
        assert_eq!(direct.article.approved_by, Some(c.editor.id));
    }

    #[tokio::test]
    async fn test_create_validation() {
        let c = cast().await;
        let articles = &c.ctx.services.articles;

        let mut bad = input("", ArticleStatus::Draft);
        bad.content = "  ".into();
        match articles.create(c.author.id, bad).await.unwrap_err() {
            ServiceError::Validation { fields, .. } => {
                assert!(fields.contains_key("title"));
                assert!(fields.contains_key("content"));
            }
            other => panic!("unexpected {:?}", other),
        }

        articles
            .create(c.author.id, input("Same", ArticleStatus::Draft))
            .await
            .unwrap();
        assert!(matches!(
            articles.create(c.author.id, input("Same", ArticleStatus::Draft)).await,
            Err(ServiceError::Validation { .. })
        ));

        let mut unknown_category = input("Other", ArticleStatus::Draft);
        unknown_category.category_ids = vec![999];
        assert!(matches!(
            articles.create(c.author.id, unknown_category).await,
            Err(ServiceError::Validation { .. })
        ));

        assert!(matches!(
            articles
                .create(c.reader.id, input("Nope", ArticleStatus::Draft))
                .await,
            Err(ServiceError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn test_categories_and_tags_are_attached() {
        let c = cast().await;
        let category = c
            .ctx
            .services
            .categories
            .create(
                c.editor.id,
                CreateCategoryInput {
                    name: "Rust".into(),
                    slug: None,
                    description: None,
                },
            )
            .await
            .unwrap();

        let mut with_relations = input("Tagged", ArticleStatus::Draft);
        with_relations.category_ids = vec![category.id, category.id];
        with_relations.tags = vec!["async".into(), "Tokio".into()];

        let created = c
            .ctx
            .services
            .articles
            .create(c.author.id, with_relations)
            .await
            .unwrap();
        assert_eq!(created.categories.len(), 1);
        assert_eq!(created.categories[0].id, category.id);
        let mut slugs: Vec<&str> = created.tags.iter().map(|t| t.slug.as_str()).collect();
        slugs.sort();
        assert_eq!(slugs, vec!["async", "tokio"]);
    }

    #[tokio::test]
    async fn test_failed_update_leaves_relations_untouched() {
        let c = cast().await;
        let category = c
            .ctx
            .services
            .categories
            .create(
                c.editor.id,
                CreateCategoryInput {
                    name: "Rust".into(),
                    slug: None,
                    description: None,
                },
            )
            .await
            .unwrap();

        let mut tagged = input("Tagged", ArticleStatus::Draft);
        tagged.category_ids = vec![category.id];
        tagged.tags = vec!["async".into()];
        let created = c
            .ctx
            .services
            .articles
            .create(c.author.id, tagged)
            .await
            .unwrap();

        let retag = || UpdateArticleInput {
            title: Some("Retitled".into()),
            category_ids: Some(vec![]),
            tags: Some(vec!["tokio".into()]),
            ..Default::default()
        };

        // Unknown categories are rejected before anything is written
        let unknown = UpdateArticleInput {
            category_ids: Some(vec![9999]),
            ..retag()
        };
        assert!(matches!(
            c.ctx.services.articles.update(c.author.id, created.article.id, unknown).await,
            Err(ServiceError::Validation { .. })
        ));

        c.ctx
            .pool
            .execute(
                "CREATE TRIGGER articles_read_only BEFORE UPDATE ON articles \
                 BEGIN SELECT RAISE(ABORT, 'read only'); END",
            )
            .await
            .unwrap();
        assert!(matches!(
            c.ctx.services.articles.update(c.author.id, created.article.id, retag()).await,
            Err(ServiceError::Internal(_))
        ));
        c.ctx.pool.execute("DROP TRIGGER articles_read_only").await.unwrap();

        let current = c
            .ctx
            .services
            .articles
            .get_by_id(created.article.id, Some(c.author.id))
            .await
            .unwrap();
        assert_eq!(current.article.title, "Tagged");
        assert_eq!(current.categories.len(), 1);
        assert_eq!(current.categories[0].id, category.id);
        let slugs: Vec<&str> = current.tags.iter().map(|t| t.slug.as_str()).collect();
        assert_eq!(slugs, vec!["async"]);

        let updated = c
            .ctx
            .services
            .articles
            .update(c.author.id, created.article.id, retag())
            .await
            .unwrap();
        assert_eq!(updated.article.title, "Retitled");
        assert_eq!(updated.categories.len(), 1);
        assert_eq!(updated.categories[0].slug, Category::DEFAULT_SLUG);
        let slugs: Vec<&str> = updated.tags.iter().map(|t| t.slug.as_str()).collect();
        assert_eq!(slugs, vec!["tokio"]);
    }

    #[tokio::test]
    async fn test_approve_and_reject() {
        let c = cast().await;
        let articles = &c.ctx.services.articles;
        let pending = articles
            .create(c.author.id, input("Review Me", ArticleStatus::Pending))
            .await
            .unwrap();
        let id = pending.article.id;

        assert!(matches!(
            articles.approve(c.author.id, id).await,
            Err(ServiceError::Forbidden(_))
        ));

        let rejected = articles.reject(c.editor.id, id, "Needs sources").await.unwrap();
        assert_eq!(rejected.article.status, ArticleStatus::Rejected);
        assert_eq!(rejected.article.rejection_reason.as_deref(), Some("Needs sources"));

        assert!(matches!(
            articles.reject(c.editor.id, id, "   ").await,
            Err(ServiceError::Validation { .. })
        ));

        let approved = articles.approve(c.editor.id, id).await.unwrap();
        assert_eq!(approved.article.status, ArticleStatus::Published);
        assert_eq!(approved.article.approved_by, Some(c.editor.id));
        assert!(approved.article.approved_at.is_some());
        assert!(approved.article.published_at.is_some());
        assert!(approved.article.rejection_reason.is_none());
    }

    #[tokio::test]
    async fn test_author_edit_of_published_goes_back_to_review() {
        let c = cast().await;
        let articles = &c.ctx.services.articles;
        let created = articles
            .create(c.author.id, input("Live", ArticleStatus::Pending))
            .await
            .unwrap();
        let id = created.article.id;
        articles.approve(c.editor.id, id).await.unwrap();

        let edited = articles
            .update(
                c.author.id,
                id,
                UpdateArticleInput {
                    content: Some("Changed *body*".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(edited.article.status, ArticleStatus::Pending);
        assert!(edited.article.content_html.contains("<em>body</em>"));

        let by_editor = articles
            .update(
                c.editor.id,
                id,
                UpdateArticleInput {
                    title: Some("Live Again".into()),
                    status: Some(ArticleStatus::Published),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(by_editor.article.status, ArticleStatus::Published);
        assert_eq!(by_editor.article.title, "Live Again");

        assert!(matches!(
            articles
                .update(c.reader.id, id, UpdateArticleInput::default())
                .await,
            Err(ServiceError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn test_visibility_and_view_count() {
        let c = cast().await;
        let articles = &c.ctx.services.articles;
        let draft = articles
            .create(c.author.id, input("Secret Draft", ArticleStatus::Draft))
            .await
            .unwrap();

        assert!(matches!(
            articles.get_by_slug("secret-draft", None).await,
            Err(ServiceError::NotFound(_))
        ));
        assert!(matches!(
            articles.get_by_slug("secret-draft", Some(c.reader.id)).await,
            Err(ServiceError::NotFound(_))
        ));
        let own = articles
            .get_by_slug("secret-draft", Some(c.author.id))
            .await
            .unwrap();
        assert_eq!(own.article.view_count, 0);
        assert!(articles.get_by_id(draft.article.id, Some(c.editor.id)).await.is_ok());

        let live = articles
            .create(c.editor.id, input("Public", ArticleStatus::Published))
            .await
            .unwrap();
        articles.get_by_slug("public", None).await.unwrap();
        let second = articles.get_by_slug("public", None).await.unwrap();
        assert_eq!(second.article.view_count, 2);
        assert_eq!(
            articles.get_by_id(live.article.id, None).await.unwrap().article.view_count,
            2
        );
    }

    #[tokio::test]
    async fn test_report_increments_count() {
        let c = cast().await;
        let articles = &c.ctx.services.articles;
        let live = articles
            .create(c.editor.id, input("Reported", ArticleStatus::Published))
            .await
            .unwrap();

        articles.report(c.reader.id, live.article.id).await.unwrap();
        let after = articles.report(c.author.id, live.article.id).await.unwrap();
        assert_eq!(after.report_count, 2);

        let draft = articles
            .create(c.author.id, input("Hidden", ArticleStatus::Draft))
            .await
            .unwrap();
        assert!(matches!(
            articles.report(c.reader.id, draft.article.id).await,
            Err(ServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_soft_delete_restore_and_force_delete() {
        let c = cast().await;
        let articles = &c.ctx.services.articles;
        let created = articles
            .create(c.author.id, input("Trash Me", ArticleStatus::Draft))
            .await
            .unwrap();
        let id = created.article.id;

        assert!(matches!(
            articles.delete(c.reader.id, id).await,
            Err(ServiceError::Forbidden(_))
        ));
        articles.delete(c.author.id, id).await.unwrap();
        assert!(matches!(
            articles.delete(c.author.id, id).await,
            Err(ServiceError::NotFound(_))
        ));

        assert!(matches!(
            articles.restore(c.author.id, id).await,
            Err(ServiceError::Forbidden(_))
        ));
        let restored = articles.restore(c.editor.id, id).await.unwrap();
        assert!(restored.article.deleted_at.is_none());

        articles.force_delete(c.editor.id, id).await.unwrap();
        assert!(matches!(
            articles.get_by_id(id, Some(c.editor.id)).await,
            Err(ServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_list_published_is_cached_and_invalidated() {
        let c = cast().await;
        let articles = &c.ctx.services.articles;
        articles
            .create(c.editor.id, input("One", ArticleStatus::Published))
            .await
            .unwrap();
        articles
            .create(c.author.id, input("Draft", ArticleStatus::Draft))
            .await
            .unwrap();

        let params = ListParams::default();
        let page = articles
            .list_published(&ArticleFilter::default(), &params)
            .await
            .unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].author.as_ref().unwrap().username, "editor");

        let two = articles
            .create(c.editor.id, input("Two", ArticleStatus::Published))
            .await
            .unwrap();
        let page = articles
            .list_published(&ArticleFilter::default(), &params)
            .await
            .unwrap();
        assert_eq!(page.total, 2);

        articles.set_featured(c.editor.id, two.article.id, true).await.unwrap();
        let featured = articles
            .list_published(
                &ArticleFilter {
                    featured: Some(true),
                    ..Default::default()
                },
                &params,
            )
            .await
            .unwrap();
        assert_eq!(featured.total, 1);
        assert_eq!(featured.items[0].article.slug, "two");

        assert!(matches!(
            articles.set_featured(c.author.id, two.article.id, false).await,
            Err(ServiceError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn test_management_listing_scopes_to_own_articles() {
        let c = cast().await;
        let articles = &c.ctx.services.articles;
        articles
            .create(c.author.id, input("Mine", ArticleStatus::Draft))
            .await
            .unwrap();
        articles
            .create(c.editor.id, input("Theirs", ArticleStatus::Pending))
            .await
            .unwrap();

        let params = ListParams::default();
        let own = articles
            .list_for_management(c.author.id, &ArticleFilter::default(), &params)
            .await
            .unwrap();
        assert_eq!(own.total, 1);
        assert_eq!(own.items[0].article.slug, "mine");

        let all = articles
            .list_for_management(c.editor.id, &ArticleFilter::default(), &params)
            .await
            .unwrap();
        assert_eq!(all.total, 2);

        let pending = articles
            .list_for_management(
                c.editor.id,
                &ArticleFilter {
                    status: Some(ArticleStatus::Pending),
                    ..Default::default()
                },
                &params,
            )
            .await
            .unwrap();
        assert_eq!(pending.total, 1);
    }
}
