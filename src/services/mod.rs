//! Services layer - Business logic
//!
//! Services own the business rules: validation, permission checks through
//! [`RoleService`], caching, and event publication. Handlers in `api` call
//! into them and never touch repositories directly.

pub mod article;
pub mod category;
pub mod comment;
pub mod email;
pub mod error;
pub mod markdown;
pub mod media;
pub mod newsletter;
pub mod notification;
pub mod password;
pub mod role;
pub mod tag;
pub mod user;
pub mod validation;

use std::sync::Arc;

use crate::cache::CacheService;
use crate::config::Config;
use crate::db::repositories::{
    SqlxArticleRepository, SqlxCategoryRepository, SqlxCommentRepository, SqlxMediaRepository,
    SqlxNewsletterRepository, SqlxNotificationRepository, SqlxRoleRepository,
    SqlxSessionRepository, SqlxTagRepository, SqlxUserRepository,
};
use crate::db::DynDatabasePool;
use crate::events::{
    AuditLogListener, CacheInvalidationListener, EventBus, NotificationListener, PRIORITY_DEFAULT,
    PRIORITY_EARLY, PRIORITY_LATE,
};

pub use article::{generate_slug as generate_article_slug, ArticleService};
pub use category::CategoryService;
pub use comment::CommentService;
pub use email::EmailService;
pub use error::{ServiceError, ServiceResult, Validator};
pub use markdown::MarkdownRenderer;
pub use media::MediaService;
pub use newsletter::NewsletterService;
pub use notification::NotificationService;
pub use password::{hash_password, verify_password};
pub use role::RoleService;
pub use tag::{tag_slug, TagService};
pub use user::{AuthSession, UserService};

/// Every service, wired to one pool, cache and event bus
#[derive(Clone)]
pub struct Services {
    pub users: Arc<UserService>,
    pub roles: Arc<RoleService>,
    pub categories: Arc<CategoryService>,
    pub tags: Arc<TagService>,
    pub articles: Arc<ArticleService>,
    pub comments: Arc<CommentService>,
    pub media: Arc<MediaService>,
    pub notifications: Arc<NotificationService>,
    pub newsletter: Arc<NewsletterService>,
    pub email: Arc<EmailService>,
    pub events: Arc<EventBus>,
    pub cache: CacheService,
    pub markdown: MarkdownRenderer,
}

impl Services {
    /// Build the services and subscribe the built-in listeners to `events`
    pub fn new(
        pool: DynDatabasePool,
        cache: CacheService,
        events: Arc<EventBus>,
        email: Arc<EmailService>,
        config: &Config,
    ) -> Self {
        let user_repo = SqlxUserRepository::boxed(pool.clone());
        let role_repo = SqlxRoleRepository::boxed(pool.clone());
        let category_repo = SqlxCategoryRepository::boxed(pool.clone());
        let article_repo = SqlxArticleRepository::boxed(pool.clone());
        let markdown = MarkdownRenderer::new();

        let roles = Arc::new(RoleService::new(
            role_repo.clone(),
            user_repo.clone(),
            cache.clone(),
            events.clone(),
        ));
        let users = Arc::new(UserService::new(
            user_repo.clone(),
            SqlxSessionRepository::boxed(pool.clone()),
            role_repo,
            roles.clone(),
            events.clone(),
            config.auth.session_ttl_days,
        ));
        let categories = Arc::new(CategoryService::new(
            category_repo.clone(),
            roles.clone(),
            cache.clone(),
        ));
        let tags = Arc::new(TagService::new(
            SqlxTagRepository::boxed(pool.clone()),
            roles.clone(),
            cache.clone(),
        ));
        let articles = Arc::new(ArticleService::new(
            article_repo.clone(),
            user_repo.clone(),
            category_repo,
            tags.clone(),
            roles.clone(),
            cache.clone(),
            events.clone(),
            markdown.clone(),
        ));
        let comments = Arc::new(CommentService::new(
            SqlxCommentRepository::boxed(pool.clone()),
            article_repo,
            user_repo.clone(),
            roles.clone(),
            events.clone(),
            config.comments.auto_approve,
        ));
        let media = Arc::new(MediaService::new(
            SqlxMediaRepository::boxed(pool.clone()),
            roles.clone(),
            events.clone(),
            config.upload.clone(),
        ));
        let notifications = Arc::new(NotificationService::new(
            SqlxNotificationRepository::boxed(pool.clone()),
            user_repo,
            roles.clone(),
        ));
        let newsletter = Arc::new(NewsletterService::new(
            SqlxNewsletterRepository::boxed(pool),
            roles.clone(),
            email.clone(),
            events.clone(),
            markdown.clone(),
            config.app.clone(),
        ));

        events.subscribe(
            Arc::new(CacheInvalidationListener::new(cache.clone())),
            PRIORITY_EARLY,
        );
        events.subscribe(
            Arc::new(NotificationListener::new(notifications.clone())),
            PRIORITY_DEFAULT,
        );
        events.subscribe(Arc::new(AuditLogListener), PRIORITY_LATE);

        Self {
            users,
            roles,
            categories,
            tags,
            articles,
            comments,
            media,
            notifications,
            newsletter,
            email,
            events,
            cache,
            markdown,
        }
    }
}
