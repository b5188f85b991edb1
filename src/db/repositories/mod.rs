//! Database repositories
//!
//! One trait per aggregate with an SQLx implementation that serves both
//! SQLite and MySQL.

pub mod article;
pub mod category;
pub mod comment;
pub mod media;
pub mod newsletter;
pub mod notification;
pub mod role;
pub mod session;
pub mod tag;
pub mod user;

pub use article::{ArticleRepository, SqlxArticleRepository};
pub use category::{CategoryRepository, SqlxCategoryRepository};
pub use comment::{CommentRepository, SqlxCommentRepository};
pub use media::{MediaRepository, SqlxMediaRepository};
pub use newsletter::{NewsletterRepository, SqlxNewsletterRepository};
pub use notification::{NotificationRepository, SqlxNotificationRepository};
pub use role::{RoleRepository, SqlxRoleRepository};
pub use session::{SessionRepository, SqlxSessionRepository};
pub use tag::{SqlxTagRepository, TagRepository};
pub use user::{SqlxUserRepository, UserRepository};
