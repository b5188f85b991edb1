//! Data models
//!
//! Database entities, the input types the services accept, and the composite
//! read models returned by the API.

/// Declares a lowercase string-backed enum with `as_str`, `Display` and
/// `FromStr`, as stored in `VARCHAR` status columns.
macro_rules! string_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
        #[serde(rename_all = "lowercase")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $s),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = anyhow::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.to_lowercase().as_str() {
                    $($s => Ok($name::$variant),)+
                    _ => Err(anyhow::anyhow!("Invalid {}: {}", stringify!($name), s)),
                }
            }
        }
    };
}

mod article;
mod category;
mod comment;
mod media;
mod newsletter;
mod notification;
mod pagination;
mod role;
mod session;
mod tag;
mod user;

pub use article::{
    Article, ArticleFilter, ArticleSort, ArticleStatus, ArticleWithRelations, CreateArticleInput,
    UpdateArticleInput,
};
pub use category::{Category, CategoryWithCount, CreateCategoryInput, UpdateCategoryInput};
pub use comment::{
    Comment, CommentFilter, CommentStatus, CommentThread, CommentWithAuthor, CreateCommentInput,
};
pub use media::{Media, MediaFilter, UploadInput};
pub use newsletter::{
    CampaignInput, CampaignReport, NewsletterStats, NewsletterSubscriber, SubscribeInput,
    SubscriberStatus,
};
pub use notification::{NewNotification, Notification};
pub use pagination::{ListParams, PagedResult};
pub use role::{
    CreatePermissionInput, CreateRoleInput, Permission, Role, RoleWithPermissions, UpdateRoleInput,
};
pub use session::Session;
pub use tag::{CreateTagInput, Tag, TagWithCount};
pub use user::{
    ChangePasswordInput, LoginInput, RegisterInput, UpdateProfileInput, User, UserFilter,
    UserStatus, UserSummary, UserWithRoles,
};
