//! Comment service
//!
//! Comments attach to published articles and may reply to another comment on
//! the same article. New comments wait in the moderation queue unless the
//! commenter holds `comments.moderate` or `comments.auto_approve` is set.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;

use crate::db::repositories::{ArticleRepository, CommentRepository, UserRepository};
use crate::events::{DomainEvent, EventBus};
use crate::models::{
    Article, Comment, CommentFilter, CommentStatus, CommentThread, CommentWithAuthor,
    CreateCommentInput, ListParams, PagedResult, UserSummary,
};
use crate::services::error::{ServiceError, ServiceResult};
use crate::services::role::RoleService;

pub const MODERATE: &str = "comments.moderate";
pub const MAX_CONTENT_LEN: usize = 5000;

pub struct CommentService {
    comments: Arc<dyn CommentRepository>,
    articles: Arc<dyn ArticleRepository>,
    users: Arc<dyn UserRepository>,
    rbac: Arc<RoleService>,
    events: Arc<EventBus>,
    auto_approve: bool,
}

impl CommentService {
    pub fn new(
        comments: Arc<dyn CommentRepository>,
        articles: Arc<dyn ArticleRepository>,
        users: Arc<dyn UserRepository>,
        rbac: Arc<RoleService>,
        events: Arc<EventBus>,
        auto_approve: bool,
    ) -> Self {
        Self {
            comments,
            articles,
            users,
            rbac,
            events,
            auto_approve,
        }
    }

    pub async fn create(
        &self,
        actor_id: i64,
        article_id: i64,
        input: CreateCommentInput,
    ) -> ServiceResult<CommentWithAuthor> {
        let article = self.published_article(article_id).await?;
        let content = validate_content(&input.content)?;

        let parent = match input.parent_id {
            Some(parent_id) => {
                let parent = self
                    .comments
                    .get_by_id(parent_id)
                    .await?
                    .filter(|p| p.article_id == article.id)
                    .ok_or_else(|| {
                        ServiceError::field(
                            "parent_id",
                            "The parent comment does not belong to this article",
                        )
                    })?;
                Some(parent)
            }
            None => None,
        };

        let approved = self.auto_approve || self.rbac.has_permission(actor_id, MODERATE).await?;
        let status = if approved {
            CommentStatus::Approved
        } else {
            CommentStatus::Pending
        };

        let comment = Comment::new(
            article.id,
            actor_id,
            parent.as_ref().map(|p| p.id),
            content,
            status,
        );
        let comment = self.comments.create(&comment).await?;

        tracing::info!(
            comment_id = comment.id,
            article_id = article.id,
            status = %comment.status,
            "Comment created"
        );
        self.events
            .publish(DomainEvent::CommentCreated {
                comment_id: comment.id,
                article_id: article.id,
                article_title: article.title.clone(),
                article_author_id: article.author_id,
                parent_author_id: parent.map(|p| p.user_id),
                actor_id,
                approved,
            })
            .await;

        self.with_author(comment).await
    }

    /// Approved comments of a published article, threaded
    pub async fn list_for_article(&self, article_id: i64) -> ServiceResult<Vec<CommentThread>> {
        let article = self.published_article(article_id).await?;
        let comments = self.comments.list_approved_for_article(article.id).await?;
        let comments = self.load_authors(comments).await?;
        Ok(CommentThread::build(comments))
    }

    /// Edit own comment
    pub async fn update(
        &self,
        actor_id: i64,
        id: i64,
        content: &str,
    ) -> ServiceResult<CommentWithAuthor> {
        let mut comment = self.find(id).await?;
        if comment.user_id != actor_id {
            return Err(ServiceError::forbidden("You can only edit your own comments"));
        }

        comment.content = validate_content(content)?;
        comment.updated_at = Utc::now();
        let comment = self.comments.update(&comment).await?;
        self.with_author(comment).await
    }

    pub async fn delete(&self, actor_id: i64, id: i64) -> ServiceResult<()> {
        let comment = self.find(id).await?;
        if comment.user_id != actor_id && !self.rbac.has_permission(actor_id, MODERATE).await? {
            return Err(ServiceError::forbidden("You cannot delete this comment"));
        }

        self.comments.delete(id).await?;
        self.events
            .publish(DomainEvent::CommentDeleted {
                comment_id: id,
                article_id: comment.article_id,
                actor_id,
            })
            .await;
        Ok(())
    }

    pub async fn approve(&self, actor_id: i64, id: i64) -> ServiceResult<CommentWithAuthor> {
        let comment = self.moderate(actor_id, id, CommentStatus::Approved).await?;
        self.events
            .publish(DomainEvent::CommentApproved {
                comment_id: id,
                actor_id,
            })
            .await;
        self.with_author(comment).await
    }

    pub async fn reject(&self, actor_id: i64, id: i64) -> ServiceResult<CommentWithAuthor> {
        let comment = self.moderate(actor_id, id, CommentStatus::Rejected).await?;
        self.events
            .publish(DomainEvent::CommentRejected {
                comment_id: id,
                actor_id,
            })
            .await;
        self.with_author(comment).await
    }

    /// Flag an approved comment for moderators
    pub async fn report(&self, actor_id: i64, id: i64) -> ServiceResult<Comment> {
        let comment = self.find(id).await?;
        if comment.status != CommentStatus::Approved {
            return Err(ServiceError::not_found("Comment"));
        }

        let report_count = self.comments.increment_report_count(id).await?;
        tracing::info!(comment_id = id, actor_id, report_count, "Comment reported");
        self.events
            .publish(DomainEvent::CommentReported {
                comment_id: id,
                actor_id,
                report_count,
            })
            .await;
        self.find(id).await
    }

    pub async fn moderation_queue(
        &self,
        actor_id: i64,
        filter: &CommentFilter,
        params: &ListParams,
    ) -> ServiceResult<PagedResult<CommentWithAuthor>> {
        self.rbac.authorize(actor_id, MODERATE).await?;

        let params = params.normalized();
        let (comments, total) = self.comments.list(filter, &params).await?;
        let items = self.load_authors(comments).await?;
        Ok(PagedResult::new(items, total, &params))
    }

    async fn moderate(&self, actor_id: i64, id: i64, status: CommentStatus) -> ServiceResult<Comment> {
        self.rbac.authorize(actor_id, MODERATE).await?;
        let mut comment = self.find(id).await?;

        comment.status = status;
        comment.updated_at = Utc::now();
        Ok(self.comments.update(&comment).await?)
    }

    async fn published_article(&self, article_id: i64) -> ServiceResult<Article> {
        self.articles
            .get_by_id(article_id)
            .await?
            .filter(Article::is_published)
            .ok_or_else(|| ServiceError::not_found("Article"))
    }

    async fn find(&self, id: i64) -> ServiceResult<Comment> {
        self.comments
            .get_by_id(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Comment"))
    }

    async fn with_author(&self, comment: Comment) -> ServiceResult<CommentWithAuthor> {
        let author = self.users.get_by_id(comment.user_id).await?.map(|u| u.summary());
        Ok(CommentWithAuthor { comment, author })
    }

    async fn load_authors(&self, comments: Vec<Comment>) -> ServiceResult<Vec<CommentWithAuthor>> {
        let ids: Vec<i64> = comments
            .iter()
            .map(|c| c.user_id)
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        let authors: HashMap<i64, UserSummary> = if ids.is_empty() {
            HashMap::new()
        } else {
            self.users
                .get_many(&ids)
                .await?
                .into_iter()
                .map(|u| (u.id, u.summary()))
                .collect()
        };

        Ok(comments
            .into_iter()
            .map(|comment| CommentWithAuthor {
                author: authors.get(&comment.user_id).cloned(),
                comment,
            })
            .collect())
    }
}

fn validate_content(content: &str) -> ServiceResult<String> {
    let content = content.trim();
    let len = content.chars().count();
    if len == 0 || len > MAX_CONTENT_LEN {
        return Err(ServiceError::field(
            "content",
            format!("The comment must be between 1 and {} characters", MAX_CONTENT_LEN),
        ));
    }
    Ok(content.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ArticleStatus, CreateArticleInput, User};
    use crate::services::testing::{self, TestContext};

    async fn publish(ctx: &TestContext, editor: &User, title: &str) -> i64 {
        ctx.services
            .articles
            .create(
                editor.id,
                CreateArticleInput {
                    title: title.into(),
                    slug: None,
                    excerpt: None,
                    content: "Body".into(),
                    status: Some(ArticleStatus::Published),
                    category_ids: vec![],
                    tags: vec![],
                },
            )
            .await
            .unwrap()
            .article
            .id
    }

    fn text(content: &str) -> CreateCommentInput {
        CreateCommentInput {
            content: content.into(),
            parent_id: None,
        }
    }

    #[tokio::test]
    async fn test_status_depends_on_moderation_rights() {
        let ctx = testing::context().await;
        let editor = ctx.user("editor", "editor").await;
        let reader = ctx.user("reader", "subscriber").await;
        let article_id = publish(&ctx, &editor, "Post").await;
        let comments = &ctx.services.comments;

        let pending = comments.create(reader.id, article_id, text("Hi")).await.unwrap();
        assert_eq!(pending.comment.status, CommentStatus::Pending);
        assert_eq!(pending.author.as_ref().unwrap().username, "reader");

        let approved = comments.create(editor.id, article_id, text("Hello")).await.unwrap();
        assert_eq!(approved.comment.status, CommentStatus::Approved);
    }

    #[tokio::test]
    async fn test_auto_approve_setting() {
        let ctx = testing::context_with(|c| c.comments.auto_approve = true).await;
        let editor = ctx.user("editor", "editor").await;
        let reader = ctx.user("reader", "subscriber").await;
        let article_id = publish(&ctx, &editor, "Post").await;

        let created = ctx
            .services
            .comments
            .create(reader.id, article_id, text("Hi"))
            .await
            .unwrap();
        assert_eq!(created.comment.status, CommentStatus::Approved);
    }

    #[tokio::test]
    async fn test_create_validation() {
        let ctx = testing::context().await;
        let editor = ctx.user("editor", "editor").await;
        let reader = ctx.user("reader", "subscriber").await;
        let first = publish(&ctx, &editor, "First").await;
        let second = publish(&ctx, &editor, "Second").await;
        let comments = &ctx.services.comments;

        assert!(matches!(
            comments.create(reader.id, first, text("   ")).await,
            Err(ServiceError::Validation { .. })
        ));
        assert!(matches!(
            comments
                .create(reader.id, first, text(&"x".repeat(MAX_CONTENT_LEN + 1)))
                .await,
            Err(ServiceError::Validation { .. })
        ));
        assert!(matches!(
            comments.create(reader.id, 999, text("Hi")).await,
            Err(ServiceError::NotFound(_))
        ));

        let on_first = comments.create(editor.id, first, text("Root")).await.unwrap();
        let cross = CreateCommentInput {
            content: "Reply".into(),
            parent_id: Some(on_first.comment.id),
        };
        assert!(matches!(
            comments.create(reader.id, second, cross).await,
            Err(ServiceError::Validation { .. })
        ));
    }

    #[tokio::test]
    async fn test_list_for_article_is_threaded_and_approved_only() {
        let ctx = testing::context().await;
        let editor = ctx.user("editor", "editor").await;
        let reader = ctx.user("reader", "subscriber").await;
        let article_id = publish(&ctx, &editor, "Post").await;
        let comments = &ctx.services.comments;

        let root = comments.create(editor.id, article_id, text("Root")).await.unwrap();
        let reply = comments
            .create(
                reader.id,
                article_id,
                CreateCommentInput {
                    content: "Reply".into(),
                    parent_id: Some(root.comment.id),
                },
            )
            .await
            .unwrap();
        comments.create(reader.id, article_id, text("Unmoderated")).await.unwrap();

        let threads = comments.list_for_article(article_id).await.unwrap();
        assert_eq!(threads.len(), 1);
        assert!(threads[0].replies.is_empty());

        comments.approve(editor.id, reply.comment.id).await.unwrap();
        let threads = comments.list_for_article(article_id).await.unwrap();
        assert_eq!(threads[0].replies.len(), 1);
        assert_eq!(threads[0].replies[0].author.as_ref().unwrap().username, "reader");
    }

    #[tokio::test]
    async fn test_update_and_delete_permissions() {
        let ctx = testing::context().await;
        let editor = ctx.user("editor", "editor").await;
        let reader = ctx.user("reader", "subscriber").await;
        let other = ctx.user("other", "subscriber").await;
        let article_id = publish(&ctx, &editor, "Post").await;
        let comments = &ctx.services.comments;

        let mine = comments.create(reader.id, article_id, text("Mine")).await.unwrap();
        let id = mine.comment.id;

        assert!(matches!(
            comments.update(editor.id, id, "Edited by editor").await,
            Err(ServiceError::Forbidden(_))
        ));
        let edited = comments.update(reader.id, id, "  Edited  ").await.unwrap();
        assert_eq!(edited.comment.content, "Edited");

        assert!(matches!(
            comments.delete(other.id, id).await,
            Err(ServiceError::Forbidden(_))
        ));
        comments.delete(editor.id, id).await.unwrap();
        assert!(matches!(
            comments.delete(reader.id, id).await,
            Err(ServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_report_and_moderation_queue() {
        let ctx = testing::context().await;
        let editor = ctx.user("editor", "editor").await;
        let reader = ctx.user("reader", "subscriber").await;
        let article_id = publish(&ctx, &editor, "Post").await;
        let comments = &ctx.services.comments;

        let approved = comments.create(editor.id, article_id, text("Spam?")).await.unwrap();
        let pending = comments.create(reader.id, article_id, text("Waiting")).await.unwrap();

        comments.report(reader.id, approved.comment.id).await.unwrap();
        let reported = comments.report(reader.id, approved.comment.id).await.unwrap();
        assert_eq!(reported.report_count, 2);
        assert!(matches!(
            comments.report(editor.id, pending.comment.id).await,
            Err(ServiceError::NotFound(_))
        ));

        let params = ListParams::default();
        let queue = comments
            .moderation_queue(
                editor.id,
                &CommentFilter {
                    status: Some(CommentStatus::Pending),
                    ..Default::default()
                },
                &params,
            )
            .await
            .unwrap();
        assert_eq!(queue.total, 1);
        assert_eq!(queue.items[0].comment.id, pending.comment.id);

        let flagged = comments
            .moderation_queue(
                editor.id,
                &CommentFilter {
                    reported: Some(true),
                    ..Default::default()
                },
                &params,
            )
            .await
            .unwrap();
        assert_eq!(flagged.total, 1);

        assert!(matches!(
            comments
                .moderation_queue(reader.id, &CommentFilter::default(), &params)
                .await,
            Err(ServiceError::Forbidden(_))
        ));

        let rejected = comments.reject(editor.id, pending.comment.id).await.unwrap();
        assert_eq!(rejected.comment.status, CommentStatus::Rejected);
    }
}
