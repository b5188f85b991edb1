//! Built-in event listeners

use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;

use super::{DomainEvent, EventListener};
use crate::cache::CacheService;
use crate::models::NewNotification;
use crate::services::NotificationService;

/// Turns workflow events into in-app notifications. The user who caused an
/// event is never notified about it.
pub struct NotificationListener {
    notifications: Arc<NotificationService>,
}

impl NotificationListener {
    pub fn new(notifications: Arc<NotificationService>) -> Self {
        Self { notifications }
    }

    async fn send(&self, user_id: i64, notification: NewNotification) -> anyhow::Result<()> {
        self.notifications
            .notify(user_id, notification)
            .await
            .map(|_| ())
            .map_err(anyhow::Error::from)
    }
}

#[async_trait]
impl EventListener for NotificationListener {
    fn name(&self) -> &'static str {
        "notifications"
    }

    async fn handle(&self, event: &DomainEvent) -> anyhow::Result<()> {
        match event {
            DomainEvent::ArticleApproved {
                article_id,
                author_id,
                actor_id,
                title,
            } if author_id != actor_id => {
                self.send(
                    *author_id,
                    NewNotification::new(
                        "article.approved",
                        "Your article was published",
                        format!("\"{}\" has been approved and published.", title),
                    )
                    .with_data(json!({ "article_id": article_id })),
                )
                .await
            }
            DomainEvent::ArticleRejected {
                article_id,
                author_id,
                actor_id,
                title,
                reason,
            } if author_id != actor_id => {
                self.send(
                    *author_id,
                    NewNotification::new(
                        "article.rejected",
                        "Your article was not accepted",
                        format!("\"{}\" was rejected: {}", title, reason),
                    )
                    .with_data(json!({ "article_id": article_id, "reason": reason })),
                )
                .await
            }
            DomainEvent::CommentCreated {
                comment_id,
                article_id,
                article_title,
                article_author_id,
                parent_author_id,
                actor_id,
                ..
            } => {
                let data = json!({ "article_id": article_id, "comment_id": comment_id });
                let mut notified = None;

                if let Some(parent_author) = parent_author_id.filter(|id| id != actor_id) {
                    self.send(
                        parent_author,
                        NewNotification::new(
                            "comment.reply",
                            "New reply to your comment",
                            format!("Someone replied to your comment on \"{}\".", article_title),
                        )
                        .with_data(data.clone()),
                    )
                    .await?;
                    notified = Some(parent_author);
                }

                if article_author_id != actor_id && notified != Some(*article_author_id) {
                    self.send(
                        *article_author_id,
                        NewNotification::new(
                            "comment.created",
                            "New comment on your article",
                            format!("\"{}\" received a new comment.", article_title),
                        )
                        .with_data(data),
                    )
                    .await?;
                }
                Ok(())
            }
            DomainEvent::UserBanned { user_id, .. } => {
                self.send(
                    *user_id,
                    NewNotification::new(
                        "account.banned",
                        "Your account has been suspended",
                        "An administrator has banned your account.",
                    ),
                )
                .await
            }
            _ => Ok(()),
        }
    }
}

/// Structured audit trail of every domain event
pub struct AuditLogListener;

#[async_trait]
impl EventListener for AuditLogListener {
    fn name(&self) -> &'static str {
        "audit_log"
    }

    async fn handle(&self, event: &DomainEvent) -> anyhow::Result<()> {
        let payload = serde_json::to_string(event)?;
        tracing::info!(target: "quire::audit", event = event.name(), %payload, "Domain event");
        Ok(())
    }
}

/// Publication changes move the article counts shown on category and tag
/// listings
pub struct CacheInvalidationListener {
    cache: CacheService,
}

impl CacheInvalidationListener {
    pub fn new(cache: CacheService) -> Self {
        Self { cache }
    }
}

#[async_trait]
impl EventListener for CacheInvalidationListener {
    fn name(&self) -> &'static str {
        "cache_invalidation"
    }

    async fn handle(&self, event: &DomainEvent) -> anyhow::Result<()> {
        if event.is_article_event() && !matches!(event, DomainEvent::ArticleReported { .. }) {
            self.cache.forget_prefix("categories:").await;
            self.cache.forget_prefix("tags:").await;
        }
        Ok(())
    }
}
