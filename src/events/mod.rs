//! In-process domain events
//!
//! Services publish a [`DomainEvent`] after each successful mutation. Listeners
//! are registered once at startup with a priority (lower runs first). A
//! listener failure is logged and never reaches the publisher.

pub mod listeners;

use async_trait::async_trait;
use serde::Serialize;
use std::sync::{Arc, RwLock};

pub use listeners::{AuditLogListener, CacheInvalidationListener, NotificationListener};

/// Listener priority (lower = earlier)
pub const PRIORITY_EARLY: i32 = -100;
pub const PRIORITY_DEFAULT: i32 = 0;
pub const PRIORITY_LATE: i32 = 100;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DomainEvent {
    ArticleCreated {
        article_id: i64,
        author_id: i64,
        status: String,
    },
    ArticleUpdated {
        article_id: i64,
        actor_id: i64,
    },
    ArticleDeleted {
        article_id: i64,
        actor_id: i64,
        permanent: bool,
    },
    ArticleRestored {
        article_id: i64,
        actor_id: i64,
    },
    ArticleApproved {
        article_id: i64,
        author_id: i64,
        actor_id: i64,
        title: String,
    },
    ArticleRejected {
        article_id: i64,
        author_id: i64,
        actor_id: i64,
        title: String,
        reason: String,
    },
    ArticleReported {
        article_id: i64,
        actor_id: i64,
        report_count: i64,
    },
    CommentCreated {
        comment_id: i64,
        article_id: i64,
        article_title: String,
        article_author_id: i64,
        parent_author_id: Option<i64>,
        actor_id: i64,
        approved: bool,
    },
    CommentApproved {
        comment_id: i64,
        actor_id: i64,
    },
    CommentRejected {
        comment_id: i64,
        actor_id: i64,
    },
    CommentReported {
        comment_id: i64,
        actor_id: i64,
        report_count: i64,
    },
    CommentDeleted {
        comment_id: i64,
        article_id: i64,
        actor_id: i64,
    },
    UserRegistered {
        user_id: i64,
        username: String,
    },
    UserBanned {
        user_id: i64,
        actor_id: i64,
    },
    UserUnbanned {
        user_id: i64,
        actor_id: i64,
    },
    UserDeleted {
        user_id: i64,
        actor_id: i64,
    },
    UserRolesChanged {
        user_id: i64,
        actor_id: i64,
        roles: Vec<String>,
    },
    RoleChanged {
        role_id: Option<i64>,
        action: String,
    },
    NewsletterSubscribed {
        subscriber_id: i64,
        email: String,
    },
    NewsletterConfirmed {
        subscriber_id: i64,
    },
    NewsletterUnsubscribed {
        subscriber_id: i64,
    },
    MediaUploaded {
        media_id: i64,
        user_id: i64,
    },
    MediaDeleted {
        media_id: i64,
        actor_id: i64,
    },
}

impl DomainEvent {
    /// Stable dotted name, used in logs
    pub fn name(&self) -> &'static str {
        match self {
            DomainEvent::ArticleCreated { .. } => "article.created",
            DomainEvent::ArticleUpdated { .. } => "article.updated",
            DomainEvent::ArticleDeleted { .. } => "article.deleted",
            DomainEvent::ArticleRestored { .. } => "article.restored",
            DomainEvent::ArticleApproved { .. } => "article.approved",
            DomainEvent::ArticleRejected { .. } => "article.rejected",
            DomainEvent::ArticleReported { .. } => "article.reported",
            DomainEvent::CommentCreated { .. } => "comment.created",
            DomainEvent::CommentApproved { .. } => "comment.approved",
            DomainEvent::CommentRejected { .. } => "comment.rejected",
            DomainEvent::CommentReported { .. } => "comment.reported",
            DomainEvent::CommentDeleted { .. } => "comment.deleted",
            DomainEvent::UserRegistered { .. } => "user.registered",
            DomainEvent::UserBanned { .. } => "user.banned",
            DomainEvent::UserUnbanned { .. } => "user.unbanned",
            DomainEvent::UserDeleted { .. } => "user.deleted",
            DomainEvent::UserRolesChanged { .. } => "user.roles_changed",
            DomainEvent::RoleChanged { .. } => "role.changed",
            DomainEvent::NewsletterSubscribed { .. } => "newsletter.subscribed",
            DomainEvent::NewsletterConfirmed { .. } => "newsletter.confirmed",
            DomainEvent::NewsletterUnsubscribed { .. } => "newsletter.unsubscribed",
            DomainEvent::MediaUploaded { .. } => "media.uploaded",
            DomainEvent::MediaDeleted { .. } => "media.deleted",
        }
    }

    pub fn is_article_event(&self) -> bool {
        self.name().starts_with("article.")
    }
}

#[async_trait]
pub trait EventListener: Send + Sync {
    /// Short identifier used in log lines
    fn name(&self) -> &'static str;

    async fn handle(&self, event: &DomainEvent) -> anyhow::Result<()>;
}

struct Registration {
    listener: Arc<dyn EventListener>,
    priority: i32,
}

#[derive(Default)]
pub struct EventBus {
    listeners: RwLock<Vec<Registration>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener. Equal priorities keep registration order.
    pub fn subscribe(&self, listener: Arc<dyn EventListener>, priority: i32) {
        let mut listeners = self.listeners.write().unwrap_or_else(|e| e.into_inner());
        tracing::debug!(
            listener = listener.name(),
            priority,
            "Registered event listener"
        );
        listeners.push(Registration { listener, priority });
        listeners.sort_by_key(|r| r.priority);
    }

    pub fn listener_count(&self) -> usize {
        self.listeners
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    /// Deliver `event` to every listener in priority order
    pub async fn publish(&self, event: DomainEvent) {
        // Snapshot so the lock is not held across awaits
        let snapshot: Vec<Arc<dyn EventListener>> = self
            .listeners
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|r| r.listener.clone())
            .collect();

        for listener in snapshot {
            if let Err(e) = listener.handle(&event).await {
                tracing::error!(
                    event = event.name(),
                    listener = listener.name(),
                    error = %e,
                    "Event listener failed"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Recorder {
        label: &'static str,
        log: Arc<Mutex<Vec<String>>>,
        fail: bool,
    }

    #[async_trait]
    impl EventListener for Recorder {
        fn name(&self) -> &'static str {
            self.label
        }

        async fn handle(&self, event: &DomainEvent) -> anyhow::Result<()> {
            self.log
                .lock()
                .unwrap()
                .push(format!("{}:{}", self.label, event.name()));
            if self.fail {
                anyhow::bail!("listener {} exploded", self.label);
            }
            Ok(())
        }
    }

    fn recorder(
        label: &'static str,
        log: &Arc<Mutex<Vec<String>>>,
        fail: bool,
    ) -> Arc<dyn EventListener> {
        Arc::new(Recorder {
            label,
            log: log.clone(),
            fail,
        })
    }

    fn sample_event() -> DomainEvent {
        DomainEvent::UserRegistered {
            user_id: 1,
            username: "ada".to_string(),
        }
    }

    #[tokio::test]
    async fn test_listeners_run_in_priority_order() {
        let bus = EventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        bus.subscribe(recorder("late", &log, false), PRIORITY_LATE);
        bus.subscribe(recorder("early", &log, false), PRIORITY_EARLY);
        bus.subscribe(recorder("default", &log, false), PRIORITY_DEFAULT);

        bus.publish(sample_event()).await;

        let log = log.lock().unwrap();
        assert_eq!(
            *log,
            vec![
                "early:user.registered",
                "default:user.registered",
                "late:user.registered"
            ]
        );
    }

    #[tokio::test]
    async fn test_failing_listener_does_not_stop_others() {
        let bus = EventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        bus.subscribe(recorder("broken", &log, true), PRIORITY_EARLY);
        bus.subscribe(recorder("healthy", &log, false), PRIORITY_DEFAULT);

        bus.publish(sample_event()).await;

        assert_eq!(log.lock().unwrap().len(), 2);
        assert_eq!(bus.listener_count(), 2);
    }

    #[tokio::test]
    async fn test_publish_without_listeners() {
        let bus = EventBus::new();
        bus.publish(sample_event()).await;
        assert_eq!(bus.listener_count(), 0);
    }

    #[test]
    fn test_event_names_are_dotted() {
        let event = DomainEvent::ArticleApproved {
            article_id: 1,
            author_id: 2,
            actor_id: 3,
            title: "Hello".to_string(),
        };
        assert_eq!(event.name(), "article.approved");
        assert!(event.is_article_event());
        assert!(!sample_event().is_article_event());
    }

    #[test]
    fn test_event_serializes_with_tag() {
        let json = serde_json::to_value(sample_event()).unwrap();
        assert_eq!(json["event"], "user_registered");
        assert_eq!(json["user_id"], 1);
    }
}
