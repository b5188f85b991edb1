//! Newsletter subscriptions and campaigns
//!
//! Double opt-in: `subscribe` issues a token and mails a confirmation link;
//! `confirm` with that token activates the subscription and the same token
//! later unsubscribes. Confirmation mail is best effort, a delivery failure
//! does not fail the subscription.

use std::sync::Arc;

use chrono::Utc;

use crate::config::AppConfig;
use crate::db::repositories::NewsletterRepository;
use crate::events::{DomainEvent, EventBus};
use crate::models::{
    CampaignInput, CampaignReport, ListParams, NewsletterStats, NewsletterSubscriber, PagedResult,
    SubscribeInput, SubscriberStatus,
};
use crate::services::email::EmailService;
use crate::services::error::{ServiceError, ServiceResult, Validator};
use crate::services::markdown::MarkdownRenderer;
use crate::services::role::RoleService;
use crate::services::validation::{is_valid_email, normalize_email};

pub const MANAGE: &str = "newsletter.manage";

pub struct NewsletterService {
    subscribers: Arc<dyn NewsletterRepository>,
    rbac: Arc<RoleService>,
    email: Arc<EmailService>,
    events: Arc<EventBus>,
    markdown: MarkdownRenderer,
    app: AppConfig,
}

impl NewsletterService {
    pub fn new(
        subscribers: Arc<dyn NewsletterRepository>,
        rbac: Arc<RoleService>,
        email: Arc<EmailService>,
        events: Arc<EventBus>,
        markdown: MarkdownRenderer,
        app: AppConfig,
    ) -> Self {
        Self {
            subscribers,
            rbac,
            email,
            events,
            markdown,
            app,
        }
    }

    pub async fn subscribe(&self, input: SubscribeInput) -> ServiceResult<NewsletterSubscriber> {
        let email = normalize_email(&input.email);
        let name = input
            .name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty());

        let mut v = Validator::new();
        v.check(is_valid_email(&email), "email", "The email must be a valid email address")
            .check(
                name.as_ref().map_or(true, |n| n.chars().count() <= 100),
                "name",
                "The name may not exceed 100 characters",
            );
        v.finish()?;

        let subscriber = match self.subscribers.get_by_email(&email).await? {
            Some(existing) if existing.status == SubscriberStatus::Subscribed => {
                return Err(ServiceError::field(
                    "email",
                    "This address is already subscribed",
                ));
            }
            Some(mut existing) => {
                existing.status = SubscriberStatus::Pending;
                existing.token = new_token();
                existing.unsubscribed_at = None;
                if name.is_some() {
                    existing.name = name;
                }
                self.subscribers.update(&existing).await?
            }
            None => {
                let now = Utc::now();
                let subscriber = NewsletterSubscriber {
                    id: 0,
                    email,
                    name,
                    status: SubscriberStatus::Pending,
                    token: new_token(),
                    confirmed_at: None,
                    unsubscribed_at: None,
                    created_at: now,
                    updated_at: now,
                };
                self.subscribers.create(&subscriber).await?
            }
        };

        self.send_confirmation(&subscriber).await;
        self.events
            .publish(DomainEvent::NewsletterSubscribed {
                subscriber_id: subscriber.id,
                email: subscriber.email.clone(),
            })
            .await;
        Ok(subscriber)
    }

    pub async fn confirm(&self, token: &str) -> ServiceResult<NewsletterSubscriber> {
        let mut subscriber = self.find_by_token(token).await?;
        if subscriber.status == SubscriberStatus::Subscribed {
            return Ok(subscriber);
        }

        subscriber.status = SubscriberStatus::Subscribed;
        subscriber.confirmed_at = Some(Utc::now());
        subscriber.unsubscribed_at = None;
        let subscriber = self.subscribers.update(&subscriber).await?;

        self.events
            .publish(DomainEvent::NewsletterConfirmed {
                subscriber_id: subscriber.id,
            })
            .await;
        Ok(subscriber)
    }

    pub async fn unsubscribe(&self, token: &str) -> ServiceResult<NewsletterSubscriber> {
        let mut subscriber = self.find_by_token(token).await?;
        if subscriber.status == SubscriberStatus::Unsubscribed {
            return Ok(subscriber);
        }

        subscriber.status = SubscriberStatus::Unsubscribed;
        subscriber.unsubscribed_at = Some(Utc::now());
        let subscriber = self.subscribers.update(&subscriber).await?;

        self.events
            .publish(DomainEvent::NewsletterUnsubscribed {
                subscriber_id: subscriber.id,
            })
            .await;
        Ok(subscriber)
    }

    // ------------------------------------------------------------------
    // Administration
    // ------------------------------------------------------------------

    pub async fn list(
        &self,
        actor_id: i64,
        status: Option<SubscriberStatus>,
        params: &ListParams,
    ) -> ServiceResult<PagedResult<NewsletterSubscriber>> {
        self.rbac.authorize(actor_id, MANAGE).await?;
        let params = params.normalized();
        let (items, total) = self.subscribers.list(status, &params).await?;
        Ok(PagedResult::new(items, total, &params))
    }

    pub async fn stats(&self, actor_id: i64) -> ServiceResult<NewsletterStats> {
        self.rbac.authorize(actor_id, MANAGE).await?;
        Ok(self.subscribers.stats().await?)
    }

    pub async fn delete(&self, actor_id: i64, id: i64) -> ServiceResult<()> {
        self.rbac.authorize(actor_id, MANAGE).await?;
        if !self.subscribers.delete(id).await? {
            return Err(ServiceError::not_found("Subscriber"));
        }
        Ok(())
    }

    /// Mail every confirmed subscriber. Individual delivery failures are
    /// counted in the report, not returned.
    pub async fn send_campaign(
        &self,
        actor_id: i64,
        input: CampaignInput,
    ) -> ServiceResult<CampaignReport> {
        self.rbac.authorize(actor_id, MANAGE).await?;

        let subject = input.subject.trim();
        let mut v = Validator::new();
        v.check(
            !subject.is_empty() && subject.chars().count() <= 255,
            "subject",
            "The subject is required and may not exceed 255 characters",
        )
        .check(!input.body.trim().is_empty(), "body", "The body is required");
        v.finish()?;

        if !self.email.is_enabled() {
            return Err(ServiceError::invalid("Mail delivery is not enabled"));
        }

        let html = self.markdown.render(&input.body);
        let recipients = self.subscribers.list_subscribed().await?;
        let mut report = CampaignReport {
            recipients: recipients.len(),
            ..Default::default()
        };

        for subscriber in &recipients {
            let unsubscribe = self.link("unsubscribe", &subscriber.token);
            let text = format!("{}\n\n--\nUnsubscribe: {}", input.body, unsubscribe);
            let html = format!(
                "{}<hr><p><a href=\"{}\">Unsubscribe</a></p>",
                html, unsubscribe
            );

            match self
                .email
                .send(&subscriber.email, subject, &text, Some(&html))
                .await
            {
                Ok(_) => report.sent += 1,
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!(subscriber_id = subscriber.id, error = %e, "Campaign delivery failed");
                }
            }
        }

        tracing::info!(
            actor_id,
            recipients = report.recipients,
            sent = report.sent,
            failed = report.failed,
            "Newsletter campaign sent"
        );
        Ok(report)
    }

    async fn find_by_token(&self, token: &str) -> ServiceResult<NewsletterSubscriber> {
        let token = token.trim();
        if token.is_empty() {
            return Err(ServiceError::not_found("Subscription"));
        }
        self.subscribers
            .get_by_token(token)
            .await?
            .ok_or_else(|| ServiceError::not_found("Subscription"))
    }

    async fn send_confirmation(&self, subscriber: &NewsletterSubscriber) {
        let link = self.link("confirm", &subscriber.token);
        let subject = format!("Confirm your subscription to {}", self.app.name);
        let text = format!(
            "Please confirm your subscription to {} by opening this link:\n\n{}\n\n\
             If you did not ask for this, ignore this message.",
            self.app.name, link
        );

        if let Err(e) = self.email.send(&subscriber.email, &subject, &text, None).await {
            tracing::warn!(
                subscriber_id = subscriber.id,
                error = %e,
                "Confirmation email could not be sent"
            );
        }
    }

    fn link(&self, action: &str, token: &str) -> String {
        format!(
            "{}/newsletter/{}?token={}",
            self.app.url.trim_end_matches('/'),
            action,
            token
        )
    }
}

fn new_token() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MailConfig;
    use crate::services::testing;

    fn input(email: &str) -> SubscribeInput {
        SubscribeInput {
            email: email.to_string(),
            name: Some("Reader".into()),
        }
    }

    #[tokio::test]
    async fn test_double_opt_in_lifecycle() {
        let ctx = testing::context().await;
        let service = &ctx.services.newsletter;

        let pending = service.subscribe(input(" Reader@Example.com ")).await.unwrap();
        assert_eq!(pending.email, "reader@example.com");
        assert_eq!(pending.status, SubscriberStatus::Pending);

        let confirmed = service.confirm(&pending.token).await.unwrap();
        assert_eq!(confirmed.status, SubscriberStatus::Subscribed);
        assert!(confirmed.confirmed_at.is_some());

        assert!(matches!(
            service.subscribe(input("reader@example.com")).await,
            Err(ServiceError::Validation { .. })
        ));

        let gone = service.unsubscribe(&pending.token).await.unwrap();
        assert_eq!(gone.status, SubscriberStatus::Unsubscribed);

        let again = service.subscribe(input("reader@example.com")).await.unwrap();
        assert_eq!(again.id, pending.id);
        assert_eq!(again.status, SubscriberStatus::Pending);
        assert_ne!(again.token, pending.token);
        assert!(matches!(
            service.confirm(&pending.token).await,
            Err(ServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_subscribe_validation_and_unknown_token() {
        let ctx = testing::context().await;
        let service = &ctx.services.newsletter;

        assert!(matches!(
            service.subscribe(input("not-an-email")).await,
            Err(ServiceError::Validation { .. })
        ));
        assert!(matches!(
            service.confirm("missing").await,
            Err(ServiceError::NotFound(_))
        ));
        assert!(matches!(
            service.unsubscribe("").await,
            Err(ServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_admin_listing_and_stats() {
        let ctx = testing::context().await;
        let admin = ctx.user("root", "admin").await;
        let author = ctx.user("writer", "author").await;
        let service = &ctx.services.newsletter;

        let a = service.subscribe(input("a@example.com")).await.unwrap();
        service.subscribe(input("b@example.com")).await.unwrap();
        service.confirm(&a.token).await.unwrap();

        let stats = service.stats(admin.id).await.unwrap();
        assert_eq!(stats.subscribed, 1);
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.total, 2);

        let params = ListParams::default();
        let subscribed = service
            .list(admin.id, Some(SubscriberStatus::Subscribed), &params)
            .await
            .unwrap();
        assert_eq!(subscribed.total, 1);

        assert!(matches!(
            service.stats(author.id).await,
            Err(ServiceError::Forbidden(_))
        ));

        service.delete(admin.id, a.id).await.unwrap();
        assert!(matches!(
            service.delete(admin.id, a.id).await,
            Err(ServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_campaign_requires_mail() {
        let ctx = testing::context().await;
        let admin = ctx.user("root", "admin").await;

        let result = ctx
            .services
            .newsletter
            .send_campaign(
                admin.id,
                CampaignInput {
                    subject: "News".into(),
                    body: "Hello".into(),
                },
            )
            .await;
        assert!(matches!(result, Err(ServiceError::Validation { .. })));
    }

    #[tokio::test]
    async fn test_campaign_counts_failures() {
        let ctx = testing::context_with(|c| {
            c.mail = MailConfig {
                enabled: true,
                smtp_host: "127.0.0.1".into(),
                smtp_port: 1,
                ..Default::default()
            }
        })
        .await;
        let admin = ctx.user("root", "admin").await;
        let service = &ctx.services.newsletter;

        for email in ["a@example.com", "b@example.com"] {
            let s = service.subscribe(input(email)).await.unwrap();
            service.confirm(&s.token).await.unwrap();
        }
        service.subscribe(input("pending@example.com")).await.unwrap();

        let report = service
            .send_campaign(
                admin.id,
                CampaignInput {
                    subject: "Monthly".into(),
                    body: "# Hello\n\nNews.".into(),
                },
            )
            .await
            .unwrap();
        assert_eq!(
            report,
            CampaignReport {
                recipients: 2,
                sent: 0,
                failed: 2
            }
        );
    }
}
