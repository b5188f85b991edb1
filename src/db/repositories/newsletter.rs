//! Newsletter subscriber repository

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::db::{with_pool, DynDatabasePool, LastInsertId};
use crate::models::{ListParams, NewsletterStats, NewsletterSubscriber, SubscriberStatus};

#[async_trait]
pub trait NewsletterRepository: Send + Sync {
    async fn create(&self, subscriber: &NewsletterSubscriber) -> Result<NewsletterSubscriber>;

    async fn get_by_id(&self, id: i64) -> Result<Option<NewsletterSubscriber>>;

    async fn get_by_email(&self, email: &str) -> Result<Option<NewsletterSubscriber>>;

    async fn get_by_token(&self, token: &str) -> Result<Option<NewsletterSubscriber>>;

    /// Persist name, status, token and timestamps
    async fn update(&self, subscriber: &NewsletterSubscriber) -> Result<NewsletterSubscriber>;

    async fn delete(&self, id: i64) -> Result<bool>;

    async fn list(
        &self,
        status: Option<SubscriberStatus>,
        params: &ListParams,
    ) -> Result<(Vec<NewsletterSubscriber>, i64)>;

    /// Every subscriber in `subscribed` state
    async fn list_subscribed(&self) -> Result<Vec<NewsletterSubscriber>>;

    async fn stats(&self) -> Result<NewsletterStats>;
}

pub struct SqlxNewsletterRepository {
    pool: DynDatabasePool,
}

impl SqlxNewsletterRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn NewsletterRepository> {
        Arc::new(Self::new(pool))
    }

    async fn find_one(&self, column: &str, value: &str) -> Result<Option<NewsletterSubscriber>> {
        let sql = format!(
            "SELECT {} FROM newsletter_subscribers WHERE {} = ?",
            SUBSCRIBER_COLUMNS, column
        );
        let row = with_pool!(self.pool, pool => {
            sqlx::query_as::<_, SubscriberRow>(&sql)
                .bind(value)
                .fetch_optional(pool)
                .await
                .with_context(|| format!("Failed to get subscriber by {}", column))?
        });
        row.map(NewsletterSubscriber::try_from).transpose()
    }
}

const SUBSCRIBER_COLUMNS: &str =
    "id, email, name, status, token, confirmed_at, unsubscribed_at, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct SubscriberRow {
    id: i64,
    email: String,
    name: Option<String>,
    status: String,
    token: String,
    confirmed_at: Option<DateTime<Utc>>,
    unsubscribed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<SubscriberRow> for NewsletterSubscriber {
    type Error = anyhow::Error;

    fn try_from(row: SubscriberRow) -> Result<Self> {
        Ok(NewsletterSubscriber {
            status: row
                .status
                .parse()
                .with_context(|| format!("Invalid status for subscriber {}", row.id))?,
            id: row.id,
            email: row.email,
            name: row.name,
            token: row.token,
            confirmed_at: row.confirmed_at,
            unsubscribed_at: row.unsubscribed_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn into_subscribers(rows: Vec<SubscriberRow>) -> Result<Vec<NewsletterSubscriber>> {
    rows.into_iter().map(NewsletterSubscriber::try_from).collect()
}

#[async_trait]
impl NewsletterRepository for SqlxNewsletterRepository {
    async fn create(&self, subscriber: &NewsletterSubscriber) -> Result<NewsletterSubscriber> {
        let now = Utc::now();
        let id = with_pool!(self.pool, pool => {
            sqlx::query(
                r#"
                INSERT INTO newsletter_subscribers (email, name, status, token, confirmed_at,
                                                    unsubscribed_at, created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&subscriber.email)
            .bind(&subscriber.name)
            .bind(subscriber.status.as_str())
            .bind(&subscriber.token)
            .bind(subscriber.confirmed_at)
            .bind(subscriber.unsubscribed_at)
            .bind(now)
            .bind(now)
            .execute(pool)
            .await
            .context("Failed to create subscriber")?
            .last_id()
        });
        Ok(NewsletterSubscriber {
            id,
            created_at: now,
            updated_at: now,
            ..subscriber.clone()
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<NewsletterSubscriber>> {
        let sql = format!(
            "SELECT {} FROM newsletter_subscribers WHERE id = ?",
            SUBSCRIBER_COLUMNS
        );
        let row = with_pool!(self.pool, pool => {
            sqlx::query_as::<_, SubscriberRow>(&sql)
                .bind(id)
                .fetch_optional(pool)
                .await
                .context("Failed to get subscriber by ID")?
        });
        row.map(NewsletterSubscriber::try_from).transpose()
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<NewsletterSubscriber>> {
        self.find_one("email", email).await
    }

    async fn get_by_token(&self, token: &str) -> Result<Option<NewsletterSubscriber>> {
        self.find_one("token", token).await
    }

    async fn update(&self, subscriber: &NewsletterSubscriber) -> Result<NewsletterSubscriber> {
        let now = Utc::now();
        with_pool!(self.pool, pool => {
            sqlx::query(
                r#"
                UPDATE newsletter_subscribers
                SET name = ?, status = ?, token = ?, confirmed_at = ?, unsubscribed_at = ?,
                    updated_at = ?
                WHERE id = ?
                "#,
            )
            .bind(&subscriber.name)
            .bind(subscriber.status.as_str())
            .bind(&subscriber.token)
            .bind(subscriber.confirmed_at)
            .bind(subscriber.unsubscribed_at)
            .bind(now)
            .bind(subscriber.id)
            .execute(pool)
            .await
            .context("Failed to update subscriber")?;
        });
        self.get_by_id(subscriber.id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Subscriber {} not found after update", subscriber.id))
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let affected = with_pool!(self.pool, pool => {
            sqlx::query("DELETE FROM newsletter_subscribers WHERE id = ?")
                .bind(id)
                .execute(pool)
                .await
                .context("Failed to delete subscriber")?
                .rows_affected()
        });
        Ok(affected > 0)
    }

    async fn list(
        &self,
        status: Option<SubscriberStatus>,
        params: &ListParams,
    ) -> Result<(Vec<NewsletterSubscriber>, i64)> {
        let status_sql = if status.is_some() { " WHERE status = ?" } else { "" };
        let status_value = status.map(|s| s.as_str());
        let count_sql = format!("SELECT COUNT(*) FROM newsletter_subscribers{}", status_sql);
        let list_sql = format!(
            "SELECT {} FROM newsletter_subscribers{} ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?",
            SUBSCRIBER_COLUMNS, status_sql
        );

        let (rows, total) = with_pool!(self.pool, pool => {
            let mut count_query = sqlx::query_scalar(&count_sql);
            let mut list_query = sqlx::query_as(&list_sql);
            if let Some(value) = status_value {
                count_query = count_query.bind(value);
                list_query = list_query.bind(value);
            }
            let total: i64 = count_query
                .fetch_one(pool)
                .await
                .context("Failed to count subscribers")?;
            let rows: Vec<SubscriberRow> = list_query
                .bind(params.limit())
                .bind(params.offset())
                .fetch_all(pool)
                .await
                .context("Failed to list subscribers")?;
            (rows, total)
        });

        Ok((into_subscribers(rows)?, total))
    }

    async fn list_subscribed(&self) -> Result<Vec<NewsletterSubscriber>> {
        let sql = format!(
            "SELECT {} FROM newsletter_subscribers WHERE status = ? ORDER BY id",
            SUBSCRIBER_COLUMNS
        );
        let rows = with_pool!(self.pool, pool => {
            sqlx::query_as::<_, SubscriberRow>(&sql)
                .bind(SubscriberStatus::Subscribed.as_str())
                .fetch_all(pool)
                .await
                .context("Failed to list subscribed addresses")?
        });
        into_subscribers(rows)
    }

    async fn stats(&self) -> Result<NewsletterStats> {
        let counts: Vec<(String, i64)> = with_pool!(self.pool, pool => {
            sqlx::query_as("SELECT status, COUNT(*) FROM newsletter_subscribers GROUP BY status")
                .fetch_all(pool)
                .await
                .context("Failed to count subscribers by status")?
        });

        let mut stats = NewsletterStats::default();
        for (status, count) in counts {
            match status.parse::<SubscriberStatus>() {
                Ok(SubscriberStatus::Pending) => stats.pending = count,
                Ok(SubscriberStatus::Subscribed) => stats.subscribed = count,
                Ok(SubscriberStatus::Unsubscribed) => stats.unsubscribed = count,
                Err(_) => tracing::warn!(status = %status, "Unknown subscriber status"),
            }
            stats.total += count;
        }
        Ok(stats)
    }
}
