//! Notification repository
//!
//! `data` is stored as JSON text so both drivers share one column type.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::db::{with_pool, DynDatabasePool, LastInsertId};
use crate::models::{ListParams, NewNotification, Notification};

#[async_trait]
pub trait NotificationRepository: Send + Sync {
    async fn create(&self, user_id: i64, input: &NewNotification) -> Result<Notification>;

    /// Only returns the notification if it belongs to `user_id`
    async fn get_for_user(&self, user_id: i64, id: i64) -> Result<Option<Notification>>;

    async fn list(
        &self,
        user_id: i64,
        unread_only: bool,
        params: &ListParams,
    ) -> Result<(Vec<Notification>, i64)>;

    async fn unread_count(&self, user_id: i64) -> Result<i64>;

    async fn mark_read(&self, user_id: i64, id: i64) -> Result<bool>;

    /// Returns how many were marked
    async fn mark_all_read(&self, user_id: i64) -> Result<u64>;

    async fn delete(&self, user_id: i64, id: i64) -> Result<bool>;
}

pub struct SqlxNotificationRepository {
    pool: DynDatabasePool,
}

impl SqlxNotificationRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn NotificationRepository> {
        Arc::new(Self::new(pool))
    }
}

const NOTIFICATION_COLUMNS: &str = "id, user_id, kind, title, message, data, read_at, created_at";

#[derive(sqlx::FromRow)]
struct NotificationRow {
    id: i64,
    user_id: i64,
    kind: String,
    title: String,
    message: String,
    data: String,
    read_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl TryFrom<NotificationRow> for Notification {
    type Error = anyhow::Error;

    fn try_from(row: NotificationRow) -> Result<Self> {
        Ok(Notification {
            data: serde_json::from_str(&row.data)
                .with_context(|| format!("Invalid data for notification {}", row.id))?,
            id: row.id,
            user_id: row.user_id,
            kind: row.kind,
            title: row.title,
            message: row.message,
            read_at: row.read_at,
            created_at: row.created_at,
        })
    }
}

#[async_trait]
impl NotificationRepository for SqlxNotificationRepository {
    async fn create(&self, user_id: i64, input: &NewNotification) -> Result<Notification> {
        let now = Utc::now();
        let data = serde_json::to_string(&input.data).context("Failed to encode notification data")?;
        let id = with_pool!(self.pool, pool => {
            sqlx::query(
                "INSERT INTO notifications (user_id, kind, title, message, data, created_at) \
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(user_id)
            .bind(&input.kind)
            .bind(&input.title)
            .bind(&input.message)
            .bind(&data)
            .bind(now)
            .execute(pool)
            .await
            .context("Failed to create notification")?
            .last_id()
        });

        Ok(Notification {
            id,
            user_id,
            kind: input.kind.clone(),
            title: input.title.clone(),
            message: input.message.clone(),
            data: input.data.clone(),
            read_at: None,
            created_at: now,
        })
    }

    async fn get_for_user(&self, user_id: i64, id: i64) -> Result<Option<Notification>> {
        let sql = format!(
            "SELECT {} FROM notifications WHERE id = ? AND user_id = ?",
            NOTIFICATION_COLUMNS
        );
        let row = with_pool!(self.pool, pool => {
            sqlx::query_as::<_, NotificationRow>(&sql)
                .bind(id)
                .bind(user_id)
                .fetch_optional(pool)
                .await
                .context("Failed to get notification")?
        });
        row.map(Notification::try_from).transpose()
    }

    async fn list(
        &self,
        user_id: i64,
        unread_only: bool,
        params: &ListParams,
    ) -> Result<(Vec<Notification>, i64)> {
        let unread = if unread_only { " AND read_at IS NULL" } else { "" };
        let count_sql = format!(
            "SELECT COUNT(*) FROM notifications WHERE user_id = ?{}",
            unread
        );
        let list_sql = format!(
            "SELECT {} FROM notifications WHERE user_id = ?{} \
             ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?",
            NOTIFICATION_COLUMNS, unread
        );

        let (rows, total) = with_pool!(self.pool, pool => {
            let total: i64 = sqlx::query_scalar(&count_sql)
                .bind(user_id)
                .fetch_one(pool)
                .await
                .context("Failed to count notifications")?;
            let rows: Vec<NotificationRow> = sqlx::query_as(&list_sql)
                .bind(user_id)
                .bind(params.limit())
                .bind(params.offset())
                .fetch_all(pool)
                .await
                .context("Failed to list notifications")?;
            (rows, total)
        });

        let items = rows
            .into_iter()
            .map(Notification::try_from)
            .collect::<Result<Vec<_>>>()?;
        Ok((items, total))
    }

    async fn unread_count(&self, user_id: i64) -> Result<i64> {
        let count = with_pool!(self.pool, pool => {
            sqlx::query_scalar::<_, i64>(
                "SELECT COUNT(*) FROM notifications WHERE user_id = ? AND read_at IS NULL",
            )
            .bind(user_id)
            .fetch_one(pool)
            .await
            .context("Failed to count unread notifications")?
        });
        Ok(count)
    }

    async fn mark_read(&self, user_id: i64, id: i64) -> Result<bool> {
        let now = Utc::now();
        let affected = with_pool!(self.pool, pool => {
            sqlx::query(
                "UPDATE notifications SET read_at = COALESCE(read_at, ?) WHERE id = ? AND user_id = ?",
            )
            .bind(now)
            .bind(id)
            .bind(user_id)
            .execute(pool)
            .await
            .context("Failed to mark notification read")?
            .rows_affected()
        });
        Ok(affected > 0)
    }

    async fn mark_all_read(&self, user_id: i64) -> Result<u64> {
        let now = Utc::now();
        let affected = with_pool!(self.pool, pool => {
            sqlx::query("UPDATE notifications SET read_at = ? WHERE user_id = ? AND read_at IS NULL")
                .bind(now)
                .bind(user_id)
                .execute(pool)
                .await
                .context("Failed to mark notifications read")?
                .rows_affected()
        });
        Ok(affected)
    }

    async fn delete(&self, user_id: i64, id: i64) -> Result<bool> {
        let affected = with_pool!(self.pool, pool => {
            sqlx::query("DELETE FROM notifications WHERE id = ? AND user_id = ?")
                .bind(id)
                .bind(user_id)
                .execute(pool)
                .await
                .context("Failed to delete notification")?
                .rows_affected()
        });
        Ok(affected > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations};
    use serde_json::json;

    async fn setup() -> SqlxNotificationRepository {
        let pool = create_test_pool().await.unwrap();
        migrations::run_migrations(&pool).await.unwrap();
        let db = pool.as_sqlite().unwrap();
        for name in ["a", "b"] {
            sqlx::query("INSERT INTO users (username, email, password_hash) VALUES (?, ?, 'h')")
                .bind(name)
                .bind(format!("{}@x.io", name))
                .execute(db)
                .await
                .unwrap();
        }
        SqlxNotificationRepository::new(pool)
    }

    #[tokio::test]
    async fn test_create_keeps_json_data() {
        let repo = setup().await;
        let input = NewNotification::new("article.approved", "Approved", "Your article is live")
            .with_data(json!({"article_id": 7}));
        let created = repo.create(1, &input).await.unwrap();

        let found = repo.get_for_user(1, created.id).await.unwrap().unwrap();
        assert_eq!(found.data["article_id"], 7);
        assert!(!found.is_read());
        assert!(repo.get_for_user(2, created.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_read_tracking() {
        let repo = setup().await;
        let first = repo
            .create(1, &NewNotification::new("admin.message", "One", "1"))
            .await
            .unwrap();
        repo.create(1, &NewNotification::new("admin.message", "Two", "2"))
            .await
            .unwrap();
        repo.create(1, &NewNotification::new("admin.message", "Three", "3"))
            .await
            .unwrap();

        assert_eq!(repo.unread_count(1).await.unwrap(), 3);
        assert!(repo.mark_read(1, first.id).await.unwrap());
        assert!(!repo.mark_read(2, first.id).await.unwrap());
        assert_eq!(repo.unread_count(1).await.unwrap(), 2);

        let (unread, total) = repo.list(1, true, &ListParams::default()).await.unwrap();
        assert_eq!(total, 2);
        assert!(unread.iter().all(|n| !n.is_read()));

        assert_eq!(repo.mark_all_read(1).await.unwrap(), 2);
        assert_eq!(repo.unread_count(1).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_delete_scoped_to_owner() {
        let repo = setup().await;
        let n = repo
            .create(1, &NewNotification::new("admin.message", "Hi", "there"))
            .await
            .unwrap();
        assert!(!repo.delete(2, n.id).await.unwrap());
        assert!(repo.delete(1, n.id).await.unwrap());
    }
}
