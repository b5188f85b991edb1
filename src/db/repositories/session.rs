//! Session repository
//!
//! Bearer-token sessions. The token is the primary key.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::db::{with_pool, DynDatabasePool};
use crate::models::Session;

#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn create(&self, session: &Session) -> Result<Session>;

    /// Get session by token
    async fn get_by_id(&self, id: &str) -> Result<Option<Session>>;

    async fn delete(&self, id: &str) -> Result<()>;

    /// Revoke every session of a user
    async fn delete_by_user(&self, user_id: i64) -> Result<u64>;

    /// Revoke every session of a user except `keep`
    async fn delete_by_user_except(&self, user_id: i64, keep: &str) -> Result<u64>;

    async fn delete_expired(&self) -> Result<u64>;
}

pub struct SqlxSessionRepository {
    pool: DynDatabasePool,
}

impl SqlxSessionRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn SessionRepository> {
        Arc::new(Self::new(pool))
    }
}

#[derive(sqlx::FromRow)]
struct SessionRow {
    id: String,
    user_id: i64,
    expires_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
}

impl From<SessionRow> for Session {
    fn from(row: SessionRow) -> Self {
        Session {
            id: row.id,
            user_id: row.user_id,
            expires_at: row.expires_at,
            created_at: row.created_at,
        }
    }
}

#[async_trait]
impl SessionRepository for SqlxSessionRepository {
    async fn create(&self, session: &Session) -> Result<Session> {
        with_pool!(self.pool, pool => {
            sqlx::query(
                "INSERT INTO sessions (id, user_id, expires_at, created_at) VALUES (?, ?, ?, ?)",
            )
            .bind(&session.id)
            .bind(session.user_id)
            .bind(session.expires_at)
            .bind(session.created_at)
            .execute(pool)
            .await
            .context("Failed to create session")?;
        });
        Ok(session.clone())
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<Session>> {
        let row = with_pool!(self.pool, pool => {
            sqlx::query_as::<_, SessionRow>(
                "SELECT id, user_id, expires_at, created_at FROM sessions WHERE id = ?",
            )
            .bind(id)
            .fetch_optional(pool)
            .await
            .context("Failed to get session by ID")?
        });
        Ok(row.map(Session::from))
    }

    async fn delete(&self, id: &str) -> Result<()> {
        with_pool!(self.pool, pool => {
            sqlx::query("DELETE FROM sessions WHERE id = ?")
                .bind(id)
                .execute(pool)
                .await
                .context("Failed to delete session")?;
        });
        Ok(())
    }

    async fn delete_by_user(&self, user_id: i64) -> Result<u64> {
        let affected = with_pool!(self.pool, pool => {
            sqlx::query("DELETE FROM sessions WHERE user_id = ?")
                .bind(user_id)
                .execute(pool)
                .await
                .context("Failed to delete sessions by user")?
                .rows_affected()
        });
        Ok(affected)
    }

    async fn delete_by_user_except(&self, user_id: i64, keep: &str) -> Result<u64> {
        let affected = with_pool!(self.pool, pool => {
            sqlx::query("DELETE FROM sessions WHERE user_id = ? AND id <> ?")
                .bind(user_id)
                .bind(keep)
                .execute(pool)
                .await
                .context("Failed to revoke other sessions")?
                .rows_affected()
        });
        Ok(affected)
    }

    async fn delete_expired(&self) -> Result<u64> {
        let now = Utc::now();
        let affected = with_pool!(self.pool, pool => {
            sqlx::query("DELETE FROM sessions WHERE expires_at < ?")
                .bind(now)
                .execute(pool)
                .await
                .context("Failed to delete expired sessions")?
                .rows_affected()
        });
        Ok(affected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations};
    use chrono::Duration;

    async fn setup() -> SqlxSessionRepository {
        let pool = create_test_pool().await.unwrap();
        migrations::run_migrations(&pool).await.unwrap();
        sqlx::query("INSERT INTO users (username, email, password_hash) VALUES ('u', 'u@x.io', 'h')")
            .execute(pool.as_sqlite().unwrap())
            .await
            .unwrap();
        SqlxSessionRepository::new(pool)
    }

    #[tokio::test]
    async fn test_create_get_delete() {
        let repo = setup().await;
        let session = repo.create(&Session::new(1, Duration::days(7))).await.unwrap();

        let found = repo.get_by_id(&session.id).await.unwrap().unwrap();
        assert_eq!(found.user_id, 1);
        assert!(!found.is_expired());

        repo.delete(&session.id).await.unwrap();
        assert!(repo.get_by_id(&session.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_expired_only_removes_expired() {
        let repo = setup().await;
        let live = repo.create(&Session::new(1, Duration::days(1))).await.unwrap();
        repo.create(&Session::new(1, Duration::seconds(-60))).await.unwrap();

        assert_eq!(repo.delete_expired().await.unwrap(), 1);
        assert!(repo.get_by_id(&live.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_delete_by_user_except_keeps_current() {
        let repo = setup().await;
        let current = repo.create(&Session::new(1, Duration::days(1))).await.unwrap();
        repo.create(&Session::new(1, Duration::days(1))).await.unwrap();
        repo.create(&Session::new(1, Duration::days(1))).await.unwrap();

        assert_eq!(repo.delete_by_user_except(1, &current.id).await.unwrap(), 2);
        assert!(repo.get_by_id(&current.id).await.unwrap().is_some());

        assert_eq!(repo.delete_by_user(1).await.unwrap(), 1);
    }
}
