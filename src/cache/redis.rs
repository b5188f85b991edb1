//! Redis cache backend
//!
//! Every key is stored under a namespace (`quire:` by default) so that
//! `clear` and pattern deletes never touch keys owned by other applications
//! sharing the database. Pattern deletes use SCAN rather than KEYS.

use super::CacheLayer;
use anyhow::{Context, Result};
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client};
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;

const DEFAULT_NAMESPACE: &str = "quire:";

/// Number of keys requested per SCAN round-trip
const SCAN_COUNT: usize = 100;

pub struct RedisCache {
    connection: MultiplexedConnection,
    namespace: String,
}

impl std::fmt::Debug for RedisCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisCache")
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}

impl RedisCache {
    /// Connect to Redis using the default `quire:` namespace
    pub async fn new(redis_url: &str) -> Result<Self> {
        Self::with_namespace(redis_url, DEFAULT_NAMESPACE).await
    }

    pub async fn with_namespace(redis_url: &str, namespace: &str) -> Result<Self> {
        let client = Client::open(redis_url).context("Failed to create Redis client")?;

        let connection = client
            .get_multiplexed_async_connection()
            .await
            .context("Failed to connect to Redis")?;

        Ok(Self {
            connection,
            namespace: namespace.to_string(),
        })
    }

    fn namespaced(&self, key: &str) -> String {
        format!("{}{}", self.namespace, key)
    }

    async fn scan_delete(&self, pattern: &str) -> Result<u64> {
        let mut conn = self.connection.clone();
        let mut cursor: u64 = 0;
        let mut deleted = 0u64;

        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(SCAN_COUNT)
                .query_async(&mut conn)
                .await
                .context("Failed to scan keys in Redis")?;

            if !keys.is_empty() {
                let removed: u64 = conn
                    .del(&keys)
                    .await
                    .context("Failed to delete keys from Redis")?;
                deleted += removed;
            }

            cursor = next;
            if cursor == 0 {
                break;
            }
        }

        Ok(deleted)
    }
}

#[async_trait]
impl CacheLayer for RedisCache {
    async fn get<T: DeserializeOwned + Send>(&self, key: &str) -> Result<Option<T>> {
        let mut conn = self.connection.clone();

        let raw: Option<String> = conn
            .get(self.namespaced(key))
            .await
            .context("Failed to get value from Redis")?;

        raw.map(|json| serde_json::from_str(&json).context("Failed to deserialize cached value"))
            .transpose()
    }

    async fn set<T: Serialize + Send + Sync>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> Result<()> {
        let mut conn = self.connection.clone();
        let json = serde_json::to_string(value).context("Failed to serialize cache value")?;

        // SETEX has whole-second resolution
        let ttl_secs = ttl.as_secs().max(1);

        let _: () = conn
            .set_ex(self.namespaced(key), json, ttl_secs)
            .await
            .context("Failed to set value in Redis")?;

        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.connection.clone();
        let _: () = conn
            .del(self.namespaced(key))
            .await
            .context("Failed to delete key from Redis")?;
        Ok(())
    }

    async fn delete_pattern(&self, pattern: &str) -> Result<()> {
        let deleted = self.scan_delete(&self.namespaced(pattern)).await?;
        tracing::debug!(pattern, deleted, "Deleted Redis keys by pattern");
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.scan_delete(&self.namespaced("*")).await?;
        Ok(())
    }

    async fn increment(&self, key: &str) -> Result<i64> {
        let mut conn = self.connection.clone();
        let value: i64 = conn
            .incr(self.namespaced(key), 1)
            .await
            .context("Failed to increment Redis counter")?;
        Ok(value)
    }

    async fn counter(&self, key: &str) -> Result<i64> {
        let mut conn = self.connection.clone();
        let value: Option<i64> = conn
            .get(self.namespaced(key))
            .await
            .context("Failed to read Redis counter")?;
        Ok(value.unwrap_or(0))
    }
}
