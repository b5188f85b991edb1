use serde::{de::DeserializeOwned, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use super::{Cache, CacheLayer};
use crate::config::CacheConfig;

/// Read-through cache facade used by the services
///
/// Backend failures are logged at `warn` and treated as a miss (reads) or a
/// no-op (writes and deletes). None of these methods can fail a request.
#[derive(Clone)]
pub struct CacheService {
    cache: Arc<Cache>,
    config: Arc<CacheConfig>,
}

impl CacheService {
    pub fn new(cache: Arc<Cache>, config: CacheConfig) -> Self {
        Self {
            cache,
            config: Arc::new(config),
        }
    }

    /// TTL configured for `key`
    pub fn ttl_for(&self, key: &str) -> Duration {
        self.config.ttl_for(key)
    }

    /// Return the cached value for `key`, or run `loader`, cache its result
    /// under the configured TTL and return it.
    ///
    /// Loader errors are returned as-is and nothing is cached.
    pub async fn remember<T, E, F, Fut>(&self, key: &str, loader: F) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned + Send + Sync,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.remember_for(key, self.ttl_for(key), loader).await
    }

    /// Like [`remember`](Self::remember) with an explicit TTL
    pub async fn remember_for<T, E, F, Fut>(
        &self,
        key: &str,
        ttl: Duration,
        loader: F,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned + Send + Sync,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(hit) = self.get::<T>(key).await {
            return Ok(hit);
        }

        let value = loader().await?;
        self.put_for(key, &value, ttl).await;
        Ok(value)
    }

    pub async fn get<T: DeserializeOwned + Send>(&self, key: &str) -> Option<T> {
        match self.cache.get(key).await {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(key, error = %e, "Cache read failed, treating as miss");
                None
            }
        }
    }

    /// Store `value` under the configured TTL for `key`
    pub async fn put<T: Serialize + Send + Sync>(&self, key: &str, value: &T) {
        self.put_for(key, value, self.ttl_for(key)).await
    }

    pub async fn put_for<T: Serialize + Send + Sync>(&self, key: &str, value: &T, ttl: Duration) {
        if let Err(e) = self.cache.set(key, value, ttl).await {
            tracing::warn!(key, error = %e, "Cache write failed");
        }
    }

    pub async fn forget(&self, key: &str) {
        if let Err(e) = self.cache.delete(key).await {
            tracing::warn!(key, error = %e, "Cache delete failed");
        }
    }

    /// Drop every entry whose key starts with `prefix`
    pub async fn forget_prefix(&self, prefix: &str) {
        let pattern = format!("{}*", prefix);
        if let Err(e) = self.cache.delete_pattern(&pattern).await {
            tracing::warn!(prefix, error = %e, "Cache prefix delete failed");
        }
    }

    /// Read a counter, `0` when absent or unreadable
    pub async fn counter(&self, key: &str) -> i64 {
        match self.cache.counter(key).await {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(key, error = %e, "Cache counter read failed");
                0
            }
        }
    }

    /// Atomically bump a counter; returns `None` when the backend failed
    pub async fn increment(&self, key: &str) -> Option<i64> {
        match self.cache.increment(key).await {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::error!(key, error = %e, "Cache counter increment failed");
                None
            }
        }
    }
}
