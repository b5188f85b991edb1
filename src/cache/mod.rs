//! Cache layer
//!
//! Two backends sit behind the [`CacheLayer`] trait:
//! - in-memory (moka), the default for single-instance deployments
//! - Redis, behind the `redis-cache` feature, for several instances sharing state
//!
//! Application code talks to [`CacheService`], which adds read-through
//! `remember`, per-key TTLs from configuration, and swallows backend errors
//! so that a flaky cache degrades to a slower request rather than a failed one.

pub mod memory;
#[cfg(feature = "redis-cache")]
pub mod redis;
mod service;

use anyhow::Result;
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::config::{CacheConfig, CacheDriver};

pub use memory::MemoryCache;
#[cfg(feature = "redis-cache")]
pub use redis::RedisCache;
pub use service::CacheService;

/// Cache backend interface
///
/// Generic methods make this trait unusable as `dyn CacheLayer`; use the
/// [`Cache`] enum for runtime selection.
#[async_trait]
pub trait CacheLayer: Send + Sync {
    /// Get a value from cache
    async fn get<T: DeserializeOwned + Send>(&self, key: &str) -> Result<Option<T>>;

    /// Set a value in cache with TTL
    async fn set<T: Serialize + Send + Sync>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> Result<()>;

    /// Delete a value from cache
    async fn delete(&self, key: &str) -> Result<()>;

    /// Delete all values whose key matches a glob pattern (`*`, `?`)
    async fn delete_pattern(&self, pattern: &str) -> Result<()>;

    /// Clear all cache entries
    async fn clear(&self) -> Result<()>;

    /// Atomically increment an integer counter, creating it at 1.
    /// Counters have no expiry.
    async fn increment(&self, key: &str) -> Result<i64>;

    /// Current value of a counter, `0` when it was never incremented
    async fn counter(&self, key: &str) -> Result<i64>;
}

#[derive(Debug)]
pub enum Cache {
    Memory(MemoryCache),
    #[cfg(feature = "redis-cache")]
    Redis(RedisCache),
}

#[async_trait]
impl CacheLayer for Cache {
    async fn get<T: DeserializeOwned + Send>(&self, key: &str) -> Result<Option<T>> {
        match self {
            Cache::Memory(cache) => cache.get(key).await,
            #[cfg(feature = "redis-cache")]
            Cache::Redis(cache) => cache.get(key).await,
        }
    }

    async fn set<T: Serialize + Send + Sync>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> Result<()> {
        match self {
            Cache::Memory(cache) => cache.set(key, value, ttl).await,
            #[cfg(feature = "redis-cache")]
            Cache::Redis(cache) => cache.set(key, value, ttl).await,
        }
    }

    async fn delete(&self, key: &str) -> Result<()> {
        match self {
            Cache::Memory(cache) => cache.delete(key).await,
            #[cfg(feature = "redis-cache")]
            Cache::Redis(cache) => cache.delete(key).await,
        }
    }

    async fn delete_pattern(&self, pattern: &str) -> Result<()> {
        match self {
            Cache::Memory(cache) => cache.delete_pattern(pattern).await,
            #[cfg(feature = "redis-cache")]
            Cache::Redis(cache) => cache.delete_pattern(pattern).await,
        }
    }

    async fn clear(&self) -> Result<()> {
        match self {
            Cache::Memory(cache) => cache.clear().await,
            #[cfg(feature = "redis-cache")]
            Cache::Redis(cache) => cache.clear().await,
        }
    }

    async fn increment(&self, key: &str) -> Result<i64> {
        match self {
            Cache::Memory(cache) => cache.increment(key).await,
            #[cfg(feature = "redis-cache")]
            Cache::Redis(cache) => cache.increment(key).await,
        }
    }

    async fn counter(&self, key: &str) -> Result<i64> {
        match self {
            Cache::Memory(cache) => cache.counter(key).await,
            #[cfg(feature = "redis-cache")]
            Cache::Redis(cache) => cache.counter(key).await,
        }
    }
}

/// Create the cache backend selected by configuration
///
/// Fails when Redis is selected without a URL, when the `redis-cache`
/// feature is not compiled in, or when the Redis connection fails.
pub async fn create_cache(config: &CacheConfig) -> Result<Arc<Cache>> {
    match config.driver {
        CacheDriver::Memory => {
            let cache = MemoryCache::with_capacity(config.max_entries);
            Ok(Arc::new(Cache::Memory(cache)))
        }
        CacheDriver::Redis => {
            #[cfg(feature = "redis-cache")]
            {
                let redis_url = config.redis_url.as_ref().ok_or_else(|| {
                    anyhow::anyhow!(
                        "Redis URL is required when using the Redis cache driver. \
                         Set 'cache.redis_url' or QUIRE_CACHE_REDIS_URL."
                    )
                })?;

                let cache = RedisCache::new(redis_url).await?;
                Ok(Arc::new(Cache::Redis(cache)))
            }

            #[cfg(not(feature = "redis-cache"))]
            {
                anyhow::bail!(
                    "Redis cache driver is configured but the 'redis-cache' feature is not enabled. \
                     Rebuild with `--features redis-cache` or use the 'memory' driver."
                )
            }
        }
    }
}
