//! # Cache Stores Module
//!
//! Key-value backends the response cache can sit on: Redis for shared
//! deployments, and an in-process map for single instances and tests.

pub mod memory;
pub mod redis_store;

pub use memory::{InMemoryCache, InMemoryCacheConfig};
pub use redis_store::{RedisCache, RedisCacheConfig};

use super::CacheResult;
use async_trait::async_trait;
use std::time::{Duration, Instant};

/// Expiry used when `now + ttl` does not fit in an `Instant`
const FAR_FUTURE: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// Cache entry with expiry metadata, as held by in-process stores
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// The serialized envelope
    pub value: Vec<u8>,

    /// When the entry expires
    pub expires_at: Instant,

    /// Last read or write, used for eviction
    pub last_accessed: Instant,
}

impl CacheEntry {
    /// Create a new cache entry
    ///
    /// TTLs too large for the platform clock are capped at a hundred years.
    pub fn new(value: Vec<u8>, ttl: Duration) -> Self {
        let now = Instant::now();
        let expires_at = now
            .checked_add(ttl)
            .or_else(|| now.checked_add(FAR_FUTURE))
            .unwrap_or(now);
        Self {
            value,
            expires_at,
            last_accessed: now,
        }
    }

    /// Check if the entry is expired
    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }

    /// Mark the entry as accessed
    pub fn mark_accessed(&mut self) {
        self.last_accessed = Instant::now();
    }

    /// Time until expiration
    pub fn ttl(&self) -> Duration {
        self.expires_at.saturating_duration_since(Instant::now())
    }
}

/// Trait for cache store implementations
///
/// Stores deal in opaque bytes; serialization of envelopes happens in
/// [`crate::caching::ResponseCache`].
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Get a value from the cache
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>>;

    /// Set a value in the cache with TTL
    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> CacheResult<()>;

    /// Delete a value from the cache
    async fn delete(&self, key: &str) -> CacheResult<bool>;

    /// Check if a key exists in the cache
    async fn exists(&self, key: &str) -> CacheResult<bool>;

    /// Perform health check
    async fn health_check(&self) -> CacheResult<bool>;

    /// Short backend name for logs and stats
    fn backend_name(&self) -> &'static str;
}
