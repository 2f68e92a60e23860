//! # In-Memory Cache Store
//!
//! A process-local cache with TTL support, a bounded entry count with
//! least-recently-used eviction, and a background task that sweeps
//! expired entries.

use super::{CacheEntry, CacheStore};
use crate::caching::CacheResult;
use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::debug;

/// In-memory cache configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InMemoryCacheConfig {
    /// Maximum number of entries
    pub max_entries: usize,

    /// Cleanup interval for expired entries
    #[serde(with = "humantime_serde")]
    pub cleanup_interval: Duration,
}

impl Default for InMemoryCacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 10000,
            cleanup_interval: Duration::from_secs(60),
        }
    }
}

/// In-memory cache implementation
pub struct InMemoryCache {
    config: InMemoryCacheConfig,
    entries: Arc<DashMap<String, CacheEntry>>,
    evictions: AtomicU64,
    expired_cleanups: Arc<AtomicU64>,
    cleanup_task: JoinHandle<()>,
}

impl InMemoryCache {
    /// Create a new in-memory cache
    ///
    /// Must be called from within a Tokio runtime; the cleanup task is
    /// spawned immediately and aborted when the cache is dropped.
    pub fn new(config: InMemoryCacheConfig) -> Self {
        let entries: Arc<DashMap<String, CacheEntry>> = Arc::new(DashMap::new());
        let expired_cleanups = Arc::new(AtomicU64::new(0));

        let cleanup_task = {
            let entries = entries.clone();
            let expired_cleanups = expired_cleanups.clone();
            let cleanup_interval = config.cleanup_interval;

            tokio::spawn(async move {
                let mut interval = interval(cleanup_interval);
                loop {
                    interval.tick().await;
                    Self::cleanup_expired_entries(&entries, &expired_cleanups);
                }
            })
        };

        Self {
            config,
            entries,
            evictions: AtomicU64::new(0),
            expired_cleanups,
            cleanup_task,
        }
    }

    /// Remove every expired entry
    fn cleanup_expired_entries(entries: &DashMap<String, CacheEntry>, expired_cleanups: &AtomicU64) {
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired());
        let cleaned = before.saturating_sub(entries.len()) as u64;

        if cleaned > 0 {
            expired_cleanups.fetch_add(cleaned, Ordering::Relaxed);
            debug!("Cleaned up {} expired cache entries", cleaned);
        }
    }

    /// Make room for one more entry
    fn evict_if_needed(&self) {
        if self.entries.len() < self.config.max_entries {
            return;
        }

        Self::cleanup_expired_entries(&self.entries, &self.expired_cleanups);

        while self.entries.len() >= self.config.max_entries {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|entry| entry.value().last_accessed)
                .map(|entry| entry.key().clone());

            match oldest {
                Some(key) => {
                    self.entries.remove(&key);
                    self.evictions.fetch_add(1, Ordering::Relaxed);
                    debug!(key = %key, "Evicted least recently used cache entry");
                }
                None => break,
            }
        }
    }

    /// Number of live and not-yet-swept entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }
}

impl Drop for InMemoryCache {
    fn drop(&mut self) {
        self.cleanup_task.abort();
    }
}

#[async_trait]
impl CacheStore for InMemoryCache {
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        let mut expired = false;

        if let Some(mut entry) = self.entries.get_mut(key) {
            if entry.is_expired() {
                expired = true;
            } else {
                entry.mark_accessed();
                return Ok(Some(entry.value.clone()));
            }
        }

        if expired && self.entries.remove_if(key, |_, entry| entry.is_expired()).is_some() {
            self.expired_cleanups.fetch_add(1, Ordering::Relaxed);
        }

        Ok(None)
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> CacheResult<()> {
        if !self.entries.contains_key(key) {
            self.evict_if_needed();
        }

        self.entries
            .insert(key.to_string(), CacheEntry::new(value.to_vec(), ttl));
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<bool> {
        Ok(self.entries.remove(key).is_some())
    }

    async fn exists(&self, key: &str) -> CacheResult<bool> {
        Ok(self
            .entries
            .get(key)
            .map(|entry| !entry.is_expired())
            .unwrap_or(false))
    }

    async fn health_check(&self) -> CacheResult<bool> {
        Ok(true)
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_cache(max_entries: usize) -> InMemoryCache {
        InMemoryCache::new(InMemoryCacheConfig {
            max_entries,
            cleanup_interval: Duration::from_secs(60),
        })
    }

    #[tokio::test]
    async fn test_basic_operations() {
        let cache = small_cache(10);
        let ttl = Duration::from_secs(60);

        cache.set("k", b"value", ttl).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), Some(b"value".to_vec()));
        assert!(cache.exists("k").await.unwrap());

        assert!(cache.delete("k").await.unwrap());
        assert!(!cache.exists("k").await.unwrap());
        assert_eq!(cache.get("k").await.unwrap(), None);
        assert!(!cache.delete("k").await.unwrap());
    }

    #[tokio::test]
    async fn test_overwrite_replaces_value() {
        let cache = small_cache(10);
        let ttl = Duration::from_secs(60);

        cache.set("k", b"first", ttl).await.unwrap();
        cache.set("k", b"second", ttl).await.unwrap();

        assert_eq!(cache.get("k").await.unwrap(), Some(b"second".to_vec()));
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_ttl_expiration() {
        let cache = small_cache(10);

        cache
            .set("short", b"value", Duration::from_millis(50))
            .await
            .unwrap();
        assert!(cache.exists("short").await.unwrap());

        tokio::time::sleep(Duration::from_millis(120)).await;

        assert!(!cache.exists("short").await.unwrap());
        assert_eq!(cache.get("short").await.unwrap(), None);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_lru_eviction() {
        let cache = small_cache(2);
        let ttl = Duration::from_secs(60);

        cache.set("a", b"1", ttl).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        cache.set("b", b"2", ttl).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;

        // touch "a" so "b" becomes the eviction candidate
        cache.get("a").await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        cache.set("c", b"3", ttl).await.unwrap();

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.evictions(), 1);
        assert!(cache.exists("a").await.unwrap());
        assert!(!cache.exists("b").await.unwrap());
        assert!(cache.exists("c").await.unwrap());
    }

    #[tokio::test]
    async fn test_health_check() {
        let cache = small_cache(1);
        assert!(cache.health_check().await.unwrap());
        assert_eq!(cache.backend_name(), "memory");
    }
}
