//! # Response Cache
//!
//! The cache capability the request orchestrator consults. At startup the
//! configured backend is connected once; if that fails the capability is
//! simply absent and every `get` is a miss, every `set` a no-op. Per-call
//! store failures are swallowed the same way, so nothing in this module
//! ever surfaces an error to a request.

use super::key_generator::{CanonicalKeyGenerator, CanonicalValue, KeyGenerator};
use super::stores::{InMemoryCacheConfig, RedisCacheConfig};
use super::{CacheResult, CacheStore, InMemoryCache, RedisCache};
use crate::core::types::ApiResponse;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

/// Which store backs the response cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    Redis,
    Memory,
}

/// Cache configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Master switch; when false no store is connected
    pub enabled: bool,

    /// Backing store
    pub backend: CacheBackend,

    /// TTL applied when a request asks for the store default
    pub default_ttl_secs: u64,

    /// First segment of every cache key
    pub key_namespace: String,

    /// Redis cache configuration
    pub redis: RedisCacheConfig,

    /// In-memory cache configuration
    pub memory: InMemoryCacheConfig,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            backend: CacheBackend::Redis,
            default_ttl_secs: 86400, // 24h
            key_namespace: super::key_generator::DEFAULT_KEY_NAMESPACE.to_string(),
            redis: RedisCacheConfig::default(),
            memory: InMemoryCacheConfig::default(),
        }
    }
}

/// Snapshot of response cache counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseCacheStats {
    pub available: bool,
    pub backend: Option<String>,
    pub default_ttl_secs: u64,
    pub hits: u64,
    pub misses: u64,
    pub writes: u64,
    pub errors: u64,
}

impl ResponseCacheStats {
    /// Hit ratio in the range 0.0..=1.0
    pub fn hit_rate(&self) -> f64 {
        let lookups = self.hits + self.misses;
        if lookups == 0 {
            0.0
        } else {
            self.hits as f64 / lookups as f64
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    writes: AtomicU64,
    errors: AtomicU64,
}

/// Cache capability handle shared by all requests
pub struct ResponseCache {
    store: Option<Arc<dyn CacheStore>>,
    key_generator: Arc<dyn KeyGenerator>,
    default_ttl_secs: u64,
    counters: Counters,
}

impl ResponseCache {
    /// Wrap an already-connected store
    pub fn new(store: Arc<dyn CacheStore>, default_ttl_secs: u64) -> Self {
        Self {
            store: Some(store),
            key_generator: Arc::new(CanonicalKeyGenerator::default()),
            default_ttl_secs,
            counters: Counters::default(),
        }
    }

    /// A cache with no backing store: every lookup misses
    pub fn disabled(default_ttl_secs: u64) -> Self {
        Self {
            store: None,
            key_generator: Arc::new(CanonicalKeyGenerator::default()),
            default_ttl_secs,
            counters: Counters::default(),
        }
    }

    /// Replace the key generator
    pub fn with_key_generator(mut self, key_generator: Arc<dyn KeyGenerator>) -> Self {
        self.key_generator = key_generator;
        self
    }

    /// Build the capability from configuration
    ///
    /// Connectivity is decided here, once. The outcome is logged and a
    /// failed connection yields a disabled cache rather than an error.
    pub async fn connect(config: &CacheConfig) -> Self {
        let key_generator: Arc<dyn KeyGenerator> =
            Arc::new(CanonicalKeyGenerator::new(config.key_namespace.clone()));

        if !config.enabled {
            info!("Response cache disabled by configuration");
            return Self::disabled(config.default_ttl_secs).with_key_generator(key_generator);
        }

        let store: CacheResult<Arc<dyn CacheStore>> = match config.backend {
            CacheBackend::Redis => RedisCache::new(config.redis.clone())
                .await
                .map(|cache| Arc::new(cache) as Arc<dyn CacheStore>),
            CacheBackend::Memory => {
                Ok(Arc::new(InMemoryCache::new(config.memory.clone())) as Arc<dyn CacheStore>)
            }
        };

        match store {
            Ok(store) => {
                info!(
                    backend = store.backend_name(),
                    default_ttl_secs = config.default_ttl_secs,
                    "Response cache connected"
                );
                Self::new(store, config.default_ttl_secs).with_key_generator(key_generator)
            }
            Err(e) => {
                error!(
                    backend = ?config.backend,
                    error = %e,
                    "Response cache unavailable, continuing without caching"
                );
                Self::disabled(config.default_ttl_secs).with_key_generator(key_generator)
            }
        }
    }

    pub fn is_available(&self) -> bool {
        self.store.is_some()
    }

    pub fn default_ttl_secs(&self) -> u64 {
        self.default_ttl_secs
    }

    /// Derive the key for an operation over a JSON parameter subset
    pub fn derive_key(&self, operation: &str, params: &serde_json::Value) -> String {
        self.key_generator
            .derive(operation, &CanonicalValue::from(params))
    }

    /// Look up a cached envelope
    ///
    /// Store failures and undecodable entries both read as a miss; an
    /// undecodable entry is also removed so the next write starts clean.
    pub async fn get(&self, key: &str) -> Option<ApiResponse> {
        let store = self.store.as_ref()?;

        let bytes = match store.get(key).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                debug!(key = %key, "Cache miss");
                return None;
            }
            Err(e) => {
                self.counters.errors.fetch_add(1, Ordering::Relaxed);
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                debug!(key = %key, error = %e, "Cache read failed, treating as miss");
                return None;
            }
        };

        match serde_json::from_slice::<ApiResponse>(&bytes) {
            Ok(response) => {
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                debug!(key = %key, "Cache hit");
                Some(response)
            }
            Err(e) => {
                self.counters.errors.fetch_add(1, Ordering::Relaxed);
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                debug!(key = %key, error = %e, "Discarding undecodable cache entry");
                if let Err(e) = store.delete(key).await {
                    debug!(key = %key, error = %e, "Failed to delete undecodable cache entry");
                }
                None
            }
        }
    }

    /// Store an envelope for `ttl_secs` seconds; best effort
    pub async fn set(&self, key: &str, response: &ApiResponse, ttl_secs: u64) {
        let Some(store) = self.store.as_ref() else {
            return;
        };

        let bytes = match serde_json::to_vec(response) {
            Ok(bytes) => bytes,
            Err(e) => {
                self.counters.errors.fetch_add(1, Ordering::Relaxed);
                debug!(key = %key, error = %e, "Failed to serialize response for caching");
                return;
            }
        };

        match store.set(key, &bytes, Duration::from_secs(ttl_secs)).await {
            Ok(()) => {
                self.counters.writes.fetch_add(1, Ordering::Relaxed);
                debug!(key = %key, ttl_secs = ttl_secs, "Cached response");
            }
            Err(e) => {
                self.counters.errors.fetch_add(1, Ordering::Relaxed);
                debug!(key = %key, error = %e, "Cache write failed");
            }
        }
    }

    /// Whether the backing store currently answers
    pub async fn health_check(&self) -> bool {
        match self.store.as_ref() {
            Some(store) => store.health_check().await.unwrap_or(false),
            None => false,
        }
    }

    pub fn stats(&self) -> ResponseCacheStats {
        ResponseCacheStats {
            available: self.is_available(),
            backend: self
                .store
                .as_ref()
                .map(|store| store.backend_name().to_string()),
            default_ttl_secs: self.default_ttl_secs,
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            writes: self.counters.writes.load(Ordering::Relaxed),
            errors: self.counters.errors.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caching::CacheError;
    use async_trait::async_trait;
    use serde_json::json;

    /// A store whose every call fails
    struct BrokenStore;

    #[async_trait]
    impl CacheStore for BrokenStore {
        async fn get(&self, _key: &str) -> CacheResult<Option<Vec<u8>>> {
            Err(CacheError::Unavailable)
        }

        async fn set(&self, _key: &str, _value: &[u8], _ttl: Duration) -> CacheResult<()> {
            Err(CacheError::Unavailable)
        }

        async fn delete(&self, _key: &str) -> CacheResult<bool> {
            Err(CacheError::Unavailable)
        }

        async fn exists(&self, _key: &str) -> CacheResult<bool> {
            Err(CacheError::Unavailable)
        }

        async fn health_check(&self) -> CacheResult<bool> {
            Err(CacheError::Unavailable)
        }

        fn backend_name(&self) -> &'static str {
            "broken"
        }
    }

    fn memory_cache() -> ResponseCache {
        ResponseCache::new(
            Arc::new(InMemoryCache::new(InMemoryCacheConfig::default())),
            86400,
        )
    }

    #[tokio::test]
    async fn test_round_trip_through_store() {
        let cache = memory_cache();
        let key = cache.derive_key("query", &json!({"limit": 5}));
        let response = ApiResponse::success("Query succeeded, returned 1 documents")
            .with_data(json!([{"name": "Ada"}]))
            .with_count(1);

        assert!(cache.get(&key).await.is_none());
        cache.set(&key, &response, 60).await;
        assert_eq!(cache.get(&key).await, Some(response));

        let stats = cache.stats();
        assert!(stats.available);
        assert_eq!(stats.backend.as_deref(), Some("memory"));
        assert_eq!((stats.hits, stats.misses, stats.writes), (1, 1, 1));
        assert!((stats.hit_rate() - 0.5).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_disabled_cache_is_a_no_op() {
        let cache = ResponseCache::disabled(86400);
        let key = cache.derive_key("query", &json!({}));

        cache.set(&key, &ApiResponse::success("ok"), 60).await;
        assert!(cache.get(&key).await.is_none());
        assert!(!cache.is_available());
        assert!(!cache.health_check().await);
        assert_eq!(cache.stats().writes, 0);
    }

    #[tokio::test]
    async fn test_store_failures_never_escape() {
        let cache = ResponseCache::new(Arc::new(BrokenStore), 86400);

        cache.set("k", &ApiResponse::success("ok"), 60).await;
        assert!(cache.get("k").await.is_none());
        assert!(!cache.health_check().await);

        let stats = cache.stats();
        assert_eq!(stats.errors, 2);
        assert_eq!(stats.writes, 0);
    }

    #[tokio::test]
    async fn test_undecodable_entry_is_dropped() {
        let store = Arc::new(InMemoryCache::new(InMemoryCacheConfig::default()));
        store
            .set("k", b"not json", Duration::from_secs(60))
            .await
            .unwrap();

        let cache = ResponseCache::new(store.clone(), 86400);
        assert!(cache.get("k").await.is_none());
        assert!(!store.exists("k").await.unwrap());
    }

    #[tokio::test]
    async fn test_connect_with_memory_backend() {
        let config = CacheConfig {
            backend: CacheBackend::Memory,
            key_namespace: "tests".to_string(),
            ..Default::default()
        };

        let cache = ResponseCache::connect(&config).await;
        assert!(cache.is_available());
        assert!(cache.derive_key("query", &json!({})).starts_with("tests:query:"));
    }

    #[tokio::test]
    async fn test_connect_degrades_when_redis_is_unreachable() {
        let config = CacheConfig {
            backend: CacheBackend::Redis,
            redis: RedisCacheConfig {
                url: "redis://127.0.0.1:1".to_string(),
                connection_timeout: Duration::from_millis(300),
                ..Default::default()
            },
            ..Default::default()
        };

        let cache = ResponseCache::connect(&config).await;
        assert!(!cache.is_available());
        assert_eq!(cache.default_ttl_secs(), 86400);
    }

    #[tokio::test]
    async fn test_connect_respects_enabled_flag() {
        let config = CacheConfig {
            enabled: false,
            backend: CacheBackend::Memory,
            ..Default::default()
        };

        assert!(!ResponseCache::connect(&config).await.is_available());
    }
}
