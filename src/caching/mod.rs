//! # Caching System Module
//!
//! Response caching for the gateway's read operations.
//!
//! ## Architecture
//! The caching system follows a layered approach:
//! 1. **Key Generator**: derives a deterministic key from an operation name
//!    and a canonical, type-tagged view of the request parameters
//! 2. **Cache Stores**: Redis and in-memory implementations of [`CacheStore`]
//! 3. **Response Cache**: the capability handle the orchestrator talks to.
//!    It is either backed by a reachable store or absent, and its `get`/`set`
//!    never fail from the caller's point of view
//!
//! ## Usage Example
//! ```rust,ignore
//! use docgate::caching::{CacheConfig, ResponseCache};
//! use serde_json::json;
//!
//! let cache = ResponseCache::connect(&CacheConfig::default()).await;
//! let key = cache.derive_key("query", &json!({"database_name": "shop"}));
//!
//! if let Some(cached) = cache.get(&key).await {
//!     // serve the cached envelope
//! }
//! ```

pub mod cache_manager;
pub mod key_generator;
pub mod stores;

pub use cache_manager::{CacheBackend, CacheConfig, ResponseCache, ResponseCacheStats};
pub use key_generator::{CanonicalKeyGenerator, CanonicalValue, KeyGenerator};
pub use stores::{CacheStore, InMemoryCache, RedisCache};

use crate::core::error::GatewayError;

/// Cache operation result
pub type CacheResult<T> = Result<T, CacheError>;

/// Cache-specific error types
///
/// These stay inside the caching layer: [`ResponseCache`] logs them and
/// degrades to a miss or a no-op.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Cache store error: {message}")]
    Store { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Cache configuration error: {message}")]
    Configuration { message: String },

    #[error("Cache operation timeout")]
    Timeout,

    #[error("Cache not available")]
    Unavailable,
}

impl From<CacheError> for GatewayError {
    fn from(err: CacheError) -> Self {
        GatewayError::internal(format!("Cache error: {}", err))
    }
}
