//! # Request Orchestrator
//!
//! Drives one read operation end to end:
//!
//! ```text
//! derive key -> cache get --hit--> annotate, return
//!                   |
//!                  miss -> connect -> execute -> close -> cache set -> return
//! ```
//!
//! Cache TTL semantics per request:
//! - `Some(0)` disables caching entirely: no read, no write
//! - `None` uses the cache's configured default TTL
//! - any other value is the TTL for the write; values below zero still
//!   allow a read but never write
//!
//! `force_refresh` skips the read but keeps the write.
//!
//! A cache hit never touches the document store. On the miss path the
//! session is closed on every exit, including when the downstream call
//! panics, and every failure comes back as an error envelope.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use serde_json::Value;
use tracing::{debug, error, warn};

use crate::caching::ResponseCache;
use crate::core::error::describe_panic;
use crate::core::types::{ApiResponse, ConnectionTarget};
use crate::docstore::{DocumentSession, DocumentStore, StoreResult};

/// The operation-specific part of a request: what to run on a session
#[async_trait]
pub trait Downstream: Send + Sync {
    async fn execute(&self, session: &dyn DocumentSession) -> StoreResult<ApiResponse>;

    /// Message shown when `cached` is served from the cache
    fn cached_message(&self, cached: &ApiResponse) -> String {
        format!("{} (from cache)", cached.message)
    }
}

/// A request that knows its operation name, key subset and cache policy
pub trait CachedOperation: Downstream {
    /// Operation name, also the second segment of the cache key
    fn name(&self) -> &'static str;

    fn target(&self) -> ConnectionTarget;

    /// Fields that determine the result, and nothing else
    fn cache_params(&self) -> Value;

    fn cache_ttl(&self) -> Option<i64>;

    fn force_refresh(&self) -> bool;
}

/// Cache decision for one request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachePlan {
    /// Whether the cache participates at all
    pub use_cache: bool,
    /// Whether a cached entry may be served
    pub read: bool,
    /// TTL reported to the caller and used for the write
    pub effective_ttl: i64,
}

impl CachePlan {
    pub fn new(cache_ttl: Option<i64>, force_refresh: bool, default_ttl_secs: u64) -> Self {
        let use_cache = cache_ttl != Some(0);
        let default_ttl = i64::try_from(default_ttl_secs).unwrap_or(i64::MAX);

        Self {
            use_cache,
            read: use_cache && !force_refresh,
            effective_ttl: cache_ttl.unwrap_or(default_ttl),
        }
    }

    /// TTL for a cache write, if one is allowed
    pub fn write_ttl(&self) -> Option<u64> {
        if self.use_cache && self.effective_ttl > 0 {
            Some(self.effective_ttl as u64)
        } else {
            None
        }
    }
}

/// Cache-consulting executor shared by all read endpoints
pub struct RequestOrchestrator {
    store: Arc<dyn DocumentStore>,
    cache: Arc<ResponseCache>,
}

impl RequestOrchestrator {
    pub fn new(store: Arc<dyn DocumentStore>, cache: Arc<ResponseCache>) -> Self {
        Self { store, cache }
    }

    pub fn cache(&self) -> &Arc<ResponseCache> {
        &self.cache
    }

    /// Run a cacheable operation
    pub async fn run<O: CachedOperation>(&self, operation: &O) -> ApiResponse {
        self.execute_with_cache(
            operation.name(),
            &operation.cache_params(),
            &operation.target(),
            operation.cache_ttl(),
            operation.force_refresh(),
            operation,
        )
        .await
    }

    /// Run an operation that must never be cached
    pub async fn run_uncached(
        &self,
        operation: &str,
        target: &ConnectionTarget,
        downstream: &dyn Downstream,
    ) -> ApiResponse {
        self.execute_with_cache(operation, &Value::Null, target, Some(0), false, downstream)
            .await
    }

    /// Consult the cache, fall back to the document store, populate the cache
    pub async fn execute_with_cache(
        &self,
        operation: &str,
        params: &Value,
        target: &ConnectionTarget,
        cache_ttl: Option<i64>,
        force_refresh: bool,
        downstream: &dyn Downstream,
    ) -> ApiResponse {
        let plan = CachePlan::new(cache_ttl, force_refresh, self.cache.default_ttl_secs());
        let mut cache_key = None;

        if plan.read {
            let key = self.cache.derive_key(operation, params);
            if let Some(mut cached) = self.cache.get(&key).await {
                cached.message = downstream.cached_message(&cached);
                cached.cache_ttl = Some(plan.effective_ttl);
                debug!(operation = operation, key = %key, "Serving response from cache");
                return cached;
            }
            cache_key = Some(key);
        }

        let mut session = match self.store.connect(target).await {
            Ok(session) => session,
            Err(e) => {
                warn!(
                    operation = operation,
                    namespace = %target.namespace(),
                    error = %e,
                    "Document store connection failed"
                );
                return ApiResponse::error(format!("Connection failed: {}", e));
            }
        };

        let outcome = AssertUnwindSafe(downstream.execute(session.as_ref()))
            .catch_unwind()
            .await;
        session.close().await;

        let mut response = match outcome {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                error!(
                    operation = operation,
                    namespace = %target.namespace(),
                    error = %e,
                    "Operation failed"
                );
                return ApiResponse::error(format!("{} failed: {}", operation, e));
            }
            Err(panic) => {
                let reason = describe_panic(panic.as_ref());
                error!(
                    operation = operation,
                    namespace = %target.namespace(),
                    panic = %reason,
                    "Operation panicked"
                );
                return ApiResponse::error(format!("Unexpected error during {}: {}", operation, reason));
            }
        };

        if plan.use_cache && response.status.is_cacheable() {
            match plan.write_ttl() {
                Some(ttl_secs) => {
                    let key = cache_key.unwrap_or_else(|| self.cache.derive_key(operation, params));
                    self.cache.set(&key, &response, ttl_secs).await;
                }
                None => debug!(
                    operation = operation,
                    ttl_secs = plan.effective_ttl,
                    "Non-positive TTL, skipping cache write"
                ),
            }
            response.cache_ttl = Some(plan.effective_ttl);
        }

        response
    }
}
