//! # docgate - Caching Document Query Gateway
//!
//! An HTTP façade over MongoDB that caches read results in Redis (or an
//! in-process store). Every request names its own deployment, database and
//! collection; the gateway opens a session for that request, runs one read
//! operation, closes the session, and caches the response envelope.
//!
//! ## Request flow
//!
//! ```text
//! HTTP body -> ValidatedJson -> validate -> RequestOrchestrator
//!     -> cache key (namespace:operation:sha256)
//!     -> hit: cached envelope, message suffixed "(from cache)"
//!     -> miss: connect -> execute -> close -> cache set -> envelope
//! ```
//!
//! The cache is optional. When Redis cannot be reached at startup the
//! gateway keeps serving, just without caching.

/// Error types, configuration, and the response envelope
pub mod core;

/// Request payloads, the orchestrator and the HTTP server
pub mod gateway;

/// Timing middleware applied to every route
pub mod middleware;

/// Tracing subscriber setup
pub mod observability;

/// Cache key derivation, the response cache, and its storage backends
pub mod caching;

/// Document store abstraction and the MongoDB implementation
pub mod docstore;

pub use core::config::GatewayConfig;
pub use core::error::{GatewayError, GatewayResult};
pub use core::types::{ApiResponse, ConnectionTarget, ResponseStatus};

pub use caching::{CanonicalKeyGenerator, ResponseCache};
pub use docstore::mongo::MongoStore;
pub use docstore::{DocumentSession, DocumentStore};
pub use gateway::orchestrator::RequestOrchestrator;
pub use gateway::server::{build_router, AppState, GatewayServer};
