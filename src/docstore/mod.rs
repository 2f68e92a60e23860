//! # Document Store Module
//!
//! The seam between the orchestrator and the database driver.
//!
//! A [`DocumentStore`] hands out one [`DocumentSession`] per request. The
//! session is owned by whoever called `connect` and must be closed by them;
//! `close` is idempotent. Documents cross this boundary as JSON values so
//! that nothing above this module depends on driver types.

pub mod mongo;

pub use mongo::{MongoConfig, MongoStore};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::types::ConnectionTarget;

/// Document store result
pub type StoreResult<T> = Result<T, StoreError>;

/// Failures reported by a document store
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StoreError {
    /// The store could not be reached or refused the connection
    #[error("{0}")]
    Connection(String),

    /// The operation itself was rejected or failed
    #[error("{0}")]
    Operation(String),

    /// A value could not be converted between JSON and the store's format
    #[error("{0}")]
    Serialization(String),

    /// The session was used after `close`
    #[error("session is closed")]
    Closed,
}

/// One sort key: field name and direction (1 ascending, -1 descending)
///
/// Serialized as a two-element array, e.g. `["age", -1]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortKey(pub String, pub i32);

impl SortKey {
    pub fn field(&self) -> &str {
        &self.0
    }

    pub fn direction(&self) -> i32 {
        self.1
    }
}

/// Arguments of a find-style read
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FindSpec {
    pub filter: Value,
    pub projection: Option<Value>,
    pub sort: Vec<SortKey>,
    pub limit: Option<i64>,
    pub skip: Option<u64>,
}

/// Collection statistics as reported by the store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionStats {
    pub collection_name: String,
    pub count: i64,
    pub size: i64,
    #[serde(rename = "avgObjSize")]
    pub avg_obj_size: f64,
    #[serde(rename = "storageSize")]
    pub storage_size: i64,
    pub indexes: i64,
}

/// Factory for per-request sessions
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Open a session against one database and collection
    ///
    /// Implementations must verify the server is reachable before
    /// returning `Ok`.
    async fn connect(&self, target: &ConnectionTarget) -> StoreResult<Box<dyn DocumentSession>>;
}

/// A live connection to one collection
#[async_trait]
pub trait DocumentSession: Send + Sync {
    async fn query(&self, spec: &FindSpec) -> StoreResult<Vec<Value>>;

    /// First document matching the filter; `limit` and `skip` are ignored
    async fn query_one(&self, spec: &FindSpec) -> StoreResult<Option<Value>>;

    async fn aggregate(&self, pipeline: &[Value]) -> StoreResult<Vec<Value>>;

    async fn distinct(&self, field: &str, filter: &Value) -> StoreResult<Vec<Value>>;

    async fn stats(&self) -> StoreResult<CollectionStats>;

    /// Release the connection; safe to call more than once
    async fn close(&mut self);
}
