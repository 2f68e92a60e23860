//! # Core Types
//!
//! Data shapes shared by every layer of the gateway: the response envelope
//! returned to callers (and stored in the cache), and the connection target
//! naming which database and collection a request works against.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Outcome category carried by every envelope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    Success,
    Error,
    /// A valid but empty outcome, e.g. no document matched a `query_one`
    Info,
    Healthy,
}

impl ResponseStatus {
    /// Whether a response with this status may be written to the cache
    ///
    /// `Info` is cacheable: "no matching document" is a reproducible result.
    pub fn is_cacheable(self) -> bool {
        matches!(self, Self::Success | Self::Info)
    }
}

/// The JSON envelope every endpoint returns
///
/// Cached entries are stored in exactly this shape, so a cache hit can be
/// returned to the caller after only annotating `message` and `cache_ttl`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse {
    pub status: ResponseStatus,
    pub message: String,
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u64>,
    /// Effective TTL, present only when caching was considered
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_ttl: Option<i64>,
    pub timestamp: String,
}

impl ApiResponse {
    pub fn new<S: Into<String>>(status: ResponseStatus, message: S) -> Self {
        Self {
            status,
            message: message.into(),
            data: None,
            count: None,
            cache_ttl: None,
            timestamp: now_timestamp(),
        }
    }

    pub fn success<S: Into<String>>(message: S) -> Self {
        Self::new(ResponseStatus::Success, message)
    }

    pub fn error<S: Into<String>>(message: S) -> Self {
        Self::new(ResponseStatus::Error, message)
    }

    pub fn info<S: Into<String>>(message: S) -> Self {
        Self::new(ResponseStatus::Info, message)
    }

    pub fn healthy<S: Into<String>>(message: S) -> Self {
        Self::new(ResponseStatus::Healthy, message)
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_count(mut self, count: u64) -> Self {
        self.count = Some(count);
        self
    }

    pub fn is_error(&self) -> bool {
        self.status == ResponseStatus::Error
    }
}

/// ISO-8601 timestamp used in envelopes
pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Which deployment, database and collection a request targets
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionTarget {
    pub connection_string: String,
    pub database_name: String,
    pub collection_name: String,
}

impl ConnectionTarget {
    pub fn new<C, D, N>(connection_string: C, database_name: D, collection_name: N) -> Self
    where
        C: Into<String>,
        D: Into<String>,
        N: Into<String>,
    {
        Self {
            connection_string: connection_string.into(),
            database_name: database_name.into(),
            collection_name: collection_name.into(),
        }
    }

    /// `database.collection`, as used in log lines
    pub fn namespace(&self) -> String {
        format!("{}.{}", self.database_name, self.collection_name)
    }
}
