//! # Operations
//!
//! Request payloads for each endpoint and what each one runs against a
//! document session.
//!
//! The fields that feed the cache key are fixed per operation:
//!
//! | operation | key fields |
//! |---|---|
//! | query | connection, database, collection, filter, projection, sort, limit, skip |
//! | query_one | connection, database, collection, filter, projection, sort |
//! | aggregate | connection, database, collection, pipeline |
//! | distinct | connection, database, collection, field, filter |
//!
//! `cache_ttl` and `force_refresh` never take part in the key. Filters and
//! projections enter the key in the form that is executed, so an absent
//! filter and `{}` share an entry.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use super::orchestrator::{CachedOperation, Downstream};
use crate::core::config::QueryLimits;
use crate::core::error::{GatewayError, GatewayResult};
use crate::core::types::{ApiResponse, ConnectionTarget};
use crate::docstore::{DocumentSession, FindSpec, SortKey, StoreError, StoreResult};

/// TTL applied when a request omits `cache_ttl`
pub const DEFAULT_REQUEST_CACHE_TTL: i64 = 300;

const CONNECTION_SCHEMES: [&str; 2] = ["mongodb://", "mongodb+srv://"];

fn default_cache_ttl() -> Option<i64> {
    Some(DEFAULT_REQUEST_CACHE_TTL)
}

/// Payload validation against configured limits
pub trait ValidateRequest {
    fn validate(&self, limits: &QueryLimits) -> GatewayResult<()>;
}

fn validate_connection(connection_string: &str, database_name: &str, collection_name: &str) -> GatewayResult<()> {
    if connection_string.trim().is_empty() {
        return Err(GatewayError::validation("connection_string", "must not be empty"));
    }
    if !CONNECTION_SCHEMES
        .iter()
        .any(|scheme| connection_string.starts_with(scheme))
    {
        return Err(GatewayError::validation(
            "connection_string",
            "must start with mongodb:// or mongodb+srv://",
        ));
    }
    if database_name.trim().is_empty() {
        return Err(GatewayError::validation("database_name", "must not be empty"));
    }
    if collection_name.trim().is_empty() {
        return Err(GatewayError::validation("collection_name", "must not be empty"));
    }
    Ok(())
}

fn validate_sort(sort: &Option<Vec<SortKey>>) -> GatewayResult<()> {
    for key in sort.iter().flatten() {
        if key.field().is_empty() {
            return Err(GatewayError::validation("sort", "field name must not be empty"));
        }
        if key.direction() != 1 && key.direction() != -1 {
            return Err(GatewayError::validation(
                "sort",
                format!("direction for '{}' must be 1 or -1", key.field()),
            ));
        }
    }
    Ok(())
}

fn object_or_empty(value: &Option<Map<String, Value>>) -> Value {
    Value::Object(value.clone().unwrap_or_default())
}

/// `{}` and absent both mean "all fields"
fn effective_projection(projection: &Option<Map<String, Value>>) -> Option<Value> {
    projection
        .as_ref()
        .filter(|fields| !fields.is_empty())
        .map(|fields| Value::Object(fields.clone()))
}

/// Payload of `POST /query`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryRequest {
    pub connection_string: String,
    pub database_name: String,
    pub collection_name: String,
    #[serde(default)]
    pub query_filter: Option<Map<String, Value>>,
    #[serde(default)]
    pub projection: Option<Map<String, Value>>,
    #[serde(default)]
    pub sort: Option<Vec<SortKey>>,
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub skip: Option<i64>,
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl: Option<i64>,
    #[serde(default)]
    pub force_refresh: bool,
}

impl QueryRequest {
    pub fn find_spec(&self) -> FindSpec {
        FindSpec {
            filter: object_or_empty(&self.query_filter),
            projection: effective_projection(&self.projection),
            sort: self.sort.clone().unwrap_or_default(),
            limit: self.limit,
            skip: self.skip.and_then(|skip| u64::try_from(skip).ok()),
        }
    }
}

impl ValidateRequest for QueryRequest {
    fn validate(&self, limits: &QueryLimits) -> GatewayResult<()> {
        validate_connection(&self.connection_string, &self.database_name, &self.collection_name)?;
        validate_sort(&self.sort)?;

        if let Some(limit) = self.limit {
            if limit < 1 || limit > limits.max_limit {
                return Err(GatewayError::validation(
                    "limit",
                    format!("must be between 1 and {}", limits.max_limit),
                ));
            }
        }
        if let Some(skip) = self.skip {
            if skip < 0 || skip > limits.max_skip {
                return Err(GatewayError::validation(
                    "skip",
                    format!("must be between 0 and {}", limits.max_skip),
                ));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Downstream for QueryRequest {
    async fn execute(&self, session: &dyn DocumentSession) -> StoreResult<ApiResponse> {
        let documents = session.query(&self.find_spec()).await?;
        let count = documents.len();
        Ok(
            ApiResponse::success(format!("Query succeeded, returned {} documents", count))
                .with_data(Value::Array(documents))
                .with_count(count as u64),
        )
    }

    fn cached_message(&self, cached: &ApiResponse) -> String {
        format!(
            "Query succeeded (from cache), returned {} documents",
            cached.count.unwrap_or(0)
        )
    }
}

impl CachedOperation for QueryRequest {
    fn name(&self) -> &'static str {
        "query"
    }

    fn target(&self) -> ConnectionTarget {
        ConnectionTarget::new(&self.connection_string, &self.database_name, &self.collection_name)
    }

    fn cache_params(&self) -> Value {
        json!({
            "connection_string": self.connection_string,
            "database_name": self.database_name,
            "collection_name": self.collection_name,
            "query_filter": object_or_empty(&self.query_filter),
            "projection": effective_projection(&self.projection),
            "sort": self.sort,
            "limit": self.limit,
            "skip": self.skip,
        })
    }

    fn cache_ttl(&self) -> Option<i64> {
        self.cache_ttl
    }

    fn force_refresh(&self) -> bool {
        self.force_refresh
    }
}

/// Payload of `POST /query_one`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryOneRequest {
    pub connection_string: String,
    pub database_name: String,
    pub collection_name: String,
    #[serde(default)]
    pub query_filter: Option<Map<String, Value>>,
    #[serde(default)]
    pub projection: Option<Map<String, Value>>,
    #[serde(default)]
    pub sort: Option<Vec<SortKey>>,
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl: Option<i64>,
    #[serde(default)]
    pub force_refresh: bool,
}

impl QueryOneRequest {
    pub fn find_spec(&self) -> FindSpec {
        FindSpec {
            filter: object_or_empty(&self.query_filter),
            projection: effective_projection(&self.projection),
            sort: self.sort.clone().unwrap_or_default(),
            limit: None,
            skip: None,
        }
    }
}

impl ValidateRequest for QueryOneRequest {
    fn validate(&self, _limits: &QueryLimits) -> GatewayResult<()> {
        validate_connection(&self.connection_string, &self.database_name, &self.collection_name)?;
        validate_sort(&self.sort)
    }
}

#[async_trait]
impl Downstream for QueryOneRequest {
    async fn execute(&self, session: &dyn DocumentSession) -> StoreResult<ApiResponse> {
        match session.query_one(&self.find_spec()).await? {
            Some(document) => Ok(ApiResponse::success("Query one succeeded").with_data(document)),
            None => Ok(ApiResponse::info("No matching document found")),
        }
    }

    fn cached_message(&self, cached: &ApiResponse) -> String {
        if cached.data.is_some() {
            "Query one succeeded (from cache)".to_string()
        } else {
            "No matching document found (from cache)".to_string()
        }
    }
}

impl CachedOperation for QueryOneRequest {
    fn name(&self) -> &'static str {
        "query_one"
    }

    fn target(&self) -> ConnectionTarget {
        ConnectionTarget::new(&self.connection_string, &self.database_name, &self.collection_name)
    }

    fn cache_params(&self) -> Value {
        json!({
            "connection_string": self.connection_string,
            "database_name": self.database_name,
            "collection_name": self.collection_name,
            "query_filter": object_or_empty(&self.query_filter),
            "projection": effective_projection(&self.projection),
            "sort": self.sort,
        })
    }

    fn cache_ttl(&self) -> Option<i64> {
        self.cache_ttl
    }

    fn force_refresh(&self) -> bool {
        self.force_refresh
    }
}

/// Payload of `POST /aggregate`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateRequest {
    pub connection_string: String,
    pub database_name: String,
    pub collection_name: String,
    pub pipeline: Vec<Map<String, Value>>,
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl: Option<i64>,
    #[serde(default)]
    pub force_refresh: bool,
}

impl ValidateRequest for AggregateRequest {
    fn validate(&self, _limits: &QueryLimits) -> GatewayResult<()> {
        validate_connection(&self.connection_string, &self.database_name, &self.collection_name)?;
        if self.pipeline.is_empty() {
            return Err(GatewayError::validation("pipeline", "must contain at least one stage"));
        }
        if let Some(index) = self.pipeline.iter().position(|stage| stage.is_empty()) {
            return Err(GatewayError::validation(
                "pipeline",
                format!("stage {} is empty", index),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl Downstream for AggregateRequest {
    async fn execute(&self, session: &dyn DocumentSession) -> StoreResult<ApiResponse> {
        let stages: Vec<Value> = self
            .pipeline
            .iter()
            .map(|stage| Value::Object(stage.clone()))
            .collect();
        let documents = session.aggregate(&stages).await?;
        let count = documents.len();
        Ok(
            ApiResponse::success(format!("Aggregation succeeded, returned {} documents", count))
                .with_data(Value::Array(documents))
                .with_count(count as u64),
        )
    }

    fn cached_message(&self, cached: &ApiResponse) -> String {
        format!(
            "Aggregation succeeded (from cache), returned {} documents",
            cached.count.unwrap_or(0)
        )
    }
}

impl CachedOperation for AggregateRequest {
    fn name(&self) -> &'static str {
        "aggregate"
    }

    fn target(&self) -> ConnectionTarget {
        ConnectionTarget::new(&self.connection_string, &self.database_name, &self.collection_name)
    }

    fn cache_params(&self) -> Value {
        json!({
            "connection_string": self.connection_string,
            "database_name": self.database_name,
            "collection_name": self.collection_name,
            "pipeline": self.pipeline,
        })
    }

    fn cache_ttl(&self) -> Option<i64> {
        self.cache_ttl
    }

    fn force_refresh(&self) -> bool {
        self.force_refresh
    }
}

/// Payload of `POST /distinct`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistinctRequest {
    pub connection_string: String,
    pub database_name: String,
    pub collection_name: String,
    pub field: String,
    #[serde(default)]
    pub query_filter: Option<Map<String, Value>>,
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl: Option<i64>,
    #[serde(default)]
    pub force_refresh: bool,
}

impl ValidateRequest for DistinctRequest {
    fn validate(&self, _limits: &QueryLimits) -> GatewayResult<()> {
        validate_connection(&self.connection_string, &self.database_name, &self.collection_name)?;
        if self.field.trim().is_empty() {
            return Err(GatewayError::validation("field", "must not be empty"));
        }
        Ok(())
    }
}

#[async_trait]
impl Downstream for DistinctRequest {
    async fn execute(&self, session: &dyn DocumentSession) -> StoreResult<ApiResponse> {
        let values = session
            .distinct(&self.field, &object_or_empty(&self.query_filter))
            .await?;
        let count = values.len();
        Ok(ApiResponse::success(format!(
            "Distinct succeeded, field '{}' returned {} unique values",
            self.field, count
        ))
        .with_data(json!({
            "field": self.field,
            "values": values,
            "count": count,
        }))
        .with_count(count as u64))
    }

    fn cached_message(&self, cached: &ApiResponse) -> String {
        format!(
            "Distinct succeeded (from cache), field '{}' returned {} unique values",
            self.field,
            cached.count.unwrap_or(0)
        )
    }
}

impl CachedOperation for DistinctRequest {
    fn name(&self) -> &'static str {
        "distinct"
    }

    fn target(&self) -> ConnectionTarget {
        ConnectionTarget::new(&self.connection_string, &self.database_name, &self.collection_name)
    }

    fn cache_params(&self) -> Value {
        json!({
            "connection_string": self.connection_string,
            "database_name": self.database_name,
            "collection_name": self.collection_name,
            "field": self.field,
            "query_filter": object_or_empty(&self.query_filter),
        })
    }

    fn cache_ttl(&self) -> Option<i64> {
        self.cache_ttl
    }

    fn force_refresh(&self) -> bool {
        self.force_refresh
    }
}

/// Payload of `POST /connect` and `POST /stats`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionRequest {
    pub connection_string: String,
    pub database_name: String,
    pub collection_name: String,
}

impl ConnectionRequest {
    pub fn target(&self) -> ConnectionTarget {
        ConnectionTarget::new(&self.connection_string, &self.database_name, &self.collection_name)
    }
}

impl ValidateRequest for ConnectionRequest {
    fn validate(&self, _limits: &QueryLimits) -> GatewayResult<()> {
        validate_connection(&self.connection_string, &self.database_name, &self.collection_name)
    }
}

/// Connectivity probe: succeeds once the session is open
pub struct ConnectProbe<'a> {
    pub target: &'a ConnectionTarget,
}

#[async_trait]
impl Downstream for ConnectProbe<'_> {
    async fn execute(&self, _session: &dyn DocumentSession) -> StoreResult<ApiResponse> {
        Ok(ApiResponse::success("Connection succeeded").with_data(json!({
            "database": self.target.database_name,
            "collection": self.target.collection_name,
        })))
    }
}

/// Collection statistics
pub struct StatsLookup;

#[async_trait]
impl Downstream for StatsLookup {
    async fn execute(&self, session: &dyn DocumentSession) -> StoreResult<ApiResponse> {
        let stats = session.stats().await?;
        let data =
            serde_json::to_value(&stats).map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(ApiResponse::success("Collection stats retrieved").with_data(data))
    }
}
