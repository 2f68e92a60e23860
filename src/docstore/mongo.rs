//! # MongoDB Document Store
//!
//! [`DocumentStore`] implementation on the official `mongodb` driver.
//!
//! Every `connect` builds a fresh [`Client`] for the request's connection
//! string, pings the deployment, and hands back a [`MongoSession`] that
//! shuts the client down on `close`. Request filters arrive as JSON and
//! are read as MongoDB Extended JSON, so `{"$oid": "..."}` and
//! `{"$date": "..."}` work in filters and pipelines. Results go back out as
//! relaxed Extended JSON with ObjectId `_id` values flattened to hex strings.

use std::time::Duration;

use async_trait::async_trait;
use bson::{doc, Bson, Document};
use futures::TryStreamExt;
use mongodb::options::{ClientOptions, FindOneOptions, FindOptions};
use mongodb::{Client, Collection};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use super::{
    CollectionStats, DocumentSession, DocumentStore, FindSpec, SortKey, StoreError, StoreResult,
};
use crate::core::types::ConnectionTarget;

/// Driver settings applied to every per-request client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MongoConfig {
    /// How long to wait for a usable server before failing the request
    #[serde(with = "humantime_serde")]
    pub server_selection_timeout: Duration,

    /// TCP connect timeout
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,

    pub max_pool_size: u32,

    pub min_pool_size: u32,

    /// Reported to the server in the connection handshake
    pub app_name: Option<String>,
}

impl Default for MongoConfig {
    fn default() -> Self {
        Self {
            server_selection_timeout: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(10),
            max_pool_size: 10,
            min_pool_size: 1,
            app_name: Some("docgate".to_string()),
        }
    }
}

/// Connects per request using the official driver
#[derive(Debug, Clone, Default)]
pub struct MongoStore {
    config: MongoConfig,
}

impl MongoStore {
    pub fn new(config: MongoConfig) -> Self {
        Self { config }
    }

    async fn client_options(&self, connection_string: &str) -> StoreResult<ClientOptions> {
        let mut options = ClientOptions::parse(connection_string)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        options.server_selection_timeout = Some(self.config.server_selection_timeout);
        options.connect_timeout = Some(self.config.connect_timeout);
        options.max_pool_size = Some(self.config.max_pool_size);
        options.min_pool_size = Some(self.config.min_pool_size);
        if options.app_name.is_none() {
            options.app_name = self.config.app_name.clone();
        }

        Ok(options)
    }
}

#[async_trait]
impl DocumentStore for MongoStore {
    async fn connect(&self, target: &ConnectionTarget) -> StoreResult<Box<dyn DocumentSession>> {
        let options = self.client_options(&target.connection_string).await?;
        let client =
            Client::with_options(options).map_err(|e| StoreError::Connection(e.to_string()))?;

        if let Err(e) = client
            .database("admin")
            .run_command(doc! { "ping": 1 }, None)
            .await
        {
            client.shutdown().await;
            return Err(StoreError::Connection(e.to_string()));
        }

        debug!(
            database = %target.database_name,
            collection = %target.collection_name,
            "Connected to MongoDB"
        );

        Ok(Box::new(MongoSession {
            client: Some(client),
            database_name: target.database_name.clone(),
            collection_name: target.collection_name.clone(),
        }))
    }
}

/// One client bound to one collection
pub struct MongoSession {
    client: Option<Client>,
    database_name: String,
    collection_name: String,
}

impl MongoSession {
    fn client(&self) -> StoreResult<&Client> {
        self.client.as_ref().ok_or(StoreError::Closed)
    }

    fn collection(&self) -> StoreResult<Collection<Document>> {
        Ok(self
            .client()?
            .database(&self.database_name)
            .collection(&self.collection_name))
    }
}

fn operation_error(err: mongodb::error::Error) -> StoreError {
    StoreError::Operation(err.to_string())
}

#[async_trait]
impl DocumentSession for MongoSession {
    async fn query(&self, spec: &FindSpec) -> StoreResult<Vec<Value>> {
        let collection = self.collection()?;

        let mut options = FindOptions::default();
        options.projection = spec.projection.as_ref().map(json_to_document).transpose()?;
        options.sort = sort_document(&spec.sort);
        options.limit = spec.limit;
        options.skip = spec.skip;

        let cursor = collection
            .find(json_to_document(&spec.filter)?, options)
            .await
            .map_err(operation_error)?;
        let documents: Vec<Document> = cursor.try_collect().await.map_err(operation_error)?;

        Ok(documents.into_iter().map(document_to_json).collect())
    }

    async fn query_one(&self, spec: &FindSpec) -> StoreResult<Option<Value>> {
        let collection = self.collection()?;

        let mut options = FindOneOptions::default();
        options.projection = spec.projection.as_ref().map(json_to_document).transpose()?;
        options.sort = sort_document(&spec.sort);

        let document = collection
            .find_one(json_to_document(&spec.filter)?, options)
            .await
            .map_err(operation_error)?;

        Ok(document.map(document_to_json))
    }

    async fn aggregate(&self, pipeline: &[Value]) -> StoreResult<Vec<Value>> {
        let collection = self.collection()?;
        let stages = pipeline
            .iter()
            .map(json_to_document)
            .collect::<StoreResult<Vec<Document>>>()?;

        let cursor = collection
            .aggregate(stages, None)
            .await
            .map_err(operation_error)?;
        let documents: Vec<Document> = cursor.try_collect().await.map_err(operation_error)?;

        Ok(documents.into_iter().map(document_to_json).collect())
    }

    async fn distinct(&self, field: &str, filter: &Value) -> StoreResult<Vec<Value>> {
        let collection = self.collection()?;
        let values = collection
            .distinct(field, json_to_document(filter)?, None)
            .await
            .map_err(operation_error)?;

        Ok(values.into_iter().map(bson_to_json).collect())
    }

    async fn stats(&self) -> StoreResult<CollectionStats> {
        let stats = self
            .client()?
            .database(&self.database_name)
            .run_command(doc! { "collStats": self.collection_name.as_str() }, None)
            .await
            .map_err(operation_error)?;

        Ok(CollectionStats {
            collection_name: self.collection_name.clone(),
            count: numeric_field(&stats, "count") as i64,
            size: numeric_field(&stats, "size") as i64,
            avg_obj_size: numeric_field(&stats, "avgObjSize"),
            storage_size: numeric_field(&stats, "storageSize") as i64,
            indexes: numeric_field(&stats, "nindexes") as i64,
        })
    }

    async fn close(&mut self) {
        if let Some(client) = self.client.take() {
            client.shutdown().await;
            debug!(
                database = %self.database_name,
                collection = %self.collection_name,
                "Closed MongoDB session"
            );
        }
    }
}

impl Drop for MongoSession {
    fn drop(&mut self) {
        if self.client.is_some() {
            warn!(
                database = %self.database_name,
                collection = %self.collection_name,
                "MongoDB session dropped without close"
            );
        }
    }
}

/// Read a JSON object as an Extended JSON document
pub fn json_to_document(value: &Value) -> StoreResult<Document> {
    match Bson::try_from(value.clone()) {
        Ok(Bson::Document(document)) => Ok(document),
        Ok(other) => Err(StoreError::Serialization(format!(
            "expected a JSON object, got {:?}",
            other.element_type()
        ))),
        Err(e) => Err(StoreError::Serialization(e.to_string())),
    }
}

fn sort_document(sort: &[SortKey]) -> Option<Document> {
    if sort.is_empty() {
        return None;
    }

    let mut document = Document::new();
    for key in sort {
        document.insert(key.field(), key.direction());
    }
    Some(document)
}

/// Render a result document, flattening an ObjectId `_id` to hex
pub fn document_to_json(mut document: Document) -> Value {
    if let Some(Bson::ObjectId(id)) = document.get("_id") {
        let hex = id.to_hex();
        document.insert("_id", hex);
    }
    Bson::Document(document).into_relaxed_extjson()
}

/// Render a distinct value; ObjectIds become hex strings
pub fn bson_to_json(value: Bson) -> Value {
    match value {
        Bson::ObjectId(id) => Value::String(id.to_hex()),
        other => other.into_relaxed_extjson(),
    }
}

fn numeric_field(document: &Document, key: &str) -> f64 {
    match document.get(key) {
        Some(Bson::Int32(v)) => f64::from(*v),
        Some(Bson::Int64(v)) => *v as f64,
        Some(Bson::Double(v)) => *v,
        _ => 0.0,
    }
}
