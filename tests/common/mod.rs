//! Shared fakes for the integration tests: an in-process document store
//! with call counters and failure switches, and a cache store that
//! records every call it receives.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use docgate::caching::stores::memory::InMemoryCacheConfig;
use docgate::caching::{CacheError, CacheResult, CacheStore, InMemoryCache, ResponseCache};
use docgate::core::types::ConnectionTarget;
use docgate::docstore::{
    CollectionStats, DocumentSession, DocumentStore, FindSpec, StoreError, StoreResult,
};

pub const CONNECTION_STRING: &str = "mongodb://localhost:27017";

/// How the fake store behaves on the next calls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FakeMode {
    Healthy,
    FailConnect,
    FailOperation,
    Panic,
}

#[derive(Debug, Default)]
pub struct StoreCounters {
    pub connects: AtomicUsize,
    pub closes: AtomicUsize,
    pub executions: AtomicUsize,
}

impl StoreCounters {
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn executions(&self) -> usize {
        self.executions.load(Ordering::SeqCst)
    }
}

/// Document store backed by a fixed list of documents
pub struct FakeStore {
    documents: Arc<Mutex<Vec<Value>>>,
    mode: Arc<Mutex<FakeMode>>,
    pub counters: Arc<StoreCounters>,
}

impl FakeStore {
    pub fn new(documents: Vec<Value>) -> Self {
        Self {
            documents: Arc::new(Mutex::new(documents)),
            mode: Arc::new(Mutex::new(FakeMode::Healthy)),
            counters: Arc::new(StoreCounters::default()),
        }
    }

    pub fn set_mode(&self, mode: FakeMode) {
        *self.mode.lock().unwrap() = mode;
    }

    pub fn replace_documents(&self, documents: Vec<Value>) {
        *self.documents.lock().unwrap() = documents;
    }
}

#[async_trait]
impl DocumentStore for FakeStore {
    async fn connect(&self, target: &ConnectionTarget) -> StoreResult<Box<dyn DocumentSession>> {
        self.counters.connects.fetch_add(1, Ordering::SeqCst);
        let mode = *self.mode.lock().unwrap();
        if mode == FakeMode::FailConnect {
            return Err(StoreError::Connection(format!(
                "server selection timed out for {}",
                target.connection_string
            )));
        }

        Ok(Box::new(FakeSession {
            documents: self.documents.lock().unwrap().clone(),
            mode,
            collection_name: target.collection_name.clone(),
            counters: self.counters.clone(),
            closed: false,
        }))
    }
}

pub struct FakeSession {
    documents: Vec<Value>,
    mode: FakeMode,
    collection_name: String,
    counters: Arc<StoreCounters>,
    closed: bool,
}

impl FakeSession {
    fn begin(&self) -> StoreResult<()> {
        self.counters.executions.fetch_add(1, Ordering::SeqCst);
        match self.mode {
            FakeMode::FailOperation => Err(StoreError::Operation("unknown operator: $bogus".to_string())),
            FakeMode::Panic => panic!("driver exploded"),
            _ => Ok(()),
        }
    }

    fn matching(&self, filter: &Value) -> Vec<Value> {
        self.documents
            .iter()
            .filter(|document| matches_filter(document, filter))
            .cloned()
            .collect()
    }
}

/// Top-level equality plus `$gte`, enough for the scenarios under test
fn matches_filter(document: &Value, filter: &Value) -> bool {
    let Some(filter) = filter.as_object() else {
        return true;
    };

    filter.iter().all(|(field, condition)| {
        let actual = &document[field];
        match condition.get("$gte").and_then(Value::as_f64) {
            Some(bound) => actual.as_f64().map_or(false, |value| value >= bound),
            None => actual == condition,
        }
    })
}

#[async_trait]
impl DocumentSession for FakeSession {
    async fn query(&self, spec: &FindSpec) -> StoreResult<Vec<Value>> {
        self.begin()?;
        let skip = spec.skip.unwrap_or(0) as usize;
        let limit = spec.limit.map(|limit| limit as usize).unwrap_or(usize::MAX);
        Ok(self
            .matching(&spec.filter)
            .into_iter()
            .skip(skip)
            .take(limit)
            .collect())
    }

    async fn query_one(&self, spec: &FindSpec) -> StoreResult<Option<Value>> {
        self.begin()?;
        Ok(self.matching(&spec.filter).into_iter().next())
    }

    async fn aggregate(&self, _pipeline: &[Value]) -> StoreResult<Vec<Value>> {
        self.begin()?;
        Ok(self.documents.clone())
    }

    async fn distinct(&self, field: &str, filter: &Value) -> StoreResult<Vec<Value>> {
        self.begin()?;
        let mut values: Vec<Value> = Vec::new();
        for document in self.matching(filter) {
            let value = document[field].clone();
            if !value.is_null() && !values.contains(&value) {
                values.push(value);
            }
        }
        Ok(values)
    }

    async fn stats(&self) -> StoreResult<CollectionStats> {
        self.begin()?;
        Ok(CollectionStats {
            collection_name: self.collection_name.clone(),
            count: self.documents.len() as i64,
            size: 1024,
            avg_obj_size: 128.0,
            storage_size: 4096,
            indexes: 1,
        })
    }

    async fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.counters.closes.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// Cache store that records calls and delegates to an in-memory cache
pub struct RecordingCacheStore {
    inner: InMemoryCache,
    gets: AtomicUsize,
    sets: Mutex<Vec<(String, Duration)>>,
    failing: Mutex<bool>,
}

impl RecordingCacheStore {
    pub fn new() -> Self {
        Self {
            inner: InMemoryCache::new(InMemoryCacheConfig::default()),
            gets: AtomicUsize::new(0),
            sets: Mutex::new(Vec::new()),
            failing: Mutex::new(false),
        }
    }

    pub fn gets(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    pub fn sets(&self) -> Vec<(String, Duration)> {
        self.sets.lock().unwrap().clone()
    }

    /// Make every call fail as if the backend went away
    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock().unwrap() = failing;
    }

    fn check(&self) -> CacheResult<()> {
        if *self.failing.lock().unwrap() {
            Err(CacheError::Unavailable)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl CacheStore for RecordingCacheStore {
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> CacheResult<()> {
        self.sets.lock().unwrap().push((key.to_string(), ttl));
        self.check()?;
        self.inner.set(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> CacheResult<bool> {
        self.check()?;
        self.inner.delete(key).await
    }

    async fn exists(&self, key: &str) -> CacheResult<bool> {
        self.check()?;
        self.inner.exists(key).await
    }

    async fn health_check(&self) -> CacheResult<bool> {
        Ok(!*self.failing.lock().unwrap())
    }

    fn backend_name(&self) -> &'static str {
        "recording"
    }
}

pub const DEFAULT_TTL_SECS: u64 = 86400;

/// A response cache over a fresh recording store
pub fn recording_cache() -> (Arc<RecordingCacheStore>, Arc<ResponseCache>) {
    let store = Arc::new(RecordingCacheStore::new());
    let cache = Arc::new(ResponseCache::new(store.clone(), DEFAULT_TTL_SECS));
    (store, cache)
}

pub fn people() -> Vec<Value> {
    vec![
        json!({"_id": "65a1f0c2e4b0a1b2c3d4e501", "name": "Ada", "age": 36, "city": "London"}),
        json!({"_id": "65a1f0c2e4b0a1b2c3d4e502", "name": "Grace", "age": 45, "city": "New York"}),
        json!({"_id": "65a1f0c2e4b0a1b2c3d4e503", "name": "Linus", "age": 21, "city": "Helsinki"}),
        json!({"_id": "65a1f0c2e4b0a1b2c3d4e504", "name": "Barbara", "age": 29, "city": "New York"}),
        json!({"_id": "65a1f0c2e4b0a1b2c3d4e505", "name": "Ken", "age": 52, "city": "Berkeley"}),
        json!({"_id": "65a1f0c2e4b0a1b2c3d4e506", "name": "Margaret", "age": 33, "city": "Boston"}),
        json!({"_id": "65a1f0c2e4b0a1b2c3d4e507", "name": "Dennis", "age": 24, "city": "Berkeley"}),
    ]
}

pub fn target() -> ConnectionTarget {
    ConnectionTarget::new(CONNECTION_STRING, "company", "people")
}
