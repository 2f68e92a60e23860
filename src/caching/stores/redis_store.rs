//! # Redis Cache Store
//!
//! Redis-backed cache store built on the `redis` crate's
//! [`ConnectionManager`], which multiplexes one connection across tasks and
//! reconnects on its own after failures. Every command runs once with a
//! bounded wait; retries are left to the next request.

use super::CacheStore;
use crate::caching::{CacheError, CacheResult};
use async_trait::async_trait;
use redis::{aio::ConnectionManager, AsyncCommands, Client};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// Redis cache configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisCacheConfig {
    /// Redis connection URL
    pub url: String,

    /// Connection timeout, also used for the startup PING
    #[serde(with = "humantime_serde")]
    pub connection_timeout: Duration,

    /// Upper bound on a single GET/SET round trip
    #[serde(with = "humantime_serde")]
    pub command_timeout: Duration,
}

impl Default for RedisCacheConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379/0".to_string(),
            connection_timeout: Duration::from_secs(5),
            command_timeout: Duration::from_secs(2),
        }
    }
}

/// Redis cache implementation
pub struct RedisCache {
    config: RedisCacheConfig,
    connection_manager: ConnectionManager,
}

impl RedisCache {
    /// Connect to Redis and verify the server answers PING
    pub async fn new(config: RedisCacheConfig) -> CacheResult<Self> {
        let client = Client::open(config.url.as_str())?;

        let connection_manager =
            tokio::time::timeout(config.connection_timeout, ConnectionManager::new(client))
                .await
                .map_err(|_| CacheError::Timeout)??;

        let cache = Self {
            config,
            connection_manager,
        };

        if !cache.ping(cache.config.connection_timeout).await? {
            return Err(CacheError::Unavailable);
        }

        Ok(cache)
    }

    pub fn url(&self) -> &str {
        &self.config.url
    }

    async fn ping(&self, wait: Duration) -> CacheResult<bool> {
        let mut conn = self.connection_manager.clone();
        let response: String = self
            .bounded(wait, async move { redis::cmd("PING").query_async(&mut conn).await })
            .await?;
        Ok(response == "PONG")
    }

    /// Run one Redis command with a deadline
    async fn bounded<T, F>(&self, wait: Duration, command: F) -> CacheResult<T>
    where
        F: Future<Output = redis::RedisResult<T>>,
    {
        match tokio::time::timeout(wait, command).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(CacheError::Timeout),
        }
    }
}

#[async_trait]
impl CacheStore for RedisCache {
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        let mut conn = self.connection_manager.clone();
        let value: Option<Vec<u8>> = self
            .bounded(self.config.command_timeout, async move { conn.get(key).await })
            .await?;

        debug!(key = %key, hit = value.is_some(), "Redis GET");
        Ok(value)
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> CacheResult<()> {
        let ttl_seconds = ttl.as_secs();
        if ttl_seconds == 0 {
            return Err(CacheError::Store {
                message: format!("refusing to store {} without an expiry", key),
            });
        }

        let mut conn = self.connection_manager.clone();
        self.bounded(self.config.command_timeout, async move {
            conn.set_ex::<_, _, ()>(key, value, ttl_seconds).await
        })
        .await?;

        debug!(key = %key, ttl_secs = ttl_seconds, "Redis SETEX");
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<bool> {
        let mut conn = self.connection_manager.clone();
        let deleted: i64 = self
            .bounded(self.config.command_timeout, async move { conn.del(key).await })
            .await?;
        Ok(deleted > 0)
    }

    async fn exists(&self, key: &str) -> CacheResult<bool> {
        let mut conn = self.connection_manager.clone();
        self.bounded(self.config.command_timeout, async move { conn.exists(key).await })
            .await
    }

    async fn health_check(&self) -> CacheResult<bool> {
        match self.ping(self.config.command_timeout).await {
            Ok(healthy) => Ok(healthy),
            Err(_) => Ok(false),
        }
    }

    fn backend_name(&self) -> &'static str {
        "redis"
    }
}
