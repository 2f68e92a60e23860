//! # Configuration Module
//!
//! Loads the gateway configuration from YAML, layers environment overrides
//! on top, and validates the result.
//!
//! ## Key Features
//! - YAML configuration parsing with serde
//! - Environment variable override support (`DOCGATE_<SECTION>_<FIELD>`)
//! - Validation that reports every problem at once
//!
//! Every section has a `Default` impl, so a missing file or a partial file
//! still yields a complete configuration.

use std::env;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::caching::cache_manager::{CacheBackend, CacheConfig};
use crate::core::error::{GatewayError, GatewayResult};
use crate::docstore::mongo::MongoConfig;

/// Main gateway configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// HTTP listener settings
    pub server: ServerConfig,

    /// Document store driver settings
    pub mongodb: MongoConfig,

    /// Response cache settings
    pub cache: CacheConfig,

    /// Upper bounds on pagination parameters
    pub query: QueryLimits,

    /// Log level and output format
    pub logging: LoggingConfig,
}

impl GatewayConfig {
    /// Load configuration from a YAML file
    pub async fn load_from_file<P: AsRef<Path>>(path: P) -> GatewayResult<Self> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            GatewayError::config(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;

        let config: GatewayConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Load the file if it exists, otherwise start from defaults
    ///
    /// Environment overrides and validation are applied in both cases.
    pub async fn load<P: AsRef<Path>>(path: P) -> GatewayResult<Self> {
        let path = path.as_ref();
        let mut config = if tokio::fs::try_exists(path).await.unwrap_or(false) {
            Self::load_from_file(path).await?
        } else {
            tracing::info!(path = %path.display(), "Config file not found, using defaults");
            Self::default()
        };

        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from the process environment
    ///
    /// Environment variables follow the pattern: DOCGATE_<SECTION>_<FIELD>
    /// For example: DOCGATE_SERVER_PORT=8080
    pub fn apply_env_overrides(&mut self) -> GatewayResult<()> {
        self.apply_overrides_from(|name| env::var(name).ok())
    }

    /// Apply overrides from an arbitrary variable source
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> GatewayResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(addr) = lookup("DOCGATE_SERVER_BIND_ADDRESS") {
            self.server.bind_address = addr;
        }

        if let Some(port) = lookup("DOCGATE_SERVER_PORT") {
            self.server.port = port
                .parse()
                .map_err(|e| GatewayError::config(format!("Invalid DOCGATE_SERVER_PORT: {}", e)))?;
        }

        if let Some(timeout) = lookup("DOCGATE_SERVER_REQUEST_TIMEOUT") {
            self.server.request_timeout = humantime::parse_duration(&timeout).map_err(|e| {
                GatewayError::config(format!("Invalid DOCGATE_SERVER_REQUEST_TIMEOUT: {}", e))
            })?;
        }

        if let Some(url) = lookup("DOCGATE_REDIS_URL") {
            self.cache.redis.url = url;
        }

        if let Some(enabled) = lookup("DOCGATE_CACHE_ENABLED") {
            self.cache.enabled = enabled
                .parse()
                .map_err(|e| GatewayError::config(format!("Invalid DOCGATE_CACHE_ENABLED: {}", e)))?;
        }

        if let Some(backend) = lookup("DOCGATE_CACHE_BACKEND") {
            self.cache.backend = match backend.to_lowercase().as_str() {
                "redis" => CacheBackend::Redis,
                "memory" => CacheBackend::Memory,
                other => {
                    return Err(GatewayError::config(format!(
                        "Invalid DOCGATE_CACHE_BACKEND: unknown backend '{}'",
                        other
                    )))
                }
            };
        }

        if let Some(ttl) = lookup("DOCGATE_CACHE_DEFAULT_TTL") {
            self.cache.default_ttl_secs = ttl.parse().map_err(|e| {
                GatewayError::config(format!("Invalid DOCGATE_CACHE_DEFAULT_TTL: {}", e))
            })?;
        }

        if let Some(timeout) = lookup("DOCGATE_MONGODB_SERVER_SELECTION_TIMEOUT") {
            self.mongodb.server_selection_timeout =
                humantime::parse_duration(&timeout).map_err(|e| {
                    GatewayError::config(format!(
                        "Invalid DOCGATE_MONGODB_SERVER_SELECTION_TIMEOUT: {}",
                        e
                    ))
                })?;
        }

        if let Some(level) = lookup("DOCGATE_LOG_LEVEL") {
            self.logging.level = level;
        }

        if let Some(format) = lookup("DOCGATE_LOG_FORMAT") {
            self.logging.format = match format.to_lowercase().as_str() {
                "json" => LogFormat::Json,
                "text" => LogFormat::Text,
                other => {
                    return Err(GatewayError::config(format!(
                        "Invalid DOCGATE_LOG_FORMAT: unknown format '{}'",
                        other
                    )))
                }
            };
        }

        Ok(())
    }

    /// Configuration validation with detailed error messages
    pub fn validate(&self) -> GatewayResult<()> {
        let mut errors = Vec::new();

        if self.server.bind_address.is_empty() {
            errors.push("bind_address cannot be empty".to_string());
        }

        if self.server.max_request_size == 0 {
            errors.push("max_request_size must be greater than 0".to_string());
        }

        if self.server.request_timeout.is_zero() {
            errors.push("request_timeout must be greater than 0".to_string());
        }

        if self.mongodb.server_selection_timeout.is_zero() {
            errors.push("mongodb.server_selection_timeout must be greater than 0".to_string());
        }

        if self.mongodb.min_pool_size > self.mongodb.max_pool_size {
            errors.push(format!(
                "mongodb.min_pool_size ({}) cannot exceed max_pool_size ({})",
                self.mongodb.min_pool_size, self.mongodb.max_pool_size
            ));
        }

        if self.cache.default_ttl_secs == 0 {
            errors.push("cache.default_ttl_secs must be greater than 0".to_string());
        }

        if self.cache.key_namespace.is_empty() {
            errors.push("cache.key_namespace cannot be empty".to_string());
        }

        if self.cache.enabled && self.cache.backend == CacheBackend::Redis {
            let url = &self.cache.redis.url;
            if !(url.starts_with("redis://") || url.starts_with("rediss://")) {
                errors.push(format!("cache.redis.url has unsupported scheme: {}", url));
            }
        }

        if self.cache.enabled && self.cache.backend == CacheBackend::Memory {
            if self.cache.memory.max_entries == 0 {
                errors.push("cache.memory.max_entries must be greater than 0".to_string());
            }
            if self.cache.memory.cleanup_interval.is_zero() {
                errors.push("cache.memory.cleanup_interval must be greater than 0".to_string());
            }
        }

        if self.query.max_limit == 0 {
            errors.push("query.max_limit must be greater than 0".to_string());
        }

        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => errors.push(format!("Invalid log level: {}", other)),
        }

        if !errors.is_empty() {
            return Err(GatewayError::config(errors.join("\n")));
        }

        Ok(())
    }
}

/// HTTP listener configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address for the server
    pub bind_address: String,

    /// HTTP port
    pub port: u16,

    /// Maximum request body size in bytes
    pub max_request_size: usize,

    /// Upper bound on a whole request, including cache and store work
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,

    /// Attach a permissive CORS layer
    pub enable_cors: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 8000,
            max_request_size: 10 * 1024 * 1024, // 10MB
            request_timeout: Duration::from_secs(30),
            enable_cors: true,
        }
    }
}

impl ServerConfig {
    pub fn socket_address(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }
}

/// Pagination bounds enforced on query payloads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryLimits {
    pub max_limit: i64,
    pub max_skip: i64,
}

impl Default for QueryLimits {
    fn default() -> Self {
        Self {
            max_limit: 1000,
            max_skip: 10000,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

impl LoggingConfig {
    /// Filter directive used when `RUST_LOG` is not set
    pub fn filter_directive(&self) -> String {
        let level = self.level.to_lowercase();
        format!("docgate={level},tower_http={level}")
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Text,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = GatewayConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.cache.default_ttl_secs, 86400);
        assert_eq!(config.query.max_limit, 1000);
        assert_eq!(config.query.max_skip, 10000);
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let yaml = r#"
server:
  port: 9100
cache:
  backend: memory
  default_ttl_secs: 60
"#;
        let config: GatewayConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.server.port, 9100);
        assert_eq!(config.server.bind_address, "0.0.0.0");
        assert_eq!(config.cache.backend, CacheBackend::Memory);
        assert_eq!(config.cache.default_ttl_secs, 60);
        assert_eq!(config.cache.key_namespace, "mongodb_api");
    }

    #[test]
    fn test_env_overrides() {
        let mut config = GatewayConfig::default();
        config
            .apply_overrides_from(lookup_from(&[
                ("DOCGATE_SERVER_PORT", "9001"),
                ("DOCGATE_SERVER_REQUEST_TIMEOUT", "45s"),
                ("DOCGATE_REDIS_URL", "redis://cache:6379/2"),
                ("DOCGATE_CACHE_BACKEND", "memory"),
                ("DOCGATE_CACHE_DEFAULT_TTL", "120"),
                ("DOCGATE_LOG_FORMAT", "json"),
            ]))
            .unwrap();

        assert_eq!(config.server.port, 9001);
        assert_eq!(config.server.request_timeout, Duration::from_secs(45));
        assert_eq!(config.cache.redis.url, "redis://cache:6379/2");
        assert_eq!(config.cache.backend, CacheBackend::Memory);
        assert_eq!(config.cache.default_ttl_secs, 120);
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_invalid_env_override_is_reported() {
        let mut config = GatewayConfig::default();
        let result = config.apply_overrides_from(lookup_from(&[("DOCGATE_SERVER_PORT", "eighty")]));

        match result {
            Err(GatewayError::Configuration { message }) => {
                assert!(message.contains("DOCGATE_SERVER_PORT"))
            }
            other => panic!("expected configuration error, got {:?}", other),
        }
    }

    #[test]
    fn test_validation_collects_all_errors() {
        let mut config = GatewayConfig::default();
        config.server.bind_address.clear();
        config.cache.default_ttl_secs = 0;
        config.logging.level = "verbose".to_string();

        let message = match config.validate() {
            Err(GatewayError::Configuration { message }) => message,
            other => panic!("expected configuration error, got {:?}", other),
        };
        assert_eq!(message.lines().count(), 3);
        assert!(message.contains("bind_address"));
        assert!(message.contains("default_ttl_secs"));
        assert!(message.contains("verbose"));
    }

    #[test]
    fn test_zero_cleanup_interval_rejected_for_memory_backend() {
        let mut config = GatewayConfig::default();
        config.cache.memory.cleanup_interval = Duration::ZERO;
        assert!(config.validate().is_ok());

        config.cache.backend = CacheBackend::Memory;
        let message = match config.validate() {
            Err(GatewayError::Configuration { message }) => message,
            other => panic!("expected configuration error, got {:?}", other),
        };
        assert!(message.contains("cleanup_interval"));
    }

    #[test]
    fn test_filter_directive() {
        let logging = LoggingConfig {
            level: "DEBUG".to_string(),
            format: LogFormat::Text,
        };
        assert_eq!(logging.filter_directive(), "docgate=debug,tower_http=debug");
    }
}
