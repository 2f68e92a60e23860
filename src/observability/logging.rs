//! # Structured Logging
//!
//! Installs the global `tracing` subscriber. `RUST_LOG` wins when set;
//! otherwise the configured level applies to this crate and `tower_http`.

use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

use crate::core::config::{LogFormat, LoggingConfig};
use crate::core::error::{GatewayError, GatewayResult};

/// Build the filter from `RUST_LOG`, falling back to the configured level
pub fn env_filter(config: &LoggingConfig) -> GatewayResult<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(config.filter_directive()).map_err(|e| {
            GatewayError::config(format!("Invalid log level '{}': {}", config.level, e))
        }),
    }
}

/// Initialize the tracing subscriber
///
/// Calling this twice is harmless; the second call logs a warning.
pub fn init_tracing(config: &LoggingConfig) -> GatewayResult<()> {
    let filter = env_filter(config)?;

    let result = match config.format {
        LogFormat::Json => Registry::default()
            .with(filter)
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(true)
                    .with_target(true),
            )
            .try_init(),
        LogFormat::Text => Registry::default()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .try_init(),
    };

    if result.is_err() {
        warn!("Tracing subscriber already initialized, skipping initialization");
        return Ok(());
    }

    info!(level = %config.level, format = ?config.format, "Structured logging initialized");
    Ok(())
}
