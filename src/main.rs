//! # docgate binary
//!
//! Loads configuration (YAML file, then `DOCGATE_*` environment variables,
//! then command line flags), initializes logging, connects the response
//! cache, and serves until SIGINT or SIGTERM.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::signal;
use tracing::{info, warn};

use docgate::caching::ResponseCache;
use docgate::core::config::{GatewayConfig, LogFormat};
use docgate::docstore::mongo::MongoStore;
use docgate::gateway::server::{AppState, GatewayServer};
use docgate::observability::init_tracing;

#[derive(Debug, Parser)]
#[command(name = "docgate", version, about = "Caching HTTP gateway for MongoDB reads")]
struct Cli {
    /// Configuration file; missing files fall back to defaults
    #[arg(short, long, env = "DOCGATE_CONFIG", default_value = "config/docgate.yaml")]
    config: PathBuf,

    /// Bind address override
    #[arg(long)]
    host: Option<String>,

    /// Port override
    #[arg(short, long)]
    port: Option<u16>,

    /// Log level override (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// Log format override
    #[arg(long, value_parser = ["json", "text"])]
    log_format: Option<String>,

    /// Serve without a response cache
    #[arg(long)]
    no_cache: bool,
}

impl Cli {
    fn apply(&self, config: &mut GatewayConfig) {
        if let Some(host) = &self.host {
            config.server.bind_address = host.clone();
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(level) = &self.log_level {
            config.logging.level = level.clone();
        }
        match self.log_format.as_deref() {
            Some("json") => config.logging.format = LogFormat::Json,
            Some("text") => config.logging.format = LogFormat::Text,
            _ => {}
        }
        if self.no_cache {
            config.cache.enabled = false;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = GatewayConfig::load(&cli.config)
        .await
        .with_context(|| format!("loading configuration from {}", cli.config.display()))?;
    cli.apply(&mut config);
    config.validate().context("validating configuration")?;

    init_tracing(&config.logging)?;

    info!("🚀 Starting docgate");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let cache = Arc::new(ResponseCache::connect(&config.cache).await);
    if !cache.is_available() {
        warn!("Response cache unavailable, serving every request from MongoDB");
    }

    let store = Arc::new(MongoStore::new(config.mongodb.clone()));
    let state = AppState::new(store, cache, config.query);

    GatewayServer::new(config.server.clone(), state)
        .start_with_shutdown(shutdown_signal())
        .await?;

    info!("✅ docgate shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("📡 Received Ctrl+C, initiating graceful shutdown"),
        _ = terminate => info!("📡 Received SIGTERM, initiating graceful shutdown"),
    }
}
