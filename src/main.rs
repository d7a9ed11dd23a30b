//! API Gateway
//!
//! A versioned API gateway built with Tokio and Axum.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request ──▶ http server ──▶ version resolver ──▶ route matcher
//!                                                                  │
//!                                                                  ▼
//!     Client Response ◀── telemetry ◀── proxy engine ──▶ backend service
//!
//!     Cross-cutting: config snapshot (arc-swap), service registry,
//!     stats/metrics, lifecycle shutdown
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use api_gateway::config::{load_config, watcher, GatewayConfig};
use api_gateway::http::HttpServer;
use api_gateway::lifecycle::Shutdown;
use api_gateway::telemetry::metrics;

#[derive(Parser, Debug)]
#[command(name = "api-gateway", about = "Versioned API gateway")]
struct Args {
    /// Path to the TOML configuration file. Defaults are used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Load configuration first; its log level seeds the default filter.
    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => GatewayConfig::default(),
    };

    let default_filter = format!("api_gateway={},tower_http=info", config.observability.log_level);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!(
        bind_address = %config.listener.bind_address,
        services = config.services.len(),
        default_version = %config.versions.default,
        request_timeout_secs = config.timeouts.request_secs,
        "Configuration loaded"
    );

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    let local_addr = listener.local_addr()?;
    tracing::info!(address = %local_addr, "Listening for connections");

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    // Watch the config file for changes; updates arrive pre-validated and
    // are swapped in as whole snapshots by the server. The watcher handle
    // must stay alive for the lifetime of the server.
    let (_config_watcher, config_updates) = match &args.config {
        Some(path) => {
            let (handle, rx) = watcher::watch(path)?;
            (Some(handle), rx)
        }
        None => {
            let (_tx, rx) = tokio::sync::mpsc::unbounded_channel();
            (None, rx)
        }
    };

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    shutdown.trigger_on_ctrl_c();

    let server = HttpServer::new(config)?;
    server.run(listener, config_updates, server_shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
