//! courier-relay binary entry point.
//!
//! Usage:
//! ```bash
//! courier-relay --config relay.toml
//! courier-relay --bind 127.0.0.1:8765
//! ```

use anyhow::Context;
use clap::Parser;
use courier_relay::{http, spawn_liveness_task, Config, CourierRelay, RelayListener};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Named-endpoint WebSocket relay.
#[derive(Debug, Parser)]
#[command(name = "courier-relay", version, about)]
struct Args {
    /// Path to a TOML configuration file.
    #[arg(short, long, env = "COURIER_RELAY_CONFIG")]
    config: Option<PathBuf>,

    /// WebSocket bind address (overrides server.bind_address).
    #[arg(short, long)]
    bind: Option<String>,

    /// HTTP bind address (overrides http.bind_address).
    #[arg(long)]
    http_bind: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => Config::default(),
    };
    if let Some(bind) = args.bind {
        config.server.bind_address = bind;
    }
    if let Some(bind) = args.http_bind {
        config.http.bind_address = bind;
    }

    tracing::info!("courier-relay v{}", env!("CARGO_PKG_VERSION"));

    let relay = Arc::new(CourierRelay::new(config).context("invalid configuration")?);
    let config = relay.config().clone();

    let liveness = spawn_liveness_task(relay.liveness_monitor(), config.heartbeat.clone());

    if config.http.enabled {
        let http_listener = tokio::net::TcpListener::bind(&config.http.bind_address)
            .await
            .with_context(|| format!("binding HTTP listener on {}", config.http.bind_address))?;
        tracing::info!("HTTP endpoints on {}", config.http.bind_address);
        let router = http::build_router(Arc::clone(&relay));
        tokio::spawn(async move {
            if let Err(e) = axum::serve(http_listener, router).await {
                tracing::error!("HTTP server error: {}", e);
            }
        });
    }

    let listener = RelayListener::bind(Arc::clone(&relay), &config.server.bind_address)
        .await
        .with_context(|| format!("binding relay on {}", config.server.bind_address))?;

    listener
        .serve(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for Ctrl+C: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await?;

    liveness.abort();
    tracing::info!("Relay stopped");
    Ok(())
}
