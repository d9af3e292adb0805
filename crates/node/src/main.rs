//! Swift node - serves the access and storage nodes described by a config file
//!
//! One process can host any number of nodes; requests are routed to a node
//! by their Host header.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tokio::sync::watch;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use service::{Config, ServiceState};

const FINAL_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Swift node - cross-domain key/value storage by redirect
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the TOML config describing the service and its nodes
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port to listen on for HTTP requests, overriding the config
    #[arg(short, long)]
    port: Option<u16>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize tracing
    let (non_blocking_writer, _guard) = tracing_appender::non_blocking(std::io::stdout());
    let log_level: tracing::Level = args.log_level.parse().unwrap_or(tracing::Level::INFO);
    let env_filter = EnvFilter::builder()
        .with_default_directive(log_level.into())
        .from_env_lossy();

    let stdout_layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_writer(non_blocking_writer)
        .with_filter(env_filter);

    tracing_subscriber::registry().with(stdout_layer).init();

    tracing::info!("Starting Swift node");

    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => {
            tracing::warn!("no config file given, serving with defaults and no nodes");
            Config::default()
        }
    };
    if let Some(port) = args.port {
        config.listen_addr.set_port(port);
    }

    let state = match ServiceState::from_config(config) {
        Ok(state) => state,
        Err(e) => {
            tracing::error!("Failed to create service state: {}", e);
            std::process::exit(1);
        }
    };

    // Set up graceful shutdown
    let (shutdown_tx, shutdown_rx) = watch::channel(());
    let graceful_shutdown = async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for ctrl+c: {}", e);
            return;
        }
        tracing::info!("Received shutdown signal");
        let _ = shutdown_tx.send(());
    };
    tokio::spawn(graceful_shutdown);

    let mut server_rx = shutdown_rx.clone();
    let mut server_handle = tokio::spawn(async move {
        if let Err(e) = service::http::run(state, shutdown_rx).await {
            tracing::error!("HTTP server error: {}", e);
        }
    });

    tokio::select! {
        _ = &mut server_handle => {}
        _ = server_rx.changed() => {
            let _ = tokio::time::timeout(FINAL_SHUTDOWN_TIMEOUT, server_handle).await;
        }
    }

    tracing::info!("Swift node shutdown complete");
    Ok(())
}
