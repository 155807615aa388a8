//! darter node monitor daemon.
//!
//! The node monitor runs on each worker host. It admits task reservations
//! pushed by schedulers, pulls task specs back from them on demand, and
//! launches tasks on local application backends.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use darter_node_monitor::{launcher, server, Config, NodeMonitor};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Starting darter node monitor");

    // Load configuration
    let config = match std::env::args().nth(1) {
        Some(path) => Config::from_file(Path::new(&path))?,
        None => Config::default(),
    };
    info!(
        port = config.port,
        policy = ?config.policy,
        cpu_cores = config.cpu_cores,
        capacity = %config.capacity,
        "Configuration loaded"
    );

    let (monitor, runnable_rx) = NodeMonitor::new(&config);
    launcher::start(Arc::clone(&monitor), runnable_rx, config.cpu_cores);

    let listener = TcpListener::bind(("0.0.0.0", config.port))
        .await
        .with_context(|| format!("failed to bind node monitor port {}", config.port))?;

    let server = tokio::spawn(server::serve(listener, monitor));

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received, exiting");
        }
        result = server => {
            result??;
        }
    }

    Ok(())
}
