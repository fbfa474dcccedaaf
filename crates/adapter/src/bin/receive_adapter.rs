//! Receive adapter binary.

use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use cronsource_adapter::AdapterConfig;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Relay Cloud Scheduler calls to a sink as CloudEvents.
#[derive(Parser, Debug)]
#[command(name = "receive-adapter")]
#[command(version)]
struct Args {
    /// URI to send events to
    #[arg(long)]
    sink: String,

    /// Timeout for each forward, in seconds
    #[arg(long, default_value_t = 30)]
    forward_timeout_secs: u64,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(&args.log_level);

    let config = AdapterConfig::new(&args.sink)
        .context("No sink given")?
        .forward_timeout(Duration::from_secs(args.forward_timeout_secs))
        .merge_env();
    info!(sink = %config.sink, "Sink configured");

    cronsource_adapter::serve(&config, wait_for_shutdown())
        .await
        .context("Receive adapter failed")?;

    info!("Receive adapter stopped");
    Ok(())
}

fn init_tracing(level: &str) {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn wait_for_shutdown() {
    match signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C, shutting down"),
        Err(err) => error!("Failed to listen for shutdown signal: {}", err),
    }
}
