//! # cronsource
//!
//! Controller binary for CloudSchedulerSource.
//!
//! ## Startup
//!
//! 1. Configuration from file, environment and flags
//! 2. Kubernetes client from the ambient kubeconfig or service account
//! 3. Cloud Scheduler client
//! 4. Controller loop until Ctrl+C

#![forbid(unsafe_code)]
#![forbid(clippy::unwrap_used)]
#![forbid(clippy::panic)]
#![deny(clippy::expect_used)]

mod cli;
mod config;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use cronsource_scheduler::SchedulerClient;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use cli::{Cli, Commands, RunArgs};
use config::ControllerConfig;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Crd) => print_crd(),
        Some(Commands::Run(ref args)) => run(&cli, args).await,
        None => run(&cli, &RunArgs::default()).await,
    }
}

fn print_crd() -> Result<()> {
    let yaml = cronsource_kube::crd_yaml().context("Failed to render CRD")?;
    print!("{yaml}");
    Ok(())
}

async fn run(cli: &Cli, args: &RunArgs) -> Result<()> {
    init_tracing(&cli.log_level);

    let config = load_config(cli, args)?;
    info!(
        adapter_image = %config.adapter_image,
        namespace = config.namespace.as_deref().unwrap_or("*"),
        endpoint = %config.scheduler.endpoint,
        "cronsource starting"
    );

    let client = kube::Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;

    let jobs = SchedulerClient::with_config(config.scheduler.clone())
        .context("Failed to create Cloud Scheduler client")?;

    let reconciler = cronsource_kube::cluster_reconciler(
        &client,
        &config.adapter_image,
        Arc::new(jobs),
        &config.finalizer,
    )
    .context("Failed to build reconciler")?;

    let shutdown = tokio::spawn(wait_for_shutdown());
    cronsource_kube::run(client, reconciler, config.controller_settings(), async move {
        shutdown.await.ok();
    })
    .await;

    info!("cronsource stopped gracefully");
    Ok(())
}

fn load_config(cli: &Cli, args: &RunArgs) -> Result<ControllerConfig> {
    let base = match &cli.config {
        Some(path) => ControllerConfig::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => ControllerConfig::default(),
    };
    let config = args.apply(base.merge_env());
    config.validate()?;
    Ok(config)
}

/// Initialize tracing subscriber with environment filter.
fn init_tracing(level: &str) {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Wait for shutdown signal (Ctrl+C).
async fn wait_for_shutdown() {
    match signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C, initiating graceful shutdown"),
        Err(err) => error!("Failed to listen for shutdown signal: {}", err),
    }
}
