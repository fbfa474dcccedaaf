//! CLI definitions using clap.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::ControllerConfig;

/// cronsource - CloudSchedulerSource controller
#[derive(Parser, Debug)]
#[command(name = "cronsource")]
#[command(version)]
#[command(about = "Keeps Google Cloud Scheduler jobs in step with CloudSchedulerSource objects")]
pub struct Cli {
    /// Config file (TOML, or JSON by extension)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the controller (default)
    Run(RunArgs),

    /// Print the CloudSchedulerSource CRD manifest
    Crd,
}

#[derive(clap::Args, Debug, Default)]
pub struct RunArgs {
    /// Receive adapter image
    #[arg(long)]
    pub adapter_image: Option<String>,

    /// Namespace to watch (all when omitted)
    #[arg(short, long)]
    pub namespace: Option<String>,

    /// Cloud Scheduler endpoint
    #[arg(long)]
    pub scheduler_endpoint: Option<String>,

    /// Concurrent reconciles
    #[arg(long)]
    pub concurrency: Option<u16>,
}

impl RunArgs {
    /// Apply flags on top of `config`.
    pub fn apply(&self, mut config: ControllerConfig) -> ControllerConfig {
        if let Some(image) = &self.adapter_image {
            config.adapter_image.clone_from(image);
        }
        if let Some(namespace) = &self.namespace {
            config.namespace = Some(namespace.clone());
        }
        if let Some(endpoint) = &self.scheduler_endpoint {
            config.scheduler.endpoint.clone_from(endpoint);
        }
        if let Some(concurrency) = self.concurrency {
            config.concurrency = concurrency;
        }
        config
    }
}
