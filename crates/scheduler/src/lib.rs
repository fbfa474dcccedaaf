//! Google Cloud Scheduler client.
//!
//! Implements [`cronsource_reconciler::ExternalJobClient`] over the v1 REST
//! API. Responses are classified by status code: 404 becomes
//! `NotFound`, everything else keeps its status for the caller to judge.
//!
//! # Example
//!
//! ```ignore
//! use cronsource_scheduler::{SchedulerClient, SchedulerConfig};
//!
//! let client = SchedulerClient::with_config(SchedulerConfig::from_env())?;
//! let job = client.get_job(&JobName::new("p1", "us-central1", "daily")).await?;
//! ```

#![forbid(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![forbid(clippy::panic)]

pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod wire;

pub use auth::{MetadataServerToken, NoToken, StaticToken, TokenSource};
pub use client::SchedulerClient;
pub use config::{SchedulerConfig, TokenConfig};
pub use error::{Error, Result};
