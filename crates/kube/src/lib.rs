//! Kubernetes bindings for the CloudSchedulerSource controller.
//!
//! - [`crd`]: the `CloudSchedulerSource` custom resource
//! - [`store`]: object store over the Kubernetes API
//! - [`sink`]: sink resolution via a registry of resolvable kinds
//! - [`receiver`]: receive adapter deployed as a Knative Service
//! - [`controller`]: the `kube::runtime::Controller` loop

#![forbid(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![forbid(clippy::panic)]

pub mod controller;
pub mod crd;
pub mod error;
pub mod receiver;
pub mod sink;
pub mod store;

use std::sync::Arc;

use cronsource_reconciler::{ExternalJobClient, Reconciler, ReconcilerBuilder};
use kube::Client;

pub use controller::{ControllerSettings, run};
pub use crd::{CloudSchedulerSource, CloudSchedulerSourceSpec, CloudSchedulerSourceStatus, crd_yaml};
pub use error::{Error, Result};
pub use receiver::KnativeReceiverProvisioner;
pub use sink::{KubeSinkResolver, Resolvable, SinkRegistry};
pub use store::KubeObjectStore;

/// Build a reconciler whose store, sinks and receivers live in the cluster.
///
/// # Errors
///
/// When the finalizer name is empty.
pub fn cluster_reconciler(
    client: &Client,
    adapter_image: &str,
    jobs: Arc<dyn ExternalJobClient>,
    finalizer: &str,
) -> Result<Reconciler> {
    Ok(ReconcilerBuilder::new()
        .with_store(Arc::new(KubeObjectStore::new(client.clone())))
        .with_sink_resolver(Arc::new(KubeSinkResolver::new(
            client.clone(),
            SinkRegistry::default(),
        )))
        .with_receivers(Arc::new(KnativeReceiverProvisioner::new(
            client.clone(),
            adapter_image,
        )))
        .with_job_client(jobs)
        .finalizer(finalizer)
        .build()?)
}
