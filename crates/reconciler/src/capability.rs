//! Collaborators the reconciler drives.
//!
//! Each trait is one remote system seen through the narrowest interface the
//! convergence algorithm needs. Every method is a suspension point.

use async_trait::async_trait;

use crate::error::{JobClientError, ReceiverError, SinkError, StoreError};
use crate::job::{ExternalJob, JobName};
use crate::types::{Declaration, ObjectKey, SinkReference};

/// Source of declarations and sink of their status.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Load a declaration; `None` when it no longer exists.
    async fn get(&self, key: &ObjectKey) -> Result<Option<Declaration>, StoreError>;

    /// Write status and finalizers, conditional on
    /// `declaration.metadata.resource_version`.
    async fn update(&self, declaration: &Declaration) -> Result<Declaration, StoreError>;
}

/// Turns a sink reference into a URL.
#[async_trait]
pub trait SinkResolver: Send + Sync {
    /// Resolve `reference`; relative references live in `namespace`.
    async fn resolve(&self, reference: &SinkReference, namespace: &str)
    -> Result<String, SinkError>;
}

/// Readiness of a receiver endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReceiverState {
    /// Serving at `address` (a domain or an absolute URL).
    Ready { address: String },
    /// Created but without an address yet.
    NotReady,
}

/// Ensures the HTTP receiver for a declaration exists.
#[async_trait]
pub trait ReceiverProvisioner: Send + Sync {
    /// Create or converge the receiver forwarding to `sink_uri`.
    async fn ensure(
        &self,
        declaration: &Declaration,
        sink_uri: &str,
    ) -> Result<ReceiverState, ReceiverError>;
}

/// The managed scheduler's job API.
#[async_trait]
pub trait ExternalJobClient: Send + Sync {
    async fn get(&self, name: &JobName) -> Result<ExternalJob, JobClientError>;

    async fn create(&self, name: &JobName, job: &ExternalJob)
    -> Result<ExternalJob, JobClientError>;

    /// Replace the job named by `job.name`.
    async fn update(&self, job: &ExternalJob) -> Result<ExternalJob, JobClientError>;

    async fn delete(&self, name: &JobName) -> Result<(), JobClientError>;
}
