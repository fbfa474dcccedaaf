//! Convergence loop for scheduled HTTP trigger declarations.
//!
//! A declaration asks for an HTTP call on a cron schedule, delivered to a
//! sink. One reconcile pass:
//!
//! 1. loads the declaration by `namespace/name` key
//! 2. attaches the cleanup finalizer before touching anything external
//! 3. resolves the sink to a URL and ensures the receiver forwarding to it
//! 4. creates or updates the scheduler job so it calls the receiver
//! 5. writes status back only when it changed
//!
//! Deletion runs the same pass in reverse: the job is removed, then the
//! finalizer is released.
//!
//! Every remote system sits behind a trait in [`capability`]; [`memory`]
//! has in-memory versions for tests.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use cronsource_reconciler::{ReconcilerBuilder, memory::*};
//!
//! let reconciler = ReconcilerBuilder::new()
//!     .with_store(Arc::new(InMemoryObjectStore::new()))
//!     .with_sink_resolver(Arc::new(StaticSinkResolver::new()))
//!     .with_receivers(Arc::new(StaticReceiverProvisioner::ready("rx.example.com")))
//!     .with_job_client(Arc::new(InMemoryJobClient::new()))
//!     .build()?;
//!
//! let result = reconciler.reconcile_key("default/daily").await?;
//! ```

#![forbid(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![forbid(clippy::panic)]

pub mod capability;
pub mod error;
pub mod job;
pub mod memory;
pub mod reconciler;
pub mod types;

pub use capability::{
    ExternalJobClient, ObjectStore, ReceiverProvisioner, ReceiverState, SinkResolver,
};
pub use error::{Error, JobClientError, ReceiverError, Result, SinkError, StoreError};
pub use job::{ExternalJob, HttpMethod, HttpTarget, JobDrift, JobName, receiver_target_url};
pub use reconciler::{Reconciler, ReconcilerBuilder, ReconcilerConfig};
pub use types::{
    DEFAULT_FINALIZER, DEFAULT_TIME_ZONE, Declaration, DeclarationMeta, DeclarationSpec,
    DeclarationStatus, JobAction, ObjectKey, ReconcileAction, ReconcileResult, SinkReference,
};
