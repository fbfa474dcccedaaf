//! Error types for the reconciler crate.

use thiserror::Error;

/// Result type alias for reconciler operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Failure classes reported by the object store.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// The stored object moved on since it was read.
    #[error("version conflict updating '{key}'")]
    Conflict { key: String },

    /// The object vanished between read and write.
    #[error("object '{key}' not found")]
    NotFound { key: String },

    /// Any other storage backend failure.
    #[error("object store failure: {reason}")]
    Backend { reason: String },
}

impl StoreError {
    /// Create a conflict error.
    pub fn conflict(key: impl Into<String>) -> Self {
        Self::Conflict { key: key.into() }
    }

    /// Create a backend error.
    pub fn backend(reason: impl Into<String>) -> Self {
        Self::Backend {
            reason: reason.into(),
        }
    }
}

/// Failures resolving a sink reference to an address.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SinkError {
    /// The declaration carries no sink reference at all.
    #[error("sink reference is missing")]
    MissingReference,

    /// The referenced object is absent or has not published an address yet.
    #[error("sink {reference} not resolved: {reason}")]
    NotResolved { reference: String, reason: String },

    /// Fetching the referenced object failed (transport, authorization, server).
    #[error("sink {reference} lookup failed: {reason}")]
    Lookup { reference: String, reason: String },
}

impl SinkError {
    /// Create a not-resolved error.
    pub fn not_resolved(reference: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::NotResolved {
            reference: reference.into(),
            reason: reason.into(),
        }
    }

    /// Create a lookup error.
    pub fn lookup(reference: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Lookup {
            reference: reference.into(),
            reason: reason.into(),
        }
    }
}

/// Failures provisioning the receiver endpoint.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("receiver provisioning failed: {reason}")]
pub struct ReceiverError {
    pub reason: String,
}

impl ReceiverError {
    /// Create a receiver error.
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Outcome classes of a call to the external scheduler.
///
/// `NotFound` confirms absence and is never derived from message text.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum JobClientError {
    /// The scheduler reported that the job does not exist.
    #[error("job '{job}' not found")]
    NotFound { job: String },

    /// Anything else; treated as transient by callers.
    #[error("scheduler call failed{}: {reason}", .status.map(|s| format!(" ({s})")).unwrap_or_default())]
    Other { status: Option<u16>, reason: String },
}

impl JobClientError {
    /// Create a not-found error.
    pub fn not_found(job: impl Into<String>) -> Self {
        Self::NotFound { job: job.into() }
    }

    /// Create an error for a failure with no HTTP status attached.
    pub fn other(reason: impl Into<String>) -> Self {
        Self::Other {
            status: None,
            reason: reason.into(),
        }
    }

    /// Create an error carrying the HTTP status the scheduler answered with.
    pub fn with_status(status: u16, reason: impl Into<String>) -> Self {
        Self::Other {
            status: Some(status),
            reason: reason.into(),
        }
    }

    /// Whether the scheduler confirmed absence.
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Reconciler error types.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// Object key did not split into namespace and name.
    #[error("invalid object key '{key}'")]
    InvalidKey { key: String },

    /// The declaration is missing required fields.
    #[error("invalid declaration '{key}': {reason}")]
    InvalidDeclaration { key: String, reason: String },

    /// Sink could not be resolved.
    #[error("sink resolution failed for '{key}': {source}")]
    Sink {
        key: String,
        #[source]
        source: SinkError,
    },

    /// Receiver exists but has no address yet.
    #[error("receiver for '{key}' is not ready")]
    ReceiverNotReady { key: String },

    /// Receiver could not be provisioned.
    #[error("receiver for '{key}' failed: {source}")]
    Receiver {
        key: String,
        #[source]
        source: ReceiverError,
    },

    /// A scheduler call failed.
    #[error("{op} of job '{job}' failed: {source}")]
    Job {
        op: &'static str,
        job: String,
        #[source]
        source: JobClientError,
    },

    /// Reading or writing the declaration failed.
    #[error("object store: {0}")]
    Store(#[from] StoreError),

    /// The pass was abandoned before completion.
    #[error("reconcile of '{key}' cancelled")]
    Cancelled { key: String },

    /// Invalid reconciler configuration.
    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },
}

impl Error {
    /// Create an invalid key error.
    pub fn invalid_key(key: impl Into<String>) -> Self {
        Self::InvalidKey { key: key.into() }
    }

    /// Create an invalid declaration error.
    pub fn invalid_declaration(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidDeclaration {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Create a sink error.
    pub fn sink(key: impl Into<String>, source: SinkError) -> Self {
        Self::Sink {
            key: key.into(),
            source,
        }
    }

    /// Create a receiver-not-ready error.
    pub fn receiver_not_ready(key: impl Into<String>) -> Self {
        Self::ReceiverNotReady { key: key.into() }
    }

    /// Create a receiver failure error.
    pub fn receiver(key: impl Into<String>, source: ReceiverError) -> Self {
        Self::Receiver {
            key: key.into(),
            source,
        }
    }

    /// Create a job call error.
    pub fn job(op: &'static str, job: impl Into<String>, source: JobClientError) -> Self {
        Self::Job {
            op,
            job: job.into(),
            source,
        }
    }

    /// Create a cancellation error.
    pub fn cancelled(key: impl Into<String>) -> Self {
        Self::Cancelled { key: key.into() }
    }

    /// Create an invalid config error.
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Whether re-running the pass later may succeed without user action.
    pub const fn is_retryable(&self) -> bool {
        !matches!(
            self,
            Self::InvalidKey { .. } | Self::InvalidDeclaration { .. } | Self::InvalidConfig { .. }
        )
    }

    /// Whether the failure was an optimistic-concurrency conflict.
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::Store(StoreError::Conflict { .. }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_error_display_includes_status() {
        let err = JobClientError::with_status(503, "unavailable");
        assert_eq!(err.to_string(), "scheduler call failed (503): unavailable");
        assert_eq!(
            JobClientError::other("reset").to_string(),
            "scheduler call failed: reset"
        );
    }

    #[test]
    fn test_wrapped_job_error_names_operation() {
        let err = Error::job(
            "delete",
            "projects/p/locations/l/jobs/j",
            JobClientError::other("boom"),
        );
        let message = err.to_string();
        assert!(message.contains("delete"));
        assert!(message.contains("projects/p/locations/l/jobs/j"));
    }

    #[test]
    fn test_retryability() {
        assert!(Error::receiver_not_ready("ns/a").is_retryable());
        assert!(Error::sink("ns/a", SinkError::MissingReference).is_retryable());
        assert!(Error::sink("ns/a", SinkError::lookup("v1/Service/a", "503")).is_retryable());
        assert!(Error::from(StoreError::conflict("ns/a")).is_retryable());
        assert!(!Error::invalid_key("a/b/c").is_retryable());
        assert!(!Error::invalid_declaration("ns/a", "schedule is required").is_retryable());
    }

    #[test]
    fn test_conflict_detection() {
        assert!(Error::from(StoreError::conflict("ns/a")).is_conflict());
        assert!(!Error::from(StoreError::backend("down")).is_conflict());
    }
}
