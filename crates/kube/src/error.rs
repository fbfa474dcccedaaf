//! Error types for the Kubernetes bindings.

use thiserror::Error;

/// Result type for controller operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Controller error types.
#[derive(Error, Debug)]
pub enum Error {
    /// A required metadata field is absent.
    #[error("object is missing {0}")]
    MissingObjectKey(&'static str),

    /// Kubernetes API error.
    #[error("kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    /// A reconcile pass failed.
    #[error(transparent)]
    Reconcile(#[from] cronsource_reconciler::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML serialization error.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl Error {
    /// Check if the failed pass should be requeued with backoff.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Reconcile(e) => e.is_retryable(),
            Self::Kube(_) => true,
            Self::MissingObjectKey(_) | Self::Json(_) | Self::Yaml(_) => false,
        }
    }
}

/// HTTP status of a Kubernetes API error, when the API answered at all.
pub fn api_status(error: &kube::Error) -> Option<u16> {
    match error {
        kube::Error::Api(response) => Some(response.code),
        _ => None,
    }
}
