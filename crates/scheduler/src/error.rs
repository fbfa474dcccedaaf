//! Error types for the scheduler crate.

use cronsource_reconciler::JobClientError;
use thiserror::Error;

/// Result type for scheduler operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur talking to Cloud Scheduler.
#[derive(Error, Debug)]
pub enum Error {
    /// The scheduler answered 404 for the job.
    #[error("job '{job}' not found")]
    NotFound { job: String },

    /// The scheduler answered with a non-success status.
    #[error("scheduler returned {status}: {body}")]
    Status { status: u16, body: String },

    /// The scheduler answered with something we cannot interpret.
    #[error("invalid response: {reason}")]
    InvalidResponse { reason: String },

    /// No access token could be obtained.
    #[error("authentication failed: {reason}")]
    Auth { reason: String },

    /// Configuration error.
    #[error("configuration error: {reason}")]
    Config { reason: String },

    /// HTTP error from reqwest.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// URL parse error.
    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a not-found error.
    pub fn not_found(job: impl Into<String>) -> Self {
        Self::NotFound { job: job.into() }
    }

    /// Create a status error.
    pub fn status(status: u16, body: impl Into<String>) -> Self {
        Self::Status {
            status,
            body: body.into(),
        }
    }

    /// Create an invalid response error.
    pub fn invalid_response(reason: impl Into<String>) -> Self {
        Self::InvalidResponse {
            reason: reason.into(),
        }
    }

    /// Create an authentication error.
    pub fn auth(reason: impl Into<String>) -> Self {
        Self::Auth {
            reason: reason.into(),
        }
    }

    /// Create a config error.
    pub fn config(reason: impl Into<String>) -> Self {
        Self::Config {
            reason: reason.into(),
        }
    }

    /// Check if this error is retryable.
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::Http(_) | Self::Auth { .. } => true,
            _ => false,
        }
    }
}

impl From<Error> for JobClientError {
    fn from(error: Error) -> Self {
        match error {
            Error::NotFound { job } => Self::not_found(job),
            Error::Status { status, body } => Self::with_status(status, body),
            Error::Http(e) => match e.status() {
                Some(status) => Self::with_status(status.as_u16(), e.to_string()),
                None => Self::other(e.to_string()),
            },
            other => Self::other(other.to_string()),
        }
    }
}
