//! Error types for the receive adapter.

use thiserror::Error;

/// Result type alias for adapter operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Receive adapter errors.
#[derive(Debug, Error)]
pub enum Error {
    /// The sink is missing or not an absolute URL.
    #[error("invalid sink '{sink}': {reason}")]
    InvalidSink { sink: String, reason: String },

    /// The sink answered with a non-success status.
    #[error("sink responded {status}: {body}")]
    SinkRejected { status: u16, body: String },

    /// The inbound request body could not be read.
    #[error("failed to read request body: {0}")]
    Body(#[from] axum::Error),

    /// HTTP client error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create an invalid sink error.
    pub fn invalid_sink(sink: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidSink {
            sink: sink.into(),
            reason: reason.into(),
        }
    }

    /// Create a sink rejection error.
    pub fn sink_rejected(status: u16, body: impl Into<String>) -> Self {
        Self::SinkRejected {
            status,
            body: body.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::invalid_sink("", "no sink given");
        assert_eq!(err.to_string(), "invalid sink '': no sink given");

        let err = Error::sink_rejected(503, "unavailable");
        assert_eq!(err.to_string(), "sink responded 503: unavailable");
    }
}
