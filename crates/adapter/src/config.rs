//! Receive adapter configuration.

use std::net::SocketAddr;
use std::time::Duration;

use url::Url;

use crate::error::{Error, Result};

/// Port used when `PORT` is unset or unparsable.
pub const DEFAULT_PORT: u16 = 8080;

/// Default timeout for a single forward to the sink.
pub const DEFAULT_FORWARD_TIMEOUT: Duration = Duration::from_secs(30);

/// Adapter settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterConfig {
    /// Where events are posted.
    pub sink: Url,
    /// Listening port.
    pub port: u16,
    /// Timeout for each forward.
    pub forward_timeout: Duration,
}

impl AdapterConfig {
    /// Create a config forwarding to `sink`.
    ///
    /// # Errors
    ///
    /// When `sink` is empty or not an absolute URL.
    pub fn new(sink: &str) -> Result<Self> {
        if sink.trim().is_empty() {
            return Err(Error::invalid_sink(sink, "no sink given"));
        }
        let parsed = Url::parse(sink).map_err(|e| Error::invalid_sink(sink, e.to_string()))?;
        Ok(Self {
            sink: parsed,
            port: DEFAULT_PORT,
            forward_timeout: DEFAULT_FORWARD_TIMEOUT,
        })
    }

    /// Set the port.
    #[must_use]
    pub const fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the forward timeout.
    #[must_use]
    pub const fn forward_timeout(mut self, timeout: Duration) -> Self {
        self.forward_timeout = timeout;
        self
    }

    /// Apply the `PORT` environment variable.
    #[must_use]
    pub fn merge_env(self) -> Self {
        let port = port_from(std::env::var("PORT").ok().as_deref());
        self.port(port)
    }

    /// Address to listen on, all interfaces.
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::from(([0, 0, 0, 0], self.port))
    }
}

/// Port from a raw `PORT` value, falling back to [`DEFAULT_PORT`].
pub fn port_from(raw: Option<&str>) -> u16 {
    raw.map(str::trim)
        .filter(|s| !s.is_empty())
        .and_then(|s| s.parse().ok())
        .unwrap_or(DEFAULT_PORT)
}
