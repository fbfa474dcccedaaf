//! Posts received calls to the sink as binary-mode CloudEvents.

use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use http::HeaderMap;
use http::header::CONTENT_TYPE;
use tracing::{info, warn};
use url::Url;
use uuid::Uuid;

use crate::config::AdapterConfig;
use crate::error::{Error, Result};

/// `ce-type` of every forwarded event.
pub const EVENT_TYPE: &str = "GoogleCloudScheduler";

/// `ce-source` of every forwarded event.
pub const EVENT_SOURCE: &str = "GCPCloudScheduler";

/// CloudEvents version spoken on the wire.
pub const SPEC_VERSION: &str = "1.0";

/// Content type of the event data, a raw request dump.
pub const DATA_CONTENT_TYPE: &str = "text/plain; charset=utf-8";

/// Inbound header whose value becomes the event id.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Per-event attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventContext {
    pub id: String,
    pub time: DateTime<Utc>,
}

impl EventContext {
    /// Context for a call carrying `headers`, stamped now.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        Self {
            id: event_id(headers),
            time: Utc::now(),
        }
    }
}

/// The inbound `X-Request-Id`, else a fresh v4 UUID.
pub fn event_id(headers: &HeaderMap) -> String {
    headers
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map_or_else(|| Uuid::new_v4().to_string(), str::to_string)
}

/// Forwards events to a single sink.
#[derive(Debug, Clone)]
pub struct Forwarder {
    sink: Url,
    client: reqwest::Client,
}

impl Forwarder {
    /// Create a forwarder for `config.sink`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &AdapterConfig) -> Result<Self> {
        Self::with_timeout(config.sink.clone(), config.forward_timeout)
    }

    /// Create a forwarder for `sink` with a per-request timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn with_timeout(sink: Url, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { sink, client })
    }

    pub const fn sink(&self) -> &Url {
        &self.sink
    }

    /// Post one event. Failures are reported, never retried.
    ///
    /// # Errors
    ///
    /// On transport failure, or when the sink does not answer with success.
    pub async fn forward(&self, dump: &[u8], context: &EventContext) -> Result<()> {
        info!(sink = %self.sink, event_id = %context.id, "Posting event");

        let response = self
            .client
            .post(self.sink.clone())
            .header("ce-specversion", SPEC_VERSION)
            .header("ce-id", context.id.as_str())
            .header("ce-time", context.time.to_rfc3339_opts(SecondsFormat::Millis, true))
            .header("ce-type", EVENT_TYPE)
            .header("ce-source", EVENT_SOURCE)
            .header(CONTENT_TYPE, DATA_CONTENT_TYPE)
            .body(dump.to_vec())
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        warn!(
            sink = %self.sink,
            status = status.as_u16(),
            body = %body,
            "Sink rejected event"
        );
        Err(Error::sink_rejected(status.as_u16(), body))
    }
}
