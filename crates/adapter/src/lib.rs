//! Receive adapter
//!
//! HTTP endpoint targeted by Cloud Scheduler jobs. Every call is answered
//! with `200` and a dump of the request, and the dump is relayed to the sink
//! as a CloudEvent of type `GoogleCloudScheduler`.

#![forbid(unsafe_code)]
#![forbid(clippy::unwrap_used)]
#![forbid(clippy::panic)]
#![deny(clippy::expect_used)]

pub mod config;
pub mod error;
pub mod forwarder;

use std::future::Future;
use std::sync::Arc;

use axum::Router;
use axum::body::to_bytes;
use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use http::request::Parts;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

pub use config::AdapterConfig;
pub use error::{Error, Result};
pub use forwarder::{EVENT_SOURCE, EVENT_TYPE, EventContext, Forwarder};

/// Largest request body accepted.
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Wire-format dump of a request: request line, headers, blank line, body.
pub fn dump_request(parts: &Parts, body: &[u8]) -> Vec<u8> {
    let target = parts
        .uri
        .path_and_query()
        .map_or("/", |pq| pq.as_str());
    let mut dump = format!("{} {target} {:?}\r\n", parts.method, parts.version).into_bytes();
    for (name, value) in &parts.headers {
        dump.extend_from_slice(name.as_str().as_bytes());
        dump.extend_from_slice(b": ");
        dump.extend_from_slice(value.as_bytes());
        dump.extend_from_slice(b"\r\n");
    }
    dump.extend_from_slice(b"\r\n");
    dump.extend_from_slice(body);
    dump
}

/// Router answering every method and path.
pub fn create_router(forwarder: Arc<Forwarder>) -> Router {
    Router::new()
        .fallback(receive)
        .with_state(forwarder)
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
}

async fn receive(State(forwarder): State<Arc<Forwarder>>, request: Request) -> Response {
    let (parts, body) = request.into_parts();
    let body = match to_bytes(body, MAX_BODY_BYTES).await {
        Ok(body) => body,
        Err(e) => {
            warn!(error = %e, "Failed to read request body");
            return StatusCode::BAD_REQUEST.into_response();
        }
    };

    let dump = dump_request(&parts, &body);
    info!(dump = %String::from_utf8_lossy(&dump), "Received request");

    let context = EventContext::from_headers(&parts.headers);
    if let Err(e) = forwarder.forward(&dump, &context).await {
        warn!(event_id = %context.id, error = %e, "Event not delivered");
    }

    (StatusCode::OK, dump).into_response()
}

/// Serve on `config.listen_addr()` until `shutdown` completes.
///
/// # Errors
///
/// When the listener cannot be bound or the server fails.
pub async fn serve<F>(config: &AdapterConfig, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let forwarder = Arc::new(Forwarder::new(config)?);
    let addr = config.listen_addr();
    let listener = TcpListener::bind(addr).await?;
    info!(addr = %addr, sink = %config.sink, "Receive adapter listening");

    axum::serve(listener, create_router(forwarder))
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}
