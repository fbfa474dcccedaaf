//! Access tokens for the scheduler API.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::debug;

use crate::config::TokenConfig;
use crate::error::{Error, Result};

/// Tokens are refreshed this long before they expire.
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

/// Supplies the bearer token attached to each request.
#[async_trait]
pub trait TokenSource: Send + Sync {
    /// Current token; `None` sends the request without credentials.
    async fn token(&self) -> Result<Option<String>>;
}

/// Build the token source described by `config`.
pub fn token_source(config: &TokenConfig, http: reqwest::Client) -> Arc<dyn TokenSource> {
    match config {
        TokenConfig::Metadata { url } => Arc::new(MetadataServerToken::new(url.clone(), http)),
        TokenConfig::Static { token } => Arc::new(StaticToken::new(token.clone())),
        TokenConfig::None => Arc::new(NoToken),
    }
}

/// A fixed bearer token.
#[derive(Debug, Clone)]
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

#[async_trait]
impl TokenSource for StaticToken {
    async fn token(&self) -> Result<Option<String>> {
        Ok(Some(self.0.clone()))
    }
}

/// No credentials.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoToken;

#[async_trait]
impl TokenSource for NoToken {
    async fn token(&self) -> Result<Option<String>> {
        Ok(None)
    }
}

#[derive(Debug, Deserialize)]
struct MetadataTokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    refresh_at: Instant,
}

/// Token of the workload's service account from the GCE metadata server,
/// cached until shortly before it expires.
pub struct MetadataServerToken {
    url: String,
    http: reqwest::Client,
    cached: RwLock<Option<CachedToken>>,
}

impl MetadataServerToken {
    pub fn new(url: impl Into<String>, http: reqwest::Client) -> Self {
        Self {
            url: url.into(),
            http,
            cached: RwLock::new(None),
        }
    }

    async fn fetch(&self) -> Result<CachedToken> {
        let response = self
            .http
            .get(&self.url)
            .header("Metadata-Flavor", "Google")
            .send()
            .await
            .map_err(|e| Error::auth(format!("metadata server unreachable: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::auth(format!("metadata server returned {status}")));
        }

        let body: MetadataTokenResponse = response
            .json()
            .await
            .map_err(|e| Error::auth(format!("malformed token response: {e}")))?;

        let lifetime = Duration::from_secs(body.expires_in).saturating_sub(EXPIRY_MARGIN);
        let now = Instant::now();
        debug!(expires_in = body.expires_in, "Fetched access token");
        Ok(CachedToken {
            value: body.access_token,
            refresh_at: now.checked_add(lifetime).unwrap_or(now),
        })
    }
}

#[async_trait]
impl TokenSource for MetadataServerToken {
    async fn token(&self) -> Result<Option<String>> {
        if let Some(cached) = self.cached.read().await.as_ref() {
            if Instant::now() < cached.refresh_at {
                return Ok(Some(cached.value.clone()));
            }
        }

        let fresh = self.fetch().await?;
        let value = fresh.value.clone();
        *self.cached.write().await = Some(fresh);
        Ok(Some(value))
    }
}
