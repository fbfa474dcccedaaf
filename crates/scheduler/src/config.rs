//! Configuration for the scheduler client.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Error, Result};

/// Public Cloud Scheduler endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://cloudscheduler.googleapis.com/";

/// GCE metadata server token URL for the default service account.
pub const METADATA_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";

/// Where access tokens come from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TokenConfig {
    /// Ask the GCE metadata server.
    Metadata {
        #[serde(default = "default_metadata_url")]
        url: String,
    },
    /// Use a fixed bearer token.
    Static { token: String },
    /// Send no credentials, e.g. against an emulator.
    None,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self::Metadata {
            url: default_metadata_url(),
        }
    }
}

/// Configuration for the `SchedulerClient`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Base URL of the Cloud Scheduler REST API.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Timeout for each request.
    #[serde(with = "duration_secs", default = "default_timeout")]
    pub timeout: Duration,

    /// Token source.
    #[serde(default)]
    pub token: TokenConfig,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            timeout: default_timeout(),
            token: TokenConfig::default(),
        }
    }
}

impl SchedulerConfig {
    /// Create a config talking to `endpoint`.
    pub fn with_endpoint(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Default::default()
        }
    }

    /// Set the timeout.
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Use a fixed bearer token.
    #[must_use]
    pub fn static_token(mut self, token: impl Into<String>) -> Self {
        self.token = TokenConfig::Static {
            token: token.into(),
        };
        self
    }

    /// Send requests without credentials.
    #[must_use]
    pub fn anonymous(mut self) -> Self {
        self.token = TokenConfig::None;
        self
    }

    /// Load configuration from environment variables.
    ///
    /// `CLOUDSCHEDULER_ENDPOINT`, `CLOUDSCHEDULER_TOKEN` and
    /// `CLOUDSCHEDULER_TIMEOUT_SECS` override the defaults.
    pub fn from_env() -> Self {
        Self::default().merge_env()
    }

    /// Apply environment overrides on top of `self`.
    #[must_use]
    pub fn merge_env(mut self) -> Self {
        if let Ok(endpoint) = std::env::var("CLOUDSCHEDULER_ENDPOINT") {
            self.endpoint = endpoint;
        }

        if let Ok(token) = std::env::var("CLOUDSCHEDULER_TOKEN") {
            self.token = TokenConfig::Static { token };
        }

        if let Some(secs) = std::env::var("CLOUDSCHEDULER_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
        {
            self.timeout = Duration::from_secs(secs);
        }

        self
    }

    /// Load configuration from a file.
    ///
    /// # Errors
    ///
    /// Returns an error when the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;

        // JSON by extension, TOML otherwise
        if path.extension().is_some_and(|e| e == "json") {
            Ok(serde_json::from_str(&content)?)
        } else {
            toml::from_str(&content)
                .map_err(|e| Error::config(format!("Failed to parse config: {e}")))
        }
    }

    /// Absolute URL for a `v1` resource path.
    ///
    /// # Errors
    ///
    /// Returns an error when the endpoint and path do not form a URL.
    pub fn resource_url(&self, resource: &str) -> Result<Url> {
        let base = self.endpoint.trim_end_matches('/');
        Ok(format!("{base}/v1/{}", resource.trim_start_matches('/')).parse()?)
    }
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

fn default_metadata_url() -> String {
    METADATA_TOKEN_URL.to_string()
}

const fn default_timeout() -> Duration {
    Duration::from_secs(30)
}

/// Serialization helper for Duration as seconds.
pub(crate) mod duration_secs {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SchedulerConfig::default();
        assert_eq!(config.endpoint, DEFAULT_ENDPOINT);
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert!(matches!(config.token, TokenConfig::Metadata { .. }));
    }

    #[test]
    fn test_resource_url_joins_without_double_slash() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let config = SchedulerConfig::with_endpoint("http://127.0.0.1:8085");
        let url = config.resource_url("projects/p/locations/l/jobs/j")?;
        assert_eq!(url.as_str(), "http://127.0.0.1:8085/v1/projects/p/locations/l/jobs/j");

        let config = SchedulerConfig::default();
        let url = config.resource_url("projects/p/locations/l/jobs")?;
        assert_eq!(
            url.as_str(),
            "https://cloudscheduler.googleapis.com/v1/projects/p/locations/l/jobs"
        );
        Ok(())
    }

    #[test]
    fn test_toml_config() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let config: SchedulerConfig = toml::from_str(
            r#"
            endpoint = "http://localhost:8085/"
            timeout = 5

            [token]
            kind = "static"
            token = "abc"
            "#,
        )?;
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(
            config.token,
            TokenConfig::Static {
                token: "abc".to_string()
            }
        );
        Ok(())
    }

    #[test]
    fn test_config_builder() {
        let config = SchedulerConfig::default()
            .timeout(Duration::from_secs(3))
            .anonymous();
        assert_eq!(config.timeout, Duration::from_secs(3));
        assert_eq!(config.token, TokenConfig::None);
    }
}
