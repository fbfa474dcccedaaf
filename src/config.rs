//! Controller configuration: file, then environment, then CLI flags.

use std::path::Path;
use std::time::Duration;

use cronsource_kube::ControllerSettings;
use cronsource_reconciler::DEFAULT_FINALIZER;
use cronsource_scheduler::SchedulerConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid JSON config: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid TOML config: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid configuration: {reason}")]
    Invalid { reason: String },
}

impl ConfigError {
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::Invalid {
            reason: reason.into(),
        }
    }
}

/// Everything the controller binary needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Image of the receive adapter deployed per source.
    #[serde(default)]
    pub adapter_image: String,

    /// Namespace to watch; all namespaces when unset.
    #[serde(default)]
    pub namespace: Option<String>,

    /// Cloud Scheduler client settings.
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    #[serde(default = "default_concurrency")]
    pub concurrency: u16,

    /// Resync interval for converged sources.
    #[serde(with = "duration_secs", default = "default_requeue")]
    pub requeue: Duration,

    /// Delay before retrying a failed pass.
    #[serde(with = "duration_secs", default = "default_error_backoff")]
    pub error_backoff: Duration,

    /// Upper bound on a single pass.
    #[serde(with = "duration_secs", default = "default_pass_timeout")]
    pub pass_timeout: Duration,

    #[serde(default = "default_finalizer")]
    pub finalizer: String,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            adapter_image: String::new(),
            namespace: None,
            scheduler: SchedulerConfig::default(),
            concurrency: default_concurrency(),
            requeue: default_requeue(),
            error_backoff: default_error_backoff(),
            pass_timeout: default_pass_timeout(),
            finalizer: default_finalizer(),
        }
    }
}

impl ControllerConfig {
    /// Load configuration from a file.
    ///
    /// # Errors
    ///
    /// Returns an error when the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;

        // JSON by extension, TOML otherwise
        if path.extension().is_some_and(|e| e == "json") {
            Ok(serde_json::from_str(&content)?)
        } else {
            Ok(toml::from_str(&content)?)
        }
    }

    /// Apply environment overrides on top of `self`.
    ///
    /// `CRONSOURCE_ADAPTER_IMAGE`, `CRONSOURCE_NAMESPACE`,
    /// `CRONSOURCE_CONCURRENCY` and `CRONSOURCE_FINALIZER`, plus the
    /// `CLOUDSCHEDULER_*` variables of the scheduler client.
    #[must_use]
    pub fn merge_env(self) -> Self {
        let mut config = self.merge_vars(|name| std::env::var(name).ok());
        config.scheduler = config.scheduler.merge_env();
        config
    }

    /// Apply the `CRONSOURCE_*` overrides looked up through `var`.
    #[must_use]
    pub fn merge_vars(mut self, var: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(image) = var("CRONSOURCE_ADAPTER_IMAGE") {
            self.adapter_image = image;
        }

        if let Some(namespace) = var("CRONSOURCE_NAMESPACE").filter(|ns| !ns.is_empty()) {
            self.namespace = Some(namespace);
        }

        if let Some(concurrency) = var("CRONSOURCE_CONCURRENCY").and_then(|s| s.parse().ok()) {
            self.concurrency = concurrency;
        }

        if let Some(finalizer) = var("CRONSOURCE_FINALIZER") {
            self.finalizer = finalizer;
        }

        self
    }

    /// Check the settings the controller cannot start without.
    ///
    /// # Errors
    ///
    /// When the adapter image or finalizer is empty, or concurrency is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.adapter_image.trim().is_empty() {
            return Err(ConfigError::invalid(
                "adapter image is required (--adapter-image or CRONSOURCE_ADAPTER_IMAGE)",
            ));
        }
        if self.finalizer.trim().is_empty() {
            return Err(ConfigError::invalid("finalizer must not be empty"));
        }
        if self.concurrency == 0 {
            return Err(ConfigError::invalid("concurrency must be at least 1"));
        }
        Ok(())
    }

    /// Settings for the controller loop.
    pub fn controller_settings(&self) -> ControllerSettings {
        ControllerSettings {
            namespace: self.namespace.clone(),
            concurrency: self.concurrency,
            requeue: self.requeue,
            error_backoff: self.error_backoff,
            pass_timeout: self.pass_timeout,
        }
    }
}

const fn default_concurrency() -> u16 {
    2
}

const fn default_requeue() -> Duration {
    Duration::from_secs(300)
}

const fn default_error_backoff() -> Duration {
    Duration::from_secs(30)
}

const fn default_pass_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_finalizer() -> String {
    DEFAULT_FINALIZER.to_string()
}

mod duration_secs {
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
