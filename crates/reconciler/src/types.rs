//! Core types for the reconciler.

use std::collections::BTreeSet;
use std::fmt;

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::job::{ExternalJob, HttpMethod, JobDrift, JobName};

/// Finalizer that holds a declaration until its scheduler job is gone.
pub const DEFAULT_FINALIZER: &str = "cloudschedulersource-controller";

/// Time zone written to the scheduler when the declaration names none.
pub const DEFAULT_TIME_ZONE: &str = "UTC";

/// Identity of a declaration in the object store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    /// Create a key from its parts.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Split a `namespace/name` key.
    ///
    /// A bare `name` is accepted with an empty namespace.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidKey`] when the key has more than one `/` or an
    /// empty name.
    pub fn parse(key: &str) -> Result<Self> {
        let parts: Vec<&str> = key.split('/').collect();
        match parts.as_slice() {
            [name] if !name.is_empty() => Ok(Self::new("", *name)),
            [namespace, name] if !name.is_empty() => Ok(Self::new(*namespace, *name)),
            _ => Err(Error::invalid_key(key)),
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}/{}", self.namespace, self.name)
        }
    }
}

/// Typed pointer at the object that receives relayed calls.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SinkReference {
    pub api_version: String,
    pub kind: String,
    pub name: String,
    /// Overrides the declaration's namespace when set.
    pub namespace: Option<String>,
}

impl SinkReference {
    /// Create a reference in the declaration's own namespace.
    pub fn new(
        api_version: impl Into<String>,
        kind: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            api_version: api_version.into(),
            kind: kind.into(),
            name: name.into(),
            namespace: None,
        }
    }

    /// The namespace the referenced object lives in.
    pub fn namespace_or<'a>(&'a self, fallback: &'a str) -> &'a str {
        self.namespace
            .as_deref()
            .filter(|ns| !ns.is_empty())
            .unwrap_or(fallback)
    }
}

impl fmt::Display for SinkReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}/{}", self.api_version, self.kind, self.name)
    }
}

/// What the user asked for.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeclarationSpec {
    pub project: String,
    pub location: String,
    /// Cron expression, e.g. `"*/5 * * * *"`.
    pub schedule: String,
    pub time_zone: Option<String>,
    pub http_method: Option<String>,
    pub body: Option<String>,
    pub sink: Option<SinkReference>,
    /// Service account the receiver runs as.
    pub service_account_name: Option<String>,
}

impl DeclarationSpec {
    /// Create a spec with the required fields set.
    pub fn new(
        project: impl Into<String>,
        location: impl Into<String>,
        schedule: impl Into<String>,
    ) -> Self {
        Self {
            project: project.into(),
            location: location.into(),
            schedule: schedule.into(),
            ..Self::default()
        }
    }

    /// Set the sink reference.
    #[must_use]
    pub fn with_sink(mut self, sink: SinkReference) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Set the time zone.
    #[must_use]
    pub fn with_time_zone(mut self, time_zone: impl Into<String>) -> Self {
        self.time_zone = Some(time_zone.into());
        self
    }

    /// Set the HTTP method.
    #[must_use]
    pub fn with_http_method(mut self, method: impl Into<String>) -> Self {
        self.http_method = Some(method.into());
        self
    }

    /// Set the body payload.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Time zone with the default applied.
    pub fn effective_time_zone(&self) -> &str {
        self.time_zone
            .as_deref()
            .filter(|tz| !tz.is_empty())
            .unwrap_or(DEFAULT_TIME_ZONE)
    }

    /// HTTP method with the default applied.
    pub fn effective_http_method(&self) -> HttpMethod {
        HttpMethod::from_spec(self.http_method.as_deref())
    }

    /// Body bytes; empty when no body was declared.
    pub fn body_bytes(&self) -> Vec<u8> {
        self.body
            .as_deref()
            .map(|b| b.as_bytes().to_vec())
            .unwrap_or_default()
    }

    /// Names of required fields that are empty.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        [
            ("project", self.project.as_str()),
            ("location", self.location.as_str()),
            ("schedule", self.schedule.as_str()),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(field, _)| field)
        .collect()
    }
}

/// Derived state; recomputed on every pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeclarationStatus {
    /// Full scheduler job name, empty until created.
    pub job: String,
    /// Resolved sink URL, empty until resolved.
    pub sink_uri: String,
}

/// Store-owned metadata of a declaration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeclarationMeta {
    pub namespace: String,
    pub name: String,
    pub uid: Option<String>,
    /// Opaque version used for conditional updates.
    pub resource_version: Option<String>,
    pub deletion_requested: bool,
    pub finalizers: BTreeSet<String>,
}

/// A scheduled HTTP trigger declaration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Declaration {
    pub metadata: DeclarationMeta,
    pub spec: DeclarationSpec,
    pub status: DeclarationStatus,
}

impl Declaration {
    /// Create a declaration with empty status and metadata.
    pub fn new(
        namespace: impl Into<String>,
        name: impl Into<String>,
        spec: DeclarationSpec,
    ) -> Self {
        Self {
            metadata: DeclarationMeta {
                namespace: namespace.into(),
                name: name.into(),
                ..DeclarationMeta::default()
            },
            spec,
            status: DeclarationStatus::default(),
        }
    }

    /// Store key of this declaration.
    pub fn key(&self) -> ObjectKey {
        ObjectKey::new(&self.metadata.namespace, &self.metadata.name)
    }

    /// Deterministic scheduler job name.
    pub fn job_name(&self) -> JobName {
        JobName::new(
            &self.spec.project,
            &self.spec.location,
            &self.metadata.name,
        )
    }

    /// Whether the spec names a project and location, so a job name exists.
    ///
    /// Weaker than [`Self::validate`]: the schedule is not required, so a job
    /// created earlier stays addressable after the schedule is cleared.
    pub fn addresses_job(&self) -> bool {
        !self.spec.project.trim().is_empty() && !self.spec.location.trim().is_empty()
    }

    /// Job the declaration currently asks for, calling `target_uri`.
    pub fn desired_job(&self, target_uri: &str) -> ExternalJob {
        ExternalJob::desired(&self.job_name(), &self.spec, target_uri)
    }

    /// Check required spec fields.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidDeclaration`] listing every empty required field.
    pub fn validate(&self) -> Result<()> {
        let missing = self.spec.missing_fields();
        if missing.is_empty() {
            return Ok(());
        }
        Err(Error::invalid_declaration(
            self.key().to_string(),
            format!("missing required fields: {}", missing.iter().join(", ")),
        ))
    }

    pub const fn is_deleting(&self) -> bool {
        self.metadata.deletion_requested
    }

    pub fn has_finalizer(&self, finalizer: &str) -> bool {
        self.metadata.finalizers.contains(finalizer)
    }

    /// Returns `true` if the finalizer was not present before.
    pub fn add_finalizer(&mut self, finalizer: &str) -> bool {
        self.metadata.finalizers.insert(finalizer.to_string())
    }

    /// Returns `true` if the finalizer was present before.
    pub fn remove_finalizer(&mut self, finalizer: &str) -> bool {
        self.metadata.finalizers.remove(finalizer)
    }

    /// Whether status or finalizers differ from `other`.
    ///
    /// Spec and the rest of the metadata are ignored: those are owned by the
    /// user and the store.
    pub fn needs_write(&self, other: &Self) -> bool {
        self.status != other.status || self.metadata.finalizers != other.metadata.finalizers
    }
}

/// What happened to the scheduler job during a pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobAction {
    Created,
    Updated { drift: JobDrift },
    Unchanged,
}

/// What a single reconcile pass did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileAction {
    /// The key could not be parsed; nothing to retry.
    Skipped { reason: String },
    /// The declaration no longer exists.
    Missing,
    /// External cleanup finished and the finalizer was released.
    Finalized,
    /// External state matches the declaration.
    Converged { job: String, job_action: JobAction },
}

impl ReconcileAction {
    /// Get a description of the action.
    pub fn description(&self) -> String {
        match self {
            Self::Skipped { reason } => format!("skipped: {reason}"),
            Self::Missing => "declaration no longer exists".to_string(),
            Self::Finalized => "job deleted, finalizer released".to_string(),
            Self::Converged { job, job_action } => match job_action {
                JobAction::Created => format!("created job {job}"),
                JobAction::Updated { drift } => {
                    format!("updated job {job} ({})", drift.fields().join(", "))
                }
                JobAction::Unchanged => format!("job {job} up to date"),
            },
        }
    }
}

/// Result of reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileResult {
    /// Key as delivered.
    pub key: String,
    pub action: ReconcileAction,
    /// Whether status or finalizers were written back.
    pub status_written: bool,
}

impl ReconcileResult {
    /// Create a new reconcile result.
    pub fn new(key: impl Into<String>, action: ReconcileAction, status_written: bool) -> Self {
        Self {
            key: key.into(),
            action,
            status_written,
        }
    }

    /// Whether external state now matches the declaration.
    pub const fn converged(&self) -> bool {
        matches!(self.action, ReconcileAction::Converged { .. })
    }
}
