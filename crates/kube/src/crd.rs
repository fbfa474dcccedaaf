//! CloudSchedulerSource CRD.

use std::collections::BTreeSet;

use cronsource_reconciler::{
    Declaration, DeclarationMeta, DeclarationSpec, DeclarationStatus, SinkReference,
};
use kube::{CustomResource, CustomResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// CloudSchedulerSource - calls a sink on a cron schedule through Google
/// Cloud Scheduler.
#[derive(CustomResource, Clone, Debug, Default, PartialEq, Eq, Deserialize, JsonSchema, Serialize)]
#[kube(
    group = "sources.eventing.knative.dev",
    version = "v1alpha1",
    kind = "CloudSchedulerSource",
    namespaced,
    status = "CloudSchedulerSourceStatus",
    shortname = "css",
    printcolumn = r#"{"name":"Schedule","type":"string","jsonPath":".spec.schedule"}"#,
    printcolumn = r#"{"name":"Job","type":"string","jsonPath":".status.job"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct CloudSchedulerSourceSpec {
    /// Service account the receive adapter runs as.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_account_name: Option<String>,

    /// GCP project the job is created in.
    #[serde(default)]
    pub google_cloud_project: String,

    /// Cloud Scheduler location, e.g. `us-central1`.
    pub location: String,

    /// Cron expression.
    pub schedule: String,

    /// IANA time zone; `UTC` when omitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,

    /// `POST` when omitted or unrecognised.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_method: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,

    /// Where relayed calls are delivered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sink: Option<SinkObjectReference>,
}

/// Reference to an addressable object.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, JsonSchema, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SinkObjectReference {
    pub api_version: String,
    pub kind: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

/// CloudSchedulerSourceStatus defines the observed state.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, JsonSchema, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CloudSchedulerSourceStatus {
    /// Full Cloud Scheduler job name.
    #[serde(default)]
    pub job: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub sink_uri: String,
}

impl From<&SinkObjectReference> for SinkReference {
    fn from(reference: &SinkObjectReference) -> Self {
        Self {
            api_version: reference.api_version.clone(),
            kind: reference.kind.clone(),
            name: reference.name.clone(),
            namespace: reference.namespace.clone(),
        }
    }
}

impl From<&DeclarationStatus> for CloudSchedulerSourceStatus {
    fn from(status: &DeclarationStatus) -> Self {
        Self {
            job: status.job.clone(),
            sink_uri: status.sink_uri.clone(),
        }
    }
}

impl CloudSchedulerSource {
    /// View this object as a declaration.
    ///
    /// # Errors
    ///
    /// [`Error::MissingObjectKey`] when namespace or name is unset.
    pub fn to_declaration(&self) -> Result<Declaration> {
        let meta = &self.metadata;
        let namespace = meta
            .namespace
            .clone()
            .ok_or(Error::MissingObjectKey(".metadata.namespace"))?;
        let name = meta
            .name
            .clone()
            .ok_or(Error::MissingObjectKey(".metadata.name"))?;

        let spec = &self.spec;
        Ok(Declaration {
            metadata: DeclarationMeta {
                namespace,
                name,
                uid: meta.uid.clone(),
                resource_version: meta.resource_version.clone(),
                deletion_requested: meta.deletion_timestamp.is_some(),
                finalizers: meta.finalizers.iter().flatten().cloned().collect::<BTreeSet<_>>(),
            },
            spec: DeclarationSpec {
                project: spec.google_cloud_project.clone(),
                location: spec.location.clone(),
                schedule: spec.schedule.clone(),
                time_zone: spec.timezone.clone(),
                http_method: spec.http_method.clone(),
                body: spec.body.clone(),
                sink: spec.sink.as_ref().map(SinkReference::from),
                service_account_name: spec.service_account_name.clone(),
            },
            status: self
                .status
                .as_ref()
                .map(|s| DeclarationStatus {
                    job: s.job.clone(),
                    sink_uri: s.sink_uri.clone(),
                })
                .unwrap_or_default(),
        })
    }
}

/// The CRD manifest as YAML.
///
/// # Errors
///
/// Returns an error if the manifest cannot be serialized.
pub fn crd_yaml() -> Result<String> {
    Ok(serde_yaml::to_string(&CloudSchedulerSource::crd())?)
}
