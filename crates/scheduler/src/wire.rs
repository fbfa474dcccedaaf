//! JSON shapes of the Cloud Scheduler v1 `Job` resource.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use cronsource_reconciler::{ExternalJob, HttpMethod, HttpTarget};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// `HttpTarget` as sent on the wire; `body` is base64.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpTargetResource {
    pub uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

/// `Job` as sent on the wire. Fields the controller does not manage are
/// ignored on read and omitted on write.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobResource {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub schedule: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_zone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_target: Option<HttpTargetResource>,
}

impl From<&ExternalJob> for JobResource {
    fn from(job: &ExternalJob) -> Self {
        Self {
            name: job.name.clone(),
            schedule: job.schedule.clone(),
            time_zone: Some(job.time_zone.clone()),
            http_target: Some(HttpTargetResource {
                uri: job.target.uri.clone(),
                http_method: Some(job.target.http_method.as_str().to_string()),
                body: (!job.target.body.is_empty()).then(|| STANDARD.encode(&job.target.body)),
            }),
        }
    }
}

impl TryFrom<JobResource> for ExternalJob {
    type Error = Error;

    fn try_from(resource: JobResource) -> Result<Self> {
        let target = resource.http_target.ok_or_else(|| {
            Error::invalid_response(format!("job '{}' has no httpTarget", resource.name))
        })?;

        let body = match target.body.as_deref() {
            None | Some("") => Vec::new(),
            Some(encoded) => STANDARD
                .decode(encoded)
                .map_err(|e| Error::invalid_response(format!("undecodable body: {e}")))?,
        };

        Ok(Self {
            name: resource.name,
            schedule: resource.schedule,
            time_zone: resource.time_zone.unwrap_or_default(),
            target: HttpTarget {
                uri: target.uri,
                // The API reports HTTP_METHOD_UNSPECIFIED for POST defaults.
                http_method: HttpMethod::from_spec(target.http_method.as_deref()),
                body,
            },
        })
    }
}
