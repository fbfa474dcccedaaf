//! Scheduler job model: naming, canonical desired form and drift detection.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::types::DeclarationSpec;

/// Path-style job identity: `projects/{project}/locations/{location}/jobs/{name}`.
///
/// A pure function of its three parts, so every pass for the same
/// declaration addresses the same remote job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobName {
    pub project: String,
    pub location: String,
    pub name: String,
}

impl JobName {
    pub fn new(
        project: impl Into<String>,
        location: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            project: project.into(),
            location: location.into(),
            name: name.into(),
        }
    }

    /// The `projects/{project}/locations/{location}` collection.
    pub fn parent(&self) -> String {
        format!("projects/{}/locations/{}", self.project, self.location)
    }
}

impl fmt::Display for JobName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/jobs/{}", self.parent(), self.name)
    }
}

/// HTTP methods the scheduler can call a target with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    Post,
    Get,
    Head,
    Put,
    Delete,
    Patch,
    Options,
}

impl HttpMethod {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Post => "POST",
            Self::Get => "GET",
            Self::Head => "HEAD",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
            Self::Patch => "PATCH",
            Self::Options => "OPTIONS",
        }
    }

    /// Method named by a declaration; absent or unknown names mean POST.
    pub fn from_spec(value: Option<&str>) -> Self {
        value
            .and_then(|v| v.parse().ok())
            .unwrap_or_default()
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HttpMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "POST" => Ok(Self::Post),
            "GET" => Ok(Self::Get),
            "HEAD" => Ok(Self::Head),
            "PUT" => Ok(Self::Put),
            "DELETE" => Ok(Self::Delete),
            "PATCH" => Ok(Self::Patch),
            "OPTIONS" => Ok(Self::Options),
            other => Err(format!("unsupported HTTP method '{other}'")),
        }
    }
}

/// Where and how the scheduler calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpTarget {
    pub uri: String,
    pub http_method: HttpMethod,
    pub body: Vec<u8>,
}

/// The scheduler's view of one job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalJob {
    /// Full job name as reported by the scheduler.
    pub name: String,
    pub schedule: String,
    pub time_zone: String,
    pub target: HttpTarget,
}

impl ExternalJob {
    /// Canonical job for `spec`, calling `target_uri`.
    ///
    /// Defaults are applied here (UTC, POST) so the result compares cleanly
    /// against what the scheduler reports back.
    pub fn desired(job_name: &JobName, spec: &DeclarationSpec, target_uri: &str) -> Self {
        Self {
            name: job_name.to_string(),
            schedule: spec.schedule.clone(),
            time_zone: spec.effective_time_zone().to_string(),
            target: HttpTarget {
                uri: target_uri.to_string(),
                http_method: spec.effective_http_method(),
                body: spec.body_bytes(),
            },
        }
    }

    /// Fields of `observed` that differ from `self`.
    ///
    /// The target URI is not compared; only schedule, time zone, body and
    /// method count as drift.
    pub fn drift(&self, observed: &Self) -> JobDrift {
        JobDrift {
            schedule: self.schedule != observed.schedule,
            time_zone: self.time_zone != observed.time_zone,
            body: self.target.body.as_slice() != observed.target.body.as_slice(),
            http_method: self.target.http_method != observed.target.http_method,
        }
    }
}

/// Per-field drift between a desired and an observed job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JobDrift {
    pub schedule: bool,
    pub time_zone: bool,
    pub body: bool,
    pub http_method: bool,
}

impl JobDrift {
    pub const fn is_empty(&self) -> bool {
        !(self.schedule || self.time_zone || self.body || self.http_method)
    }

    /// Names of the drifted fields, for logs.
    pub fn fields(&self) -> Vec<&'static str> {
        [
            ("schedule", self.schedule),
            ("timeZone", self.time_zone),
            ("body", self.body),
            ("httpMethod", self.http_method),
        ]
        .into_iter()
        .filter_map(|(name, drifted)| drifted.then_some(name))
        .collect()
    }
}

/// Target URL for a receiver address.
///
/// A bare domain becomes `http://{domain}/`; an absolute URL is kept with a
/// trailing slash.
pub fn receiver_target_url(address: &str) -> String {
    let address = address.trim();
    if address.contains("://") {
        if address.ends_with('/') {
            address.to_string()
        } else {
            format!("{address}/")
        }
    } else {
        format!("http://{}/", address.trim_end_matches('/'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> DeclarationSpec {
        DeclarationSpec::new("p1", "us-central1", "0 * * * *")
    }

    #[test]
    fn test_job_name_format() {
        let name = JobName::new("p1", "us-central1", "daily");
        assert_eq!(name.parent(), "projects/p1/locations/us-central1");
        assert_eq!(
            name.to_string(),
            "projects/p1/locations/us-central1/jobs/daily"
        );
    }

    #[test]
    fn test_http_method_parsing() {
        assert_eq!("put".parse::<HttpMethod>().ok(), Some(HttpMethod::Put));
        assert_eq!(HttpMethod::from_spec(Some("GET")), HttpMethod::Get);
        assert_eq!(HttpMethod::from_spec(Some("TRACE")), HttpMethod::Post);
        assert_eq!(HttpMethod::from_spec(None), HttpMethod::Post);
        assert!("TRACE".parse::<HttpMethod>().is_err());
    }

    #[test]
    fn test_desired_job_applies_defaults() {
        let job = ExternalJob::desired(
            &JobName::new("p1", "us-central1", "daily"),
            &spec(),
            "http://receiver/",
        );
        assert_eq!(job.name, "projects/p1/locations/us-central1/jobs/daily");
        assert_eq!(job.time_zone, "UTC");
        assert_eq!(job.target.http_method, HttpMethod::Post);
        assert!(job.target.body.is_empty());
    }

    #[test]
    fn test_drift_only_flags_changed_fields() {
        let name = JobName::new("p1", "us-central1", "daily");
        let observed = ExternalJob::desired(&name, &spec(), "http://receiver/");
        let mut updated_spec = spec();
        updated_spec.schedule = "*/5 * * * *".to_string();
        let desired = ExternalJob::desired(&name, &updated_spec, "http://receiver/");

        let drift = desired.drift(&observed);
        assert!(drift.schedule);
        assert!(!drift.time_zone && !drift.body && !drift.http_method);
        assert_eq!(drift.fields(), vec!["schedule"]);
    }

    #[test]
    fn test_drift_compares_body_bytes() {
        let name = JobName::new("p1", "us-central1", "daily");
        let observed = ExternalJob::desired(&name, &spec().with_body("{}"), "http://r/");
        let desired = ExternalJob::desired(&name, &spec().with_body("{} "), "http://r/");
        assert!(desired.drift(&observed).body);
        assert!(desired.drift(&desired.clone()).is_empty());
    }

    #[test]
    fn test_target_uri_change_is_not_drift() {
        let name = JobName::new("p1", "us-central1", "daily");
        let observed = ExternalJob::desired(&name, &spec(), "http://old-receiver/");
        let desired = ExternalJob::desired(&name, &spec(), "http://new-receiver/");
        assert!(desired.drift(&observed).is_empty());
    }

    #[test]
    fn test_receiver_target_url() {
        assert_eq!(
            receiver_target_url("daily.default.example.com"),
            "http://daily.default.example.com/"
        );
        assert_eq!(
            receiver_target_url("https://svc-a.example"),
            "https://svc-a.example/"
        );
        assert_eq!(
            receiver_target_url("https://svc-a.example/"),
            "https://svc-a.example/"
        );
    }
}
