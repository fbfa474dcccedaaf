//! Sink resolution through an explicit registry of resolvable kinds.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use cronsource_reconciler::{SinkError, SinkReference, SinkResolver};
use kube::Client;
use kube::api::{Api, ApiResource, DynamicObject, GroupVersionKind};
use tracing::debug;

/// Knows where an object of one kind publishes its address.
pub trait Resolvable: Send + Sync {
    /// The object's URL, or `None` while it has not published one.
    fn address(&self, object: &DynamicObject, namespace: &str) -> Option<String>;
}

fn string_at<'a>(object: &'a DynamicObject, pointer: &str) -> Option<&'a str> {
    object
        .data
        .pointer(pointer)
        .and_then(serde_json::Value::as_str)
        .filter(|s| !s.is_empty())
}

fn host_url(host: &str) -> String {
    format!("http://{}/", host.trim_end_matches('/'))
}

/// Addressable duck type: `status.address.url`, else `status.address.hostname`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Addressable;

impl Resolvable for Addressable {
    fn address(&self, object: &DynamicObject, _namespace: &str) -> Option<String> {
        string_at(object, "/status/address/url")
            .map(str::to_string)
            .or_else(|| string_at(object, "/status/address/hostname").map(host_url))
    }
}

/// Knative Service: `status.url`, else the legacy `status.domain`.
#[derive(Debug, Clone, Copy, Default)]
pub struct KnativeService;

impl Resolvable for KnativeService {
    fn address(&self, object: &DynamicObject, namespace: &str) -> Option<String> {
        string_at(object, "/status/url")
            .map(str::to_string)
            .or_else(|| string_at(object, "/status/domain").map(host_url))
            .or_else(|| Addressable.address(object, namespace))
    }
}

/// Core `v1/Service`: cluster-local DNS name.
#[derive(Debug, Clone, Copy, Default)]
pub struct CoreService;

impl Resolvable for CoreService {
    fn address(&self, object: &DynamicObject, namespace: &str) -> Option<String> {
        let name = object.metadata.name.as_deref()?;
        let namespace = object.metadata.namespace.as_deref().unwrap_or(namespace);
        Some(format!("http://{name}.{namespace}.svc.cluster.local/"))
    }
}

/// Split `group/version` (or a bare core `version`) into its parts.
fn group_version(api_version: &str) -> (&str, &str) {
    api_version.rsplit_once('/').unwrap_or(("", api_version))
}

/// Resolvables keyed by `(group, kind)`; unregistered kinds fall back to
/// [`Addressable`].
#[derive(Clone)]
pub struct SinkRegistry {
    entries: HashMap<(String, String), Arc<dyn Resolvable>>,
    fallback: Arc<dyn Resolvable>,
}

impl Default for SinkRegistry {
    fn default() -> Self {
        Self::empty()
            .register("serving.knative.dev", "Service", KnativeService)
            .register("", "Service", CoreService)
    }
}

impl SinkRegistry {
    /// A registry where every kind is treated as Addressable.
    pub fn empty() -> Self {
        Self {
            entries: HashMap::new(),
            fallback: Arc::new(Addressable),
        }
    }

    /// Register `resolvable` for `kind` in API `group` (`""` for core).
    #[must_use]
    pub fn register(
        mut self,
        group: impl Into<String>,
        kind: impl Into<String>,
        resolvable: impl Resolvable + 'static,
    ) -> Self {
        self.entries
            .insert((group.into(), kind.into()), Arc::new(resolvable));
        self
    }

    /// Resolvable for a reference.
    pub fn lookup(&self, reference: &SinkReference) -> &dyn Resolvable {
        let (group, _) = group_version(&reference.api_version);
        self.entries
            .get(&(group.to_string(), reference.kind.clone()))
            .unwrap_or(&self.fallback)
            .as_ref()
    }
}

/// Resolves sinks by fetching the referenced object.
#[derive(Clone)]
pub struct KubeSinkResolver {
    client: Client,
    registry: SinkRegistry,
}

impl KubeSinkResolver {
    pub const fn new(client: Client, registry: SinkRegistry) -> Self {
        Self { client, registry }
    }
}

/// API resource for a reference, with the conventional plural.
pub fn api_resource(reference: &SinkReference) -> ApiResource {
    let (group, version) = group_version(&reference.api_version);
    ApiResource::from_gvk(&GroupVersionKind::gvk(group, version, &reference.kind))
}

/// `get_opt` already maps 404 to `None`; anything left is a failed lookup.
fn sink_lookup_error(reference: &SinkReference, error: &kube::Error) -> SinkError {
    SinkError::lookup(reference.to_string(), error.to_string())
}

#[async_trait]
impl SinkResolver for KubeSinkResolver {
    async fn resolve(
        &self,
        reference: &SinkReference,
        namespace: &str,
    ) -> Result<String, SinkError> {
        let namespace = reference.namespace_or(namespace);
        let resource = api_resource(reference);
        let api: Api<DynamicObject> =
            Api::namespaced_with(self.client.clone(), namespace, &resource);

        let object = api
            .get_opt(&reference.name)
            .await
            .map_err(|e| sink_lookup_error(reference, &e))?
            .ok_or_else(|| SinkError::not_resolved(reference.to_string(), "object not found"))?;

        let address = self
            .registry
            .lookup(reference)
            .address(&object, namespace)
            .ok_or_else(|| {
                SinkError::not_resolved(reference.to_string(), "no address published")
            })?;
        debug!(sink = %reference, address = %address, "Resolved sink address");
        Ok(address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type TestResult = std::result::Result<(), Box<dyn std::error::Error>>;

    fn object(value: serde_json::Value) -> std::result::Result<DynamicObject, serde_json::Error> {
        serde_json::from_value(value)
    }

    fn knative_ref() -> SinkReference {
        SinkReference::new("serving.knative.dev/v1", "Service", "svc-a")
    }

    #[test]
    fn test_knative_service_prefers_url() -> TestResult {
        let svc = object(serde_json::json!({
            "apiVersion": "serving.knative.dev/v1",
            "kind": "Service",
            "metadata": {"name": "svc-a", "namespace": "default"},
            "status": {"url": "https://svc-a.example", "domain": "svc-a.default.example.com"}
        }))?;
        let registry = SinkRegistry::default();
        assert_eq!(
            registry.lookup(&knative_ref()).address(&svc, "default"),
            Some("https://svc-a.example".to_string())
        );
        Ok(())
    }

    #[test]
    fn test_knative_service_legacy_domain() -> TestResult {
        let svc = object(serde_json::json!({
            "apiVersion": "serving.knative.dev/v1alpha1",
            "kind": "Service",
            "metadata": {"name": "svc-a"},
            "status": {"domain": "svc-a.default.example.com"}
        }))?;
        let registry = SinkRegistry::default();
        let reference = SinkReference::new("serving.knative.dev/v1alpha1", "Service", "svc-a");
        assert_eq!(
            registry.lookup(&reference).address(&svc, "default"),
            Some("http://svc-a.default.example.com/".to_string())
        );
        Ok(())
    }

    #[test]
    fn test_unready_knative_service_has_no_address() -> TestResult {
        let svc = object(serde_json::json!({
            "apiVersion": "serving.knative.dev/v1",
            "kind": "Service",
            "metadata": {"name": "svc-a"},
            "status": {}
        }))?;
        assert_eq!(KnativeService.address(&svc, "default"), None);
        Ok(())
    }

    #[test]
    fn test_core_service_uses_cluster_dns() -> TestResult {
        let svc = object(serde_json::json!({
            "apiVersion": "v1",
            "kind": "Service",
            "metadata": {"name": "events"}
        }))?;
        let reference = SinkReference::new("v1", "Service", "events");
        assert_eq!(
            SinkRegistry::default()
                .lookup(&reference)
                .address(&svc, "team-a"),
            Some("http://events.team-a.svc.cluster.local/".to_string())
        );
        Ok(())
    }

    #[test]
    fn test_unknown_kind_falls_back_to_addressable() -> TestResult {
        let broker = object(serde_json::json!({
            "apiVersion": "eventing.knative.dev/v1",
            "kind": "Broker",
            "metadata": {"name": "default"},
            "status": {"address": {"hostname": "broker.default.svc.cluster.local"}}
        }))?;
        let reference = SinkReference::new("eventing.knative.dev/v1", "Broker", "default");
        assert_eq!(
            SinkRegistry::default()
                .lookup(&reference)
                .address(&broker, "default"),
            Some("http://broker.default.svc.cluster.local/".to_string())
        );
        Ok(())
    }

    #[test]
    fn test_api_resource_for_core_and_group_kinds() {
        let core = api_resource(&SinkReference::new("v1", "Service", "x"));
        assert_eq!(core.group, "");
        assert_eq!(core.plural, "services");

        let ksvc = api_resource(&knative_ref());
        assert_eq!(ksvc.group, "serving.knative.dev");
        assert_eq!(ksvc.version, "v1");
        assert_eq!(ksvc.api_version, "serving.knative.dev/v1");
    }

    #[test]
    fn test_api_failure_is_a_lookup_error() {
        let forbidden = kube::Error::Api(kube::core::ErrorResponse {
            status: "Failure".to_string(),
            message: "services.serving.knative.dev is forbidden".to_string(),
            reason: "Forbidden".to_string(),
            code: 403,
        });
        let err = sink_lookup_error(&knative_ref(), &forbidden);
        assert!(matches!(err, SinkError::Lookup { .. }));
        assert!(err.to_string().contains("lookup failed"));
    }
}
