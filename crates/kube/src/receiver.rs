//! Knative Service running the receive adapter for each source.

use async_trait::async_trait;
use cronsource_reconciler::{Declaration, ReceiverError, ReceiverProvisioner, ReceiverState};
use kube::api::{Api, ApiResource, DynamicObject, GroupVersionKind, Patch, PatchParams, PostParams};
use kube::{Client, Resource};
use serde_json::{Value, json};
use tracing::{debug, info};

use crate::crd::CloudSchedulerSource;

/// Label put on every receiver service.
pub const RECEIVER_LABEL: &str = "sources.eventing.knative.dev/cloudschedulersource";

/// `serving.knative.dev/v1` Service.
pub fn knative_service_resource() -> ApiResource {
    ApiResource::from_gvk_with_plural(
        &GroupVersionKind::gvk("serving.knative.dev", "v1", "Service"),
        "services",
    )
}

/// Receiver service desired for `declaration`, forwarding to `sink_uri`.
///
/// # Errors
///
/// When the declaration has no uid to own the service with.
pub fn desired_service(
    declaration: &Declaration,
    sink_uri: &str,
    image: &str,
) -> Result<DynamicObject, ReceiverError> {
    let meta = &declaration.metadata;
    let uid = meta
        .uid
        .as_deref()
        .ok_or_else(|| ReceiverError::new(format!("{} has no uid", declaration.key())))?;

    let mut pod_spec = json!({
        "containers": [{
            "image": image,
            "args": [format!("--sink={sink_uri}")],
        }]
    });
    if let (Some(account), Some(spec)) = (
        declaration.spec.service_account_name.as_deref(),
        pod_spec.as_object_mut(),
    ) {
        spec.insert("serviceAccountName".to_string(), json!(account));
    }

    let value = json!({
        "apiVersion": "serving.knative.dev/v1",
        "kind": "Service",
        "metadata": {
            "name": meta.name,
            "namespace": meta.namespace,
            "labels": { (RECEIVER_LABEL): meta.name },
            "ownerReferences": [{
                "apiVersion": CloudSchedulerSource::api_version(&()),
                "kind": CloudSchedulerSource::kind(&()),
                "name": meta.name,
                "uid": uid,
                "controller": true,
                "blockOwnerDeletion": true,
            }],
        },
        "spec": { "template": { "spec": pod_spec } },
    });
    serde_json::from_value(value).map_err(|e| ReceiverError::new(e.to_string()))
}

/// The receiver-relevant part of a service: its pod template spec.
fn template_spec(service: &DynamicObject) -> Option<&Value> {
    service.data.pointer("/spec/template/spec")
}

fn container_field<'a>(service: &'a DynamicObject, field: &str) -> Option<&'a Value> {
    template_spec(service)?.pointer(&format!("/containers/0/{field}"))
}

/// Whether `existing` runs a different image, sink or service account.
pub fn service_drifted(existing: &DynamicObject, desired: &DynamicObject) -> bool {
    let account = |s: &DynamicObject| {
        template_spec(s)
            .and_then(|t| t.get("serviceAccountName"))
            .filter(|v| !v.is_null())
            .cloned()
    };
    container_field(existing, "image") != container_field(desired, "image")
        || container_field(existing, "args") != container_field(desired, "args")
        || account(existing) != account(desired)
}

/// Merge patch moving an existing service to `desired`.
///
/// A merge patch only removes keys set to `null`, so a dropped service
/// account is sent as an explicit `null`.
pub fn update_patch(desired: &DynamicObject) -> Value {
    let mut spec = desired.data.get("spec").cloned().unwrap_or_else(|| json!({}));
    if let Some(pod_spec) = spec
        .pointer_mut("/template/spec")
        .and_then(Value::as_object_mut)
    {
        pod_spec
            .entry("serviceAccountName")
            .or_insert(Value::Null);
    }
    json!({ "spec": spec })
}

/// Published address of a service, if any.
pub fn service_address(service: &DynamicObject) -> Option<String> {
    ["/status/url", "/status/domain", "/status/address/url"]
        .iter()
        .find_map(|p| {
            service
                .data
                .pointer(p)
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
        })
        .map(str::to_string)
}

/// Provisions receivers as Knative Services.
#[derive(Clone)]
pub struct KnativeReceiverProvisioner {
    client: Client,
    image: String,
    resource: ApiResource,
}

impl KnativeReceiverProvisioner {
    /// Create a provisioner running `image` as the receive adapter.
    pub fn new(client: Client, image: impl Into<String>) -> Self {
        Self {
            client,
            image: image.into(),
            resource: knative_service_resource(),
        }
    }

    fn api(&self, namespace: &str) -> Api<DynamicObject> {
        Api::namespaced_with(self.client.clone(), namespace, &self.resource)
    }
}

fn receiver_error(action: &str, error: &kube::Error) -> ReceiverError {
    ReceiverError::new(format!("{action} receiver service: {error}"))
}

#[async_trait]
impl ReceiverProvisioner for KnativeReceiverProvisioner {
    async fn ensure(
        &self,
        declaration: &Declaration,
        sink_uri: &str,
    ) -> Result<ReceiverState, ReceiverError> {
        let key = declaration.key();
        let name = declaration.metadata.name.as_str();
        let api = self.api(&declaration.metadata.namespace);
        let desired = desired_service(declaration, sink_uri, &self.image)?;

        let service = match api
            .get_opt(name)
            .await
            .map_err(|e| receiver_error("get", &e))?
        {
            None => {
                info!(key = %key, image = %self.image, "Creating receiver service");
                api.create(&PostParams::default(), &desired)
                    .await
                    .map_err(|e| receiver_error("create", &e))?
            }
            Some(existing) if service_drifted(&existing, &desired) => {
                info!(key = %key, "Updating drifted receiver service");
                let patch = update_patch(&desired);
                api.patch(name, &PatchParams::default(), &Patch::Merge(&patch))
                    .await
                    .map_err(|e| receiver_error("update", &e))?
            }
            Some(existing) => existing,
        };

        Ok(match service_address(&service) {
            Some(address) => {
                debug!(key = %key, address = %address, "Receiver ready");
                ReceiverState::Ready { address }
            }
            None => ReceiverState::NotReady,
        })
    }
}
