//! Object store backed by the Kubernetes API.

use async_trait::async_trait;
use cronsource_reconciler::{Declaration, ObjectKey, ObjectStore, StoreError};
use kube::Client;
use kube::api::{Api, Patch, PatchParams};
use serde_json::json;
use tracing::debug;

use crate::crd::{CloudSchedulerSource, CloudSchedulerSourceStatus};
use crate::error::api_status;

/// Reads and conditionally writes `CloudSchedulerSource` objects.
///
/// Writes are JSON merge patches carrying `metadata.resourceVersion`, so the
/// API server rejects them with 409 when the object moved on.
#[derive(Clone)]
pub struct KubeObjectStore {
    client: Client,
}

impl KubeObjectStore {
    pub const fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, namespace: &str) -> Api<CloudSchedulerSource> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

fn store_error(key: &ObjectKey, error: kube::Error) -> StoreError {
    match api_status(&error) {
        Some(409) => StoreError::conflict(key.to_string()),
        Some(404) => StoreError::NotFound {
            key: key.to_string(),
        },
        _ => StoreError::backend(error.to_string()),
    }
}

fn to_declaration(source: &CloudSchedulerSource) -> Result<Declaration, StoreError> {
    source
        .to_declaration()
        .map_err(|e| StoreError::backend(e.to_string()))
}

/// Merge patch replacing the finalizer list, conditional on `resource_version`.
pub fn finalizer_patch(declaration: &Declaration) -> serde_json::Value {
    json!({
        "metadata": {
            "resourceVersion": declaration.metadata.resource_version,
            "finalizers": declaration.metadata.finalizers,
        }
    })
}

/// Merge patch for the status subresource, conditional on `resource_version`.
pub fn status_patch(declaration: &Declaration, resource_version: Option<&str>) -> serde_json::Value {
    json!({
        "metadata": { "resourceVersion": resource_version },
        "status": CloudSchedulerSourceStatus::from(&declaration.status),
    })
}

#[async_trait]
impl ObjectStore for KubeObjectStore {
    async fn get(&self, key: &ObjectKey) -> Result<Option<Declaration>, StoreError> {
        let found = self
            .api(&key.namespace)
            .get_opt(&key.name)
            .await
            .map_err(|e| store_error(key, e))?;
        found.as_ref().map(to_declaration).transpose()
    }

    async fn update(&self, declaration: &Declaration) -> Result<Declaration, StoreError> {
        let key = declaration.key();
        let api = self.api(&key.namespace);
        let params = PatchParams::default();

        let patched = api
            .patch(
                &key.name,
                &params,
                &Patch::Merge(finalizer_patch(declaration)),
            )
            .await
            .map_err(|e| store_error(&key, e))?;

        // Releasing the last finalizer lets the API server remove the object.
        if declaration.is_deleting() && declaration.metadata.finalizers.is_empty() {
            debug!(key = %key, "Finalizers released");
            return to_declaration(&patched);
        }

        let patched = api
            .patch_status(
                &key.name,
                &params,
                &Patch::Merge(status_patch(
                    declaration,
                    patched.metadata.resource_version.as_deref(),
                )),
            )
            .await
            .map_err(|e| store_error(&key, e))?;

        debug!(
            key = %key,
            resource_version = ?patched.metadata.resource_version,
            "Wrote status"
        );
        to_declaration(&patched)
    }
}
