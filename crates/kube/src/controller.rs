//! `kube::runtime::Controller` wiring for CloudSchedulerSource.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use cronsource_reconciler::{ReconcileAction, Reconciler};
use futures::StreamExt;
use kube::api::{Api, DynamicObject};
use kube::runtime::controller::{self, Action, Controller};
use kube::runtime::watcher;
use kube::{Client, ResourceExt};
use tracing::{debug, info, warn};

use crate::crd::CloudSchedulerSource;
use crate::error::{Error, Result};
use crate::receiver::knative_service_resource;

/// Runtime knobs of the controller loop.
#[derive(Debug, Clone)]
pub struct ControllerSettings {
    /// Watch one namespace, or all when `None`.
    pub namespace: Option<String>,
    /// Concurrent reconciles across different keys.
    pub concurrency: u16,
    /// Resync interval for converged objects.
    pub requeue: Duration,
    /// Delay before retrying a failed pass.
    pub error_backoff: Duration,
    /// Upper bound on a single pass.
    pub pass_timeout: Duration,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            namespace: None,
            concurrency: 2,
            requeue: Duration::from_secs(300),
            error_backoff: Duration::from_secs(30),
            pass_timeout: Duration::from_secs(60),
        }
    }
}

/// State shared by every reconcile call.
pub struct Context {
    reconciler: Reconciler,
    settings: ControllerSettings,
}

impl Context {
    pub const fn new(reconciler: Reconciler, settings: ControllerSettings) -> Self {
        Self {
            reconciler,
            settings,
        }
    }
}

/// Store key of an object.
///
/// # Errors
///
/// When the object has no namespace.
pub fn object_key(source: &CloudSchedulerSource) -> Result<String> {
    let namespace = source
        .namespace()
        .ok_or(Error::MissingObjectKey(".metadata.namespace"))?;
    Ok(format!("{namespace}/{}", source.name_any()))
}

/// What to do after a successful pass.
pub fn next_action(action: &ReconcileAction, settings: &ControllerSettings) -> Action {
    match action {
        ReconcileAction::Converged { .. } => Action::requeue(settings.requeue),
        ReconcileAction::Finalized | ReconcileAction::Missing | ReconcileAction::Skipped { .. } => {
            Action::await_change()
        }
    }
}

/// Reconcile one CloudSchedulerSource.
///
/// # Errors
///
/// Any failure of the pass; the error policy decides on requeueing.
pub async fn reconcile(source: Arc<CloudSchedulerSource>, ctx: Arc<Context>) -> Result<Action> {
    let key = object_key(&source)?;
    let result = ctx
        .reconciler
        .reconcile_key_within(&key, ctx.settings.pass_timeout)
        .await?;
    debug!(key = %key, action = %result.action.description(), "Pass complete");
    Ok(next_action(&result.action, &ctx.settings))
}

/// Requeue retryable failures with backoff; wait for a change otherwise.
pub fn error_policy(source: Arc<CloudSchedulerSource>, error: &Error, ctx: Arc<Context>) -> Action {
    let name = source.name_any();
    if error.is_retryable() {
        warn!(name = %name, error = %error, "Reconcile failed, retrying");
        Action::requeue(ctx.settings.error_backoff)
    } else {
        warn!(name = %name, error = %error, "Reconcile failed permanently");
        Action::await_change()
    }
}

/// Watch CloudSchedulerSources and their receiver services until `shutdown`
/// completes.
pub async fn run<F>(client: Client, reconciler: Reconciler, settings: ControllerSettings, shutdown: F)
where
    F: Future<Output = ()> + Send + Sync + 'static,
{
    let services_resource = knative_service_resource();
    let (sources, services) = match settings.namespace.as_deref() {
        Some(ns) => (
            Api::<CloudSchedulerSource>::namespaced(client.clone(), ns),
            Api::<DynamicObject>::namespaced_with(client, ns, &services_resource),
        ),
        None => (
            Api::<CloudSchedulerSource>::all(client.clone()),
            Api::<DynamicObject>::all_with(client, &services_resource),
        ),
    };

    info!(
        namespace = settings.namespace.as_deref().unwrap_or("*"),
        concurrency = settings.concurrency,
        "Starting CloudSchedulerSource controller"
    );

    let config = controller::Config::default().concurrency(settings.concurrency);
    let ctx = Arc::new(Context::new(reconciler, settings));

    Controller::new(sources, watcher::Config::default())
        .owns_with(services, services_resource, watcher::Config::default())
        .with_config(config)
        .graceful_shutdown_on(shutdown)
        .run(reconcile, error_policy, ctx)
        .for_each(|res| async move {
            match res {
                Ok((obj, _)) => debug!(object = %obj, "Reconciled"),
                Err(e) => debug!(error = %e, "Reconcile error"),
            }
        })
        .await;

    info!("Controller terminated");
}
