//! Reconciler implementation.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::capability::{
    ExternalJobClient, ObjectStore, ReceiverProvisioner, ReceiverState, SinkResolver,
};
use crate::error::{Error, JobClientError, Result, SinkError};
use crate::job::{ExternalJob, JobName, receiver_target_url};
use crate::types::{
    DEFAULT_FINALIZER, Declaration, JobAction, ObjectKey, ReconcileAction, ReconcileResult,
};

/// Configuration for the reconciler.
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// Finalizer guarding external cleanup.
    pub finalizer: String,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            finalizer: DEFAULT_FINALIZER.to_string(),
        }
    }
}

/// Converges one declaration at a time against the scheduler and receiver.
///
/// Holds no per-object state; safe to share across keys. Callers must not run
/// two passes for the same key at once.
pub struct Reconciler {
    store: Arc<dyn ObjectStore>,
    sinks: Arc<dyn SinkResolver>,
    receivers: Arc<dyn ReceiverProvisioner>,
    jobs: Arc<dyn ExternalJobClient>,
    config: ReconcilerConfig,
}

impl Reconciler {
    /// Create a new reconciler.
    pub fn new(
        store: Arc<dyn ObjectStore>,
        sinks: Arc<dyn SinkResolver>,
        receivers: Arc<dyn ReceiverProvisioner>,
        jobs: Arc<dyn ExternalJobClient>,
        config: ReconcilerConfig,
    ) -> Self {
        Self {
            store,
            sinks,
            receivers,
            jobs,
            config,
        }
    }

    /// Run one pass for a `namespace/name` key.
    ///
    /// Malformed keys are logged and reported as skipped; there is nothing to
    /// retry for them.
    ///
    /// # Errors
    ///
    /// Any retryable failure of the pass, or a failure writing status back.
    pub async fn reconcile_key(&self, key: &str) -> Result<ReconcileResult> {
        let object_key = match ObjectKey::parse(key) {
            Ok(k) => k,
            Err(e) => {
                warn!(key = %key, error = %e, "Dropping malformed key");
                return Ok(ReconcileResult::new(
                    key,
                    ReconcileAction::Skipped {
                        reason: e.to_string(),
                    },
                    false,
                ));
            }
        };

        match self.store.get(&object_key).await? {
            Some(declaration) => self.reconcile(declaration).await,
            None => {
                info!(key = %key, "Declaration no longer exists");
                Ok(ReconcileResult::new(key, ReconcileAction::Missing, false))
            }
        }
    }

    /// Run one pass, abandoning it when `cancel` completes first.
    ///
    /// An abandoned pass never commits status.
    ///
    /// # Errors
    ///
    /// [`Error::Cancelled`] on cancellation, otherwise as [`Self::reconcile_key`].
    pub async fn reconcile_key_until<F>(&self, key: &str, cancel: F) -> Result<ReconcileResult>
    where
        F: Future<Output = ()> + Send,
    {
        tokio::select! {
            biased;
            () = cancel => {
                warn!(key = %key, "Reconcile cancelled");
                Err(Error::cancelled(key))
            }
            result = self.reconcile_key(key) => result,
        }
    }

    /// Run one pass with a deadline.
    ///
    /// # Errors
    ///
    /// As [`Self::reconcile_key_until`].
    pub async fn reconcile_key_within(
        &self,
        key: &str,
        deadline: Duration,
    ) -> Result<ReconcileResult> {
        self.reconcile_key_until(key, tokio::time::sleep(deadline))
            .await
    }

    /// Run one pass for an already loaded declaration.
    ///
    /// # Errors
    ///
    /// As [`Self::reconcile_key`].
    pub async fn reconcile(&self, original: Declaration) -> Result<ReconcileResult> {
        let key = original.key().to_string();
        let finalizer = self.config.finalizer.as_str();

        // The finalizer is persisted before anything external happens so a
        // job can never exist without it.
        let snapshot = if !original.is_deleting() && !original.has_finalizer(finalizer) {
            let mut marked = original;
            marked.add_finalizer(finalizer);
            info!(key = %key, finalizer = %finalizer, "Attaching finalizer");
            self.store.update(&marked).await?
        } else {
            original
        };

        let mut working = snapshot.clone();
        let outcome = self.converge(&mut working).await;

        let status_written = if working.needs_write(&snapshot) {
            if let Err(e) = self.store.update(&working).await {
                warn!(key = %key, error = %e, "Failed to write status");
                return Err(e.into());
            }
            true
        } else {
            false
        };

        match outcome {
            Ok(action) => {
                info!(key = %key, action = %action.description(), status_written, "Reconciled");
                Ok(ReconcileResult::new(key, action, status_written))
            }
            Err(e) => {
                info!(key = %key, error = %e, status_written, "Reconcile incomplete");
                Err(e)
            }
        }
    }

    /// The convergence algorithm; mutates only `declaration`'s status and
    /// finalizers.
    async fn converge(&self, declaration: &mut Declaration) -> Result<ReconcileAction> {
        let key = declaration.key().to_string();

        if declaration.is_deleting() {
            self.finalize(declaration).await?;
            return Ok(ReconcileAction::Finalized);
        }

        declaration.add_finalizer(&self.config.finalizer);
        declaration.validate()?;

        let sink_uri = self.resolve_sink(declaration).await?;
        info!(key = %key, sink_uri = %sink_uri, "Resolved sink");
        declaration.status.sink_uri.clone_from(&sink_uri);

        let address = match self
            .receivers
            .ensure(declaration, &sink_uri)
            .await
            .map_err(|e| Error::receiver(&key, e))?
        {
            ReceiverState::Ready { address } => address,
            ReceiverState::NotReady => {
                info!(key = %key, "Receiver has no address yet");
                return Err(Error::receiver_not_ready(&key));
            }
        };

        let target = receiver_target_url(&address);
        debug!(key = %key, target_uri = %target, "Using receiver as job target");

        let job_name = declaration.job_name();
        let desired = declaration.desired_job(&target);
        let (job, job_action) = self.converge_job(&job_name, desired).await?;

        declaration.status.job = if job.name.is_empty() {
            job_name.to_string()
        } else {
            job.name
        };

        Ok(ReconcileAction::Converged {
            job: declaration.status.job.clone(),
            job_action,
        })
    }

    async fn resolve_sink(&self, declaration: &Declaration) -> Result<String> {
        let key = declaration.key().to_string();
        let reference = declaration
            .spec
            .sink
            .as_ref()
            .ok_or_else(|| Error::sink(&key, SinkError::MissingReference))?;

        self.sinks
            .resolve(reference, &declaration.metadata.namespace)
            .await
            .map_err(|e| {
                info!(key = %key, sink = %reference, error = %e, "Sink not resolved");
                Error::sink(&key, e)
            })
    }

    /// Read-compare-write of the scheduler job.
    async fn converge_job(
        &self,
        name: &JobName,
        desired: ExternalJob,
    ) -> Result<(ExternalJob, JobAction)> {
        match self.jobs.get(name).await {
            Ok(existing) => {
                let drift = desired.drift(&existing);
                if drift.is_empty() {
                    debug!(job = %name, "Job up to date");
                    return Ok((existing, JobAction::Unchanged));
                }
                info!(job = %name, fields = ?drift.fields(), "Updating drifted job");
                let updated = self
                    .jobs
                    .update(&desired)
                    .await
                    .map_err(|e| Error::job("update", name.to_string(), e))?;
                Ok((updated, JobAction::Updated { drift }))
            }
            Err(JobClientError::NotFound { .. }) => {
                info!(job = %name, "Creating job");
                let created = self
                    .jobs
                    .create(name, &desired)
                    .await
                    .map_err(|e| Error::job("create", name.to_string(), e))?;
                Ok((created, JobAction::Created))
            }
            Err(e) => Err(Error::job("get", name.to_string(), e)),
        }
    }

    /// Delete the job, then release the finalizer.
    ///
    /// The finalizer stays whenever deletion fails, blocking removal of the
    /// declaration until cleanup succeeds.
    async fn finalize(&self, declaration: &mut Declaration) -> Result<()> {
        let key = declaration.key().to_string();

        if declaration.addresses_job() {
            let name = declaration.job_name();
            match self.jobs.delete(&name).await {
                Ok(()) => info!(key = %key, job = %name, "Deleted job"),
                Err(JobClientError::NotFound { .. }) => {
                    info!(key = %key, job = %name, "Job already absent");
                }
                Err(e) => {
                    warn!(key = %key, job = %name, error = %e, "Unable to delete job");
                    return Err(Error::job("delete", name.to_string(), e));
                }
            }
        } else {
            // Without project and location there is no job name to delete.
            debug!(key = %key, "No project or location, no job to delete");
        }

        if declaration.remove_finalizer(&self.config.finalizer) {
            info!(key = %key, "Released finalizer");
        }
        Ok(())
    }

    /// Get the configuration.
    pub const fn config(&self) -> &ReconcilerConfig {
        &self.config
    }
}

/// Builder for Reconciler.
#[derive(Default)]
pub struct ReconcilerBuilder {
    store: Option<Arc<dyn ObjectStore>>,
    sinks: Option<Arc<dyn SinkResolver>>,
    receivers: Option<Arc<dyn ReceiverProvisioner>>,
    jobs: Option<Arc<dyn ExternalJobClient>>,
    config: ReconcilerConfig,
}

impl ReconcilerBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the object store.
    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn ObjectStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Set the sink resolver.
    #[must_use]
    pub fn with_sink_resolver(mut self, sinks: Arc<dyn SinkResolver>) -> Self {
        self.sinks = Some(sinks);
        self
    }

    /// Set the receiver provisioner.
    #[must_use]
    pub fn with_receivers(mut self, receivers: Arc<dyn ReceiverProvisioner>) -> Self {
        self.receivers = Some(receivers);
        self
    }

    /// Set the scheduler job client.
    #[must_use]
    pub fn with_job_client(mut self, jobs: Arc<dyn ExternalJobClient>) -> Self {
        self.jobs = Some(jobs);
        self
    }

    /// Set the configuration.
    #[must_use]
    pub fn with_config(mut self, config: ReconcilerConfig) -> Self {
        self.config = config;
        self
    }

    /// Override the finalizer name.
    #[must_use]
    pub fn finalizer(mut self, finalizer: impl Into<String>) -> Self {
        self.config.finalizer = finalizer.into();
        self
    }

    /// Build the reconciler.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidConfig`] when a collaborator is missing or the
    /// finalizer name is empty.
    pub fn build(self) -> Result<Reconciler> {
        if self.config.finalizer.trim().is_empty() {
            return Err(Error::invalid_config("finalizer name must not be empty"));
        }
        let store = self
            .store
            .ok_or_else(|| Error::invalid_config("object store is required"))?;
        let sinks = self
            .sinks
            .ok_or_else(|| Error::invalid_config("sink resolver is required"))?;
        let receivers = self
            .receivers
            .ok_or_else(|| Error::invalid_config("receiver provisioner is required"))?;
        let jobs = self
            .jobs
            .ok_or_else(|| Error::invalid_config("job client is required"))?;

        Ok(Reconciler::new(store, sinks, receivers, jobs, self.config))
    }
}
