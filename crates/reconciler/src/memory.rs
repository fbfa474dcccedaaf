//! In-memory collaborators for tests and local runs.
//!
//! They mimic the remote systems closely enough to exercise ordering: the
//! object store enforces resource versions and drops a deleted object once
//! its last finalizer is gone, the job client records every call and can
//! inject failures before or after a mutation lands.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::capability::{
    ExternalJobClient, ObjectStore, ReceiverProvisioner, ReceiverState, SinkResolver,
};
use crate::error::{JobClientError, ReceiverError, SinkError, StoreError};
use crate::job::{ExternalJob, JobName};
use crate::types::{Declaration, DeclarationSpec, ObjectKey, SinkReference};

/// In-memory object store with optimistic concurrency.
#[derive(Default)]
pub struct InMemoryObjectStore {
    objects: RwLock<HashMap<ObjectKey, Declaration>>,
    version: AtomicU64,
    updates: AtomicUsize,
    injected: RwLock<VecDeque<StoreError>>,
}

impl InMemoryObjectStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn next_version(&self) -> String {
        self.version.fetch_add(1, Ordering::SeqCst).to_string()
    }

    /// Store a declaration as a user would create it.
    pub async fn insert(&self, mut declaration: Declaration) -> Declaration {
        declaration.metadata.resource_version = Some(self.next_version());
        self.objects
            .write()
            .await
            .insert(declaration.key(), declaration.clone());
        declaration
    }

    /// Current stored copy.
    pub async fn get_stored(&self, key: &ObjectKey) -> Option<Declaration> {
        self.objects.read().await.get(key).cloned()
    }

    /// Replace the spec as a user edit would.
    pub async fn replace_spec(&self, key: &ObjectKey, spec: DeclarationSpec) {
        let version = self.next_version();
        if let Some(existing) = self.objects.write().await.get_mut(key) {
            existing.spec = spec;
            existing.metadata.resource_version = Some(version);
        }
    }

    /// Mark for deletion; objects without finalizers disappear at once.
    pub async fn request_deletion(&self, key: &ObjectKey) {
        let version = self.next_version();
        let mut objects = self.objects.write().await;
        let remove = match objects.get_mut(key) {
            Some(existing) if existing.metadata.finalizers.is_empty() => true,
            Some(existing) => {
                existing.metadata.deletion_requested = true;
                existing.metadata.resource_version = Some(version);
                false
            }
            None => false,
        };
        if remove {
            objects.remove(key);
        }
    }

    /// Make the next `update` fail with `error`.
    pub async fn fail_next_update(&self, error: StoreError) {
        self.injected.write().await.push_back(error);
    }

    /// Number of successful updates.
    pub async fn update_count(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn get(&self, key: &ObjectKey) -> Result<Option<Declaration>, StoreError> {
        Ok(self.objects.read().await.get(key).cloned())
    }

    async fn update(&self, declaration: &Declaration) -> Result<Declaration, StoreError> {
        if let Some(err) = self.injected.write().await.pop_front() {
            return Err(err);
        }

        let key = declaration.key();
        let mut objects = self.objects.write().await;
        let current = objects.get(&key).ok_or_else(|| StoreError::NotFound {
            key: key.to_string(),
        })?;

        if current.metadata.resource_version != declaration.metadata.resource_version {
            return Err(StoreError::conflict(key.to_string()));
        }

        let mut next = current.clone();
        next.status = declaration.status.clone();
        next.metadata.finalizers = declaration.metadata.finalizers.clone();
        next.metadata.resource_version = Some(self.next_version());
        self.updates.fetch_add(1, Ordering::SeqCst);

        if next.metadata.deletion_requested && next.metadata.finalizers.is_empty() {
            objects.remove(&key);
        } else {
            objects.insert(key, next.clone());
        }
        Ok(next)
    }
}

/// Scheduler operations, for call logs and fault injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobOp {
    Get,
    Create,
    Update,
    Delete,
}

impl JobOp {
    pub const fn is_mutation(self) -> bool {
        !matches!(self, Self::Get)
    }
}

/// One recorded scheduler call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobCall {
    pub op: JobOp,
    pub job: String,
    /// Job body sent with create and update.
    pub payload: Option<ExternalJob>,
}

#[derive(Debug, Clone)]
enum Fault {
    /// Fail without touching state.
    Reject(JobClientError),
    /// Apply the call, then lose the response.
    LoseResponse,
}

/// In-memory scheduler.
#[derive(Default)]
pub struct InMemoryJobClient {
    jobs: RwLock<HashMap<String, ExternalJob>>,
    calls: RwLock<Vec<JobCall>>,
    faults: RwLock<HashMap<JobOp, VecDeque<Fault>>>,
    latency: RwLock<Option<Duration>>,
}

impl InMemoryJobClient {
    /// Create an empty scheduler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Put a job in place as if created out of band.
    pub async fn seed(&self, job: ExternalJob) {
        self.jobs.write().await.insert(job.name.clone(), job);
    }

    /// Look up a job by full name.
    pub async fn job(&self, name: &str) -> Option<ExternalJob> {
        self.jobs.read().await.get(name).cloned()
    }

    /// Number of jobs that exist.
    pub async fn job_count(&self) -> usize {
        self.jobs.read().await.len()
    }

    /// Every call made so far.
    pub async fn calls(&self) -> Vec<JobCall> {
        self.calls.read().await.clone()
    }

    /// Number of create, update and delete calls made so far.
    pub async fn mutation_count(&self) -> usize {
        self.calls
            .read()
            .await
            .iter()
            .filter(|c| c.op.is_mutation())
            .count()
    }

    /// Reject the next `op` with `error`, leaving state untouched.
    pub async fn fail_next(&self, op: JobOp, error: JobClientError) {
        self.push_fault(op, Fault::Reject(error)).await;
    }

    /// Apply the next `op` but report a transport failure.
    pub async fn lose_next_response(&self, op: JobOp) {
        self.push_fault(op, Fault::LoseResponse).await;
    }

    /// Delay every call by `latency`.
    pub async fn set_latency(&self, latency: Duration) {
        *self.latency.write().await = Some(latency);
    }

    async fn push_fault(&self, op: JobOp, fault: Fault) {
        self.faults
            .write()
            .await
            .entry(op)
            .or_default()
            .push_back(fault);
    }

    /// Record the call and return the fault queued for it, if any.
    async fn begin(
        &self,
        op: JobOp,
        job: &str,
        payload: Option<&ExternalJob>,
    ) -> Option<Fault> {
        self.calls.write().await.push(JobCall {
            op,
            job: job.to_string(),
            payload: payload.cloned(),
        });

        let latency = *self.latency.read().await;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        self.faults
            .write()
            .await
            .get_mut(&op)
            .and_then(VecDeque::pop_front)
    }
}

fn lost_response() -> JobClientError {
    JobClientError::other("connection reset before response")
}

#[async_trait]
impl ExternalJobClient for InMemoryJobClient {
    async fn get(&self, name: &JobName) -> Result<ExternalJob, JobClientError> {
        let name = name.to_string();
        let fault = self.begin(JobOp::Get, &name, None).await;
        if let Some(Fault::Reject(err)) = fault {
            return Err(err);
        }
        let found = self.jobs.read().await.get(&name).cloned();
        match (found, fault) {
            (_, Some(_)) => Err(lost_response()),
            (Some(job), None) => Ok(job),
            (None, None) => Err(JobClientError::not_found(name)),
        }
    }

    async fn create(
        &self,
        name: &JobName,
        job: &ExternalJob,
    ) -> Result<ExternalJob, JobClientError> {
        let name = name.to_string();
        let fault = self.begin(JobOp::Create, &name, Some(job)).await;
        if let Some(Fault::Reject(err)) = fault {
            return Err(err);
        }

        let mut jobs = self.jobs.write().await;
        if jobs.contains_key(&name) {
            return Err(JobClientError::with_status(409, "job already exists"));
        }
        let created = ExternalJob {
            name: name.clone(),
            ..job.clone()
        };
        jobs.insert(name, created.clone());

        match fault {
            Some(_) => Err(lost_response()),
            None => Ok(created),
        }
    }

    async fn update(&self, job: &ExternalJob) -> Result<ExternalJob, JobClientError> {
        let fault = self.begin(JobOp::Update, &job.name, Some(job)).await;
        if let Some(Fault::Reject(err)) = fault {
            return Err(err);
        }

        let mut jobs = self.jobs.write().await;
        if !jobs.contains_key(&job.name) {
            return Err(JobClientError::not_found(&job.name));
        }
        jobs.insert(job.name.clone(), job.clone());

        match fault {
            Some(_) => Err(lost_response()),
            None => Ok(job.clone()),
        }
    }

    async fn delete(&self, name: &JobName) -> Result<(), JobClientError> {
        let name = name.to_string();
        let fault = self.begin(JobOp::Delete, &name, None).await;
        if let Some(Fault::Reject(err)) = fault {
            return Err(err);
        }

        let removed = self.jobs.write().await.remove(&name);
        match (removed, fault) {
            (_, Some(_)) => Err(lost_response()),
            (Some(_), None) => Ok(()),
            (None, None) => Err(JobClientError::not_found(name)),
        }
    }
}

/// Sink resolver backed by a fixed table of `(namespace, name) -> URL`.
#[derive(Default)]
pub struct StaticSinkResolver {
    sinks: RwLock<HashMap<(String, String), String>>,
    lookups: AtomicUsize,
}

impl StaticSinkResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish an address for `namespace/name`.
    pub async fn insert(&self, namespace: &str, name: &str, uri: &str) {
        self.sinks
            .write()
            .await
            .insert((namespace.to_string(), name.to_string()), uri.to_string());
    }

    /// Withdraw the address of `namespace/name`.
    pub async fn remove(&self, namespace: &str, name: &str) {
        self.sinks
            .write()
            .await
            .remove(&(namespace.to_string(), name.to_string()));
    }

    pub fn lookup_count(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SinkResolver for StaticSinkResolver {
    async fn resolve(
        &self,
        reference: &SinkReference,
        namespace: &str,
    ) -> Result<String, SinkError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        let namespace = reference.namespace_or(namespace);
        self.sinks
            .read()
            .await
            .get(&(namespace.to_string(), reference.name.clone()))
            .cloned()
            .ok_or_else(|| SinkError::not_resolved(reference.to_string(), "object not found"))
    }
}

/// Receiver provisioner reporting a fixed address.
#[derive(Default)]
pub struct StaticReceiverProvisioner {
    address: RwLock<Option<String>>,
    ensured: RwLock<Vec<(ObjectKey, String)>>,
    failure: RwLock<Option<ReceiverError>>,
}

impl StaticReceiverProvisioner {
    /// A provisioner whose receivers are ready at `address`.
    pub fn ready(address: &str) -> Self {
        Self {
            address: RwLock::new(Some(address.to_string())),
            ..Self::default()
        }
    }

    /// A provisioner whose receivers never get an address.
    pub fn not_ready() -> Self {
        Self::default()
    }

    pub async fn set_address(&self, address: Option<&str>) {
        *self.address.write().await = address.map(str::to_string);
    }

    /// Make the next `ensure` fail.
    pub async fn fail_next(&self, error: ReceiverError) {
        *self.failure.write().await = Some(error);
    }

    /// `(declaration, sink)` pairs receivers were ensured for.
    pub async fn ensured(&self) -> Vec<(ObjectKey, String)> {
        self.ensured.read().await.clone()
    }
}

#[async_trait]
impl ReceiverProvisioner for StaticReceiverProvisioner {
    async fn ensure(
        &self,
        declaration: &Declaration,
        sink_uri: &str,
    ) -> Result<ReceiverState, ReceiverError> {
        if let Some(err) = self.failure.write().await.take() {
            return Err(err);
        }
        self.ensured
            .write()
            .await
            .push((declaration.key(), sink_uri.to_string()));

        Ok(match self.address.read().await.clone() {
            Some(address) => ReceiverState::Ready { address },
            None => ReceiverState::NotReady,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DEFAULT_FINALIZER;

    type TestResult = std::result::Result<(), Box<dyn std::error::Error>>;

    fn decl() -> Declaration {
        Declaration::new("default", "a", DeclarationSpec::new("p", "l", "* * * * *"))
    }

    #[tokio::test]
    async fn test_store_rejects_stale_version() -> TestResult {
        let store = InMemoryObjectStore::new();
        let stale = store.insert(decl()).await;
        let mut fresh = stale.clone();
        fresh.status.sink_uri = "http://a/".to_string();
        store.update(&fresh).await?;

        let result = store.update(&stale).await;

        assert!(matches!(result, Err(StoreError::Conflict { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_store_drops_object_when_last_finalizer_released() -> TestResult {
        let store = InMemoryObjectStore::new();
        let mut d = decl();
        d.add_finalizer(DEFAULT_FINALIZER);
        store.insert(d).await;
        let key = ObjectKey::new("default", "a");
        store.request_deletion(&key).await;

        let mut deleting = store.get(&key).await?.ok_or("missing")?;
        assert!(deleting.is_deleting());
        deleting.remove_finalizer(DEFAULT_FINALIZER);
        store.update(&deleting).await?;

        assert!(store.get(&key).await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_lost_response_still_applies_create() -> TestResult {
        let client = InMemoryJobClient::new();
        let name = JobName::new("p", "l", "a");
        let job = ExternalJob::desired(&name, &decl().spec, "http://r/");
        client.lose_next_response(JobOp::Create).await;

        let result = client.create(&name, &job).await;

        assert!(result.is_err());
        assert!(client.job(&name.to_string()).await.is_some());
        assert!(client.create(&name, &job).await.is_err());
        Ok(())
    }

    #[tokio::test]
    async fn test_delete_missing_job_reports_not_found() {
        let client = InMemoryJobClient::new();
        let result = client.delete(&JobName::new("p", "l", "a")).await;
        assert!(result.is_err_and(|e| e.is_not_found()));
    }
}
