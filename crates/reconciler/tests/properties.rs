//! Property-based tests for orphan freedom using proptest.
//!
//! Properties verified:
//! - A scheduler job never exists without the finalizer on its declaration,
//!   whatever failures, cancellations or user edits interrupt a pass
//! - Once deletion is requested and failures stop, the job and the
//!   declaration both disappear

use std::sync::Arc;
use std::time::Duration;

use cronsource_reconciler::memory::{
    InMemoryJobClient, InMemoryObjectStore, JobOp, StaticReceiverProvisioner, StaticSinkResolver,
};
use cronsource_reconciler::{
    DEFAULT_FINALIZER, Declaration, DeclarationSpec, JobClientError, ObjectKey, Reconciler,
    ReconcilerBuilder, SinkReference, StoreError,
};
use proptest::prelude::*;

const JOB: &str = "projects/p1/locations/us-central1/jobs/daily";
const KEY: &str = "default/daily";

/// Where a pass is interrupted.
#[derive(Debug, Clone)]
enum Interruption {
    None,
    StoreWriteFails,
    CallRejected(JobOp),
    ResponseLost(JobOp),
    /// Abandon the pass after this many simulated seconds.
    Deadline(u64),
    /// The user edits the spec before the pass.
    Edit(SpecEdit),
}

/// User edits applied between passes.
#[derive(Debug, Clone, Copy)]
enum SpecEdit {
    ClearSchedule,
    RestoreSchedule,
    ChangeBody,
    ChangeMethod,
}

impl SpecEdit {
    fn apply(self, spec: &mut DeclarationSpec) {
        match self {
            Self::ClearSchedule => spec.schedule = String::new(),
            Self::RestoreSchedule => spec.schedule = "0 9 * * *".to_string(),
            Self::ChangeBody => {
                spec.body = Some(format!("{{\"edit\":{}}}", spec.body_bytes().len()));
            }
            Self::ChangeMethod => spec.http_method = Some("PUT".to_string()),
        }
    }
}

fn job_op() -> impl Strategy<Value = JobOp> {
    prop_oneof![
        Just(JobOp::Get),
        Just(JobOp::Create),
        Just(JobOp::Update),
        Just(JobOp::Delete),
    ]
}

fn spec_edit() -> impl Strategy<Value = SpecEdit> {
    prop_oneof![
        Just(SpecEdit::ClearSchedule),
        Just(SpecEdit::RestoreSchedule),
        Just(SpecEdit::ChangeBody),
        Just(SpecEdit::ChangeMethod),
    ]
}

fn interruption() -> impl Strategy<Value = Interruption> {
    prop_oneof![
        Just(Interruption::None),
        Just(Interruption::StoreWriteFails),
        job_op().prop_map(Interruption::CallRejected),
        job_op().prop_map(Interruption::ResponseLost),
        (0u64..4).prop_map(Interruption::Deadline),
        spec_edit().prop_map(Interruption::Edit),
    ]
}

struct World {
    store: Arc<InMemoryObjectStore>,
    jobs: Arc<InMemoryJobClient>,
    reconciler: Reconciler,
}

async fn world() -> Result<World, String> {
    let store = Arc::new(InMemoryObjectStore::new());
    let sinks = Arc::new(StaticSinkResolver::new());
    sinks.insert("default", "svc-a", "https://svc-a.example/").await;
    let jobs = Arc::new(InMemoryJobClient::new());
    jobs.set_latency(Duration::from_secs(1)).await;
    let reconciler = ReconcilerBuilder::new()
        .with_store(store.clone())
        .with_sink_resolver(sinks)
        .with_receivers(Arc::new(StaticReceiverProvisioner::ready(
            "daily.default.example.com",
        )))
        .with_job_client(jobs.clone())
        .build()
        .map_err(|e| e.to_string())?;

    store
        .insert(Declaration::new(
            "default",
            "daily",
            DeclarationSpec::new("p1", "us-central1", "0 9 * * *")
                .with_sink(SinkReference::new("serving.knative.dev/v1", "Service", "svc-a")),
        ))
        .await;

    Ok(World {
        store,
        jobs,
        reconciler,
    })
}

async fn interrupted_pass(w: &World, interruption: &Interruption) {
    let result = match interruption {
        Interruption::None => w.reconciler.reconcile_key(KEY).await,
        Interruption::StoreWriteFails => {
            w.store
                .fail_next_update(StoreError::backend("etcd unavailable"))
                .await;
            w.reconciler.reconcile_key(KEY).await
        }
        Interruption::CallRejected(op) => {
            w.jobs
                .fail_next(*op, JobClientError::with_status(503, "unavailable"))
                .await;
            w.reconciler.reconcile_key(KEY).await
        }
        Interruption::ResponseLost(op) => {
            w.jobs.lose_next_response(*op).await;
            w.reconciler.reconcile_key(KEY).await
        }
        Interruption::Deadline(secs) => {
            let deadline = Duration::from_secs(*secs) + Duration::from_millis(500);
            w.reconciler.reconcile_key_within(KEY, deadline).await
        }
        Interruption::Edit(edit) => {
            let key = ObjectKey::new("default", "daily");
            if let Some(mut current) = w.store.get_stored(&key).await {
                edit.apply(&mut current.spec);
                w.store.replace_spec(&key, current.spec).await;
            }
            w.reconciler.reconcile_key(KEY).await
        }
    };
    // Failures are expected here; only the reachable state matters.
    drop(result);
}

async fn check_orphan_free(w: &World, step: usize) -> Result<(), String> {
    if w.jobs.job(JOB).await.is_none() {
        return Ok(());
    }
    let guarded = w
        .store
        .get_stored(&ObjectKey::new("default", "daily"))
        .await
        .is_some_and(|d| d.has_finalizer(DEFAULT_FINALIZER));
    if guarded {
        Ok(())
    } else {
        Err(format!("job exists without finalizer after step {step}"))
    }
}

async fn run_history(history: Vec<Interruption>, delete_at: usize) -> Result<(), String> {
    let w = world().await?;
    let key = ObjectKey::new("default", "daily");

    for (step, interruption) in history.iter().enumerate() {
        if step == delete_at {
            w.store.request_deletion(&key).await;
        }
        interrupted_pass(&w, interruption).await;
        check_orphan_free(&w, step).await?;
    }

    w.store.request_deletion(&key).await;
    for _ in 0..24 {
        if w.store.get_stored(&key).await.is_none() {
            break;
        }
        drop(w.reconciler.reconcile_key(KEY).await);
        check_orphan_free(&w, history.len()).await?;
    }

    if w.store.get_stored(&key).await.is_some() {
        return Err("declaration never finalized".to_string());
    }
    if w.jobs.job(JOB).await.is_some() {
        return Err("job left behind after finalization".to_string());
    }
    Ok(())
}

// ==========================================================================
// PROPERTY: Orphan freedom
// ==========================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Property: an existing job always implies a finalizer on its
    /// declaration, and deletion eventually cleans both up.
    #[test]
    fn prop_job_never_outlives_finalizer(
        history in proptest::collection::vec(interruption(), 1..8),
        delete_at in 0usize..10,
    ) {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .start_paused(true)
            .build()
            .map_err(|e| TestCaseError::fail(e.to_string()))?;

        let outcome = rt.block_on(run_history(history, delete_at));
        prop_assert!(outcome.is_ok(), "{:?}", outcome);
    }
}

#[tokio::test(start_paused = true)]
async fn create_then_lost_delete_keeps_guard() -> Result<(), String> {
    run_history(
        vec![
            Interruption::None,
            Interruption::ResponseLost(JobOp::Delete),
            Interruption::None,
        ],
        1,
    )
    .await
}

#[tokio::test(start_paused = true)]
async fn schedule_cleared_before_delete_still_removes_job() -> Result<(), String> {
    run_history(
        vec![
            Interruption::None,
            Interruption::Edit(SpecEdit::ClearSchedule),
            Interruption::None,
        ],
        2,
    )
    .await
}
