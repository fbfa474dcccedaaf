//! End-to-end reconcile scenarios against the in-memory collaborators.

use std::sync::Arc;

use cronsource_reconciler::memory::{
    InMemoryJobClient, InMemoryObjectStore, JobOp, StaticReceiverProvisioner, StaticSinkResolver,
};
use cronsource_reconciler::{
    DEFAULT_FINALIZER, Declaration, DeclarationSpec, DeclarationStatus, Error, ExternalJob,
    HttpMethod, JobAction, JobName, ObjectKey, ReconcileAction, Reconciler, ReconcilerBuilder,
    SinkError, SinkReference,
};

type TestResult = std::result::Result<(), Box<dyn std::error::Error>>;

const JOB: &str = "projects/p1/locations/us-central1/jobs/daily";

struct World {
    store: Arc<InMemoryObjectStore>,
    sinks: Arc<StaticSinkResolver>,
    jobs: Arc<InMemoryJobClient>,
    reconciler: Reconciler,
}

/// Receiver address equal to the sink, as in a direct wiring.
fn world() -> Result<World, Error> {
    let store = Arc::new(InMemoryObjectStore::new());
    let sinks = Arc::new(StaticSinkResolver::new());
    let receivers = Arc::new(StaticReceiverProvisioner::ready("https://svc-a.example/"));
    let jobs = Arc::new(InMemoryJobClient::new());
    let reconciler = ReconcilerBuilder::new()
        .with_store(store.clone())
        .with_sink_resolver(sinks.clone())
        .with_receivers(receivers)
        .with_job_client(jobs.clone())
        .build()?;
    Ok(World {
        store,
        sinks,
        jobs,
        reconciler,
    })
}

fn daily() -> Declaration {
    Declaration::new(
        "default",
        "daily",
        DeclarationSpec::new("p1", "us-central1", "0 9 * * *")
            .with_sink(SinkReference::new("serving.knative.dev/v1", "Service", "svc-a")),
    )
}

fn key() -> ObjectKey {
    ObjectKey::new("default", "daily")
}

#[tokio::test]
async fn create_scenario() -> TestResult {
    let w = world()?;
    w.sinks
        .insert("default", "svc-a", "https://svc-a.example/")
        .await;
    w.store.insert(daily()).await;

    w.reconciler.reconcile_key("default/daily").await?;

    let creates: Vec<_> = w
        .jobs
        .calls()
        .await
        .into_iter()
        .filter(|c| c.op == JobOp::Create)
        .collect();
    assert_eq!(creates.len(), 1);
    let sent = creates
        .first()
        .and_then(|c| c.payload.clone())
        .ok_or("create without payload")?;
    assert_eq!(sent.name, JOB);
    assert_eq!(sent.schedule, "0 9 * * *");
    assert_eq!(sent.time_zone, "UTC");
    assert_eq!(sent.target.http_method, HttpMethod::Post);
    assert_eq!(sent.target.uri, "https://svc-a.example/");

    let stored = w.store.get_stored(&key()).await.ok_or("declaration gone")?;
    assert_eq!(
        stored.status,
        DeclarationStatus {
            job: JOB.to_string(),
            sink_uri: "https://svc-a.example/".to_string(),
        }
    );
    Ok(())
}

#[tokio::test]
async fn unresolved_sink_scenario() -> TestResult {
    let w = world()?;
    w.store.insert(daily()).await;

    let err = w
        .reconciler
        .reconcile_key("default/daily")
        .await
        .err()
        .ok_or("expected failure")?;

    assert!(err.is_retryable());
    assert!(matches!(
        err,
        Error::Sink {
            source: SinkError::NotResolved { .. },
            ..
        }
    ));
    let stored = w.store.get_stored(&key()).await.ok_or("declaration gone")?;
    assert_eq!(stored.status, DeclarationStatus::default());
    assert!(w.jobs.calls().await.is_empty());
    Ok(())
}

#[tokio::test]
async fn delete_scenario() -> TestResult {
    let w = world()?;
    w.sinks
        .insert("default", "svc-a", "https://svc-a.example/")
        .await;
    w.store.insert(daily()).await;
    w.reconciler.reconcile_key("default/daily").await?;
    let calls_before = w.jobs.calls().await.len();

    w.store.request_deletion(&key()).await;
    let result = w.reconciler.reconcile_key("default/daily").await?;

    let calls = w.jobs.calls().await;
    let after: Vec<_> = calls.iter().skip(calls_before).collect();
    assert_eq!(after.len(), 1);
    assert!(after.iter().all(|c| c.op == JobOp::Delete && c.job == JOB));
    assert_eq!(result.action, ReconcileAction::Finalized);
    assert!(w.jobs.job(JOB).await.is_none());
    assert!(w.store.get_stored(&key()).await.is_none());

    // The object is gone; a redelivered key does nothing further.
    let again = w.reconciler.reconcile_key("default/daily").await?;
    assert_eq!(again.action, ReconcileAction::Missing);
    assert_eq!(w.jobs.calls().await.len(), calls.len());
    Ok(())
}

#[tokio::test]
async fn deleting_an_absent_job_still_releases_the_finalizer() -> TestResult {
    let w = world()?;
    let mut decl = daily();
    decl.add_finalizer(DEFAULT_FINALIZER);
    w.store.insert(decl).await;
    w.store.request_deletion(&key()).await;

    let result = w.reconciler.reconcile_key("default/daily").await?;

    assert_eq!(result.action, ReconcileAction::Finalized);
    assert!(w.store.get_stored(&key()).await.is_none());
    Ok(())
}

#[tokio::test]
async fn failed_delete_keeps_the_finalizer() -> TestResult {
    let w = world()?;
    w.sinks
        .insert("default", "svc-a", "https://svc-a.example/")
        .await;
    w.store.insert(daily()).await;
    w.reconciler.reconcile_key("default/daily").await?;
    w.store.request_deletion(&key()).await;
    w.jobs
        .fail_next(
            JobOp::Delete,
            cronsource_reconciler::JobClientError::with_status(500, "internal"),
        )
        .await;

    let err = w.reconciler.reconcile_key("default/daily").await.err();

    assert!(matches!(err, Some(Error::Job { op: "delete", .. })));
    let stored = w.store.get_stored(&key()).await.ok_or("declaration gone")?;
    assert!(stored.has_finalizer(DEFAULT_FINALIZER));
    assert!(w.jobs.job(JOB).await.is_some());

    w.reconciler.reconcile_key("default/daily").await?;
    assert!(w.store.get_stored(&key()).await.is_none());
    assert!(w.jobs.job(JOB).await.is_none());
    Ok(())
}

#[tokio::test]
async fn drift_correction_updates_schedule_only() -> TestResult {
    let w = world()?;
    w.sinks
        .insert("default", "svc-a", "https://svc-a.example/")
        .await;
    let mut existing = daily();
    existing.spec.schedule = "0 * * * *".to_string();
    let name = JobName::new("p1", "us-central1", "daily");
    w.jobs
        .seed(ExternalJob::desired(
            &name,
            &existing.spec,
            "https://svc-a.example/",
        ))
        .await;

    let mut decl = daily();
    decl.spec.schedule = "*/5 * * * *".to_string();
    w.store.insert(decl).await;

    let result = w.reconciler.reconcile_key("default/daily").await?;

    let mutations: Vec<_> = w
        .jobs
        .calls()
        .await
        .into_iter()
        .filter(|c| c.op.is_mutation())
        .collect();
    assert_eq!(mutations.len(), 1);
    let sent = mutations
        .first()
        .filter(|c| c.op == JobOp::Update)
        .and_then(|c| c.payload.clone())
        .ok_or("expected an update")?;
    assert_eq!(sent.schedule, "*/5 * * * *");
    assert_eq!(sent.time_zone, "UTC");
    assert_eq!(sent.target.http_method, HttpMethod::Post);
    assert!(sent.target.body.is_empty());
    assert!(matches!(
        result.action,
        ReconcileAction::Converged {
            job_action: JobAction::Updated { drift },
            ..
        } if drift.fields() == vec!["schedule"]
    ));
    Ok(())
}

#[tokio::test]
async fn repeated_passes_address_one_job() -> TestResult {
    let w = world()?;
    w.sinks
        .insert("default", "svc-a", "https://svc-a.example/")
        .await;
    w.store.insert(daily()).await;

    for _ in 0..3 {
        w.reconciler.reconcile_key("default/daily").await?;
    }

    assert_eq!(w.jobs.job_count().await, 1);
    assert!(w.jobs.calls().await.iter().all(|c| c.job == JOB));
    assert_eq!(w.jobs.mutation_count().await, 1);
    Ok(())
}

#[tokio::test]
async fn lost_create_response_is_recovered_on_retry() -> TestResult {
    let w = world()?;
    w.sinks
        .insert("default", "svc-a", "https://svc-a.example/")
        .await;
    w.store.insert(daily()).await;
    w.jobs.lose_next_response(JobOp::Create).await;

    let first = w.reconciler.reconcile_key("default/daily").await;
    assert!(first.is_err_and(|e| e.is_retryable()));
    let stored = w.store.get_stored(&key()).await.ok_or("declaration gone")?;
    assert!(stored.has_finalizer(DEFAULT_FINALIZER));
    assert!(stored.status.job.is_empty());

    let second = w.reconciler.reconcile_key("default/daily").await?;
    assert!(matches!(
        second.action,
        ReconcileAction::Converged {
            job_action: JobAction::Unchanged,
            ..
        }
    ));
    let stored = w.store.get_stored(&key()).await.ok_or("declaration gone")?;
    assert_eq!(stored.status.job, JOB);
    Ok(())
}

#[tokio::test]
async fn cancelled_pass_commits_nothing() -> TestResult {
    let w = world()?;
    w.sinks
        .insert("default", "svc-a", "https://svc-a.example/")
        .await;
    let mut decl = daily();
    decl.add_finalizer(DEFAULT_FINALIZER);
    w.store.insert(decl).await;

    let err = w
        .reconciler
        .reconcile_key_until("default/daily", std::future::ready(()))
        .await
        .err();

    assert!(matches!(err, Some(Error::Cancelled { .. })));
    assert_eq!(w.store.update_count().await, 0);
    assert!(w.jobs.calls().await.is_empty());
    Ok(())
}
