mod common;

use common::{csv, harness, harness_with};
use mdsub_core::{EngineConfig, JobId, JobState, PoolError, SubmissionError, SubmissionPool};
use pretty_assertions::assert_eq;
use std::time::Duration;

const SUBJECT: &str = "type,submitter_id,projects.code,species\nsubject,SUBJ-1,BLGSP,Homo sapiens\n";

#[tokio::test]
async fn queued_job_completes() {
    let h = harness();
    let pool = SubmissionPool::new(h.engine.clone());

    let handle = pool.submit(csv(SUBJECT)).unwrap();
    let id = handle.id();
    let state = handle.wait().await.unwrap();

    match state {
        JobState::Completed(report) => assert!(report.success),
        other => panic!("unexpected state {other:?}"),
    }
    assert!(pool.status(id).unwrap().is_terminal());
    assert_eq!(pool.stats().completed, 1);
    assert_eq!(pool.purge_finished(), 1);
    assert_eq!(pool.status(id), None);
}

#[tokio::test]
async fn request_errors_become_failed_jobs() {
    let h = harness();
    let pool = SubmissionPool::new(h.engine.clone());

    let handle = pool
        .submit(csv(SUBJECT).with_mode(mdsub_core::CommitMode::Create))
        .unwrap();
    let bad = pool
        .submit(mdsub_core::SubmissionRequest::new(
            mdsub_model::ProjectScope::new("CGCI", "NOPE"),
            mdsub_test_utils::test_identity(),
            SUBJECT,
            "text/csv",
        ))
        .unwrap();

    assert!(matches!(handle.wait().await.unwrap(), JobState::Completed(_)));
    let state = pool.wait(bad.id()).await.unwrap();
    assert!(matches!(
        state.into_result(),
        Some(Err(SubmissionError::NotFound(_)))
    ));
}

#[tokio::test]
async fn queued_jobs_can_be_cancelled() {
    let h = harness_with(EngineConfig::default().with_worker_pool_size(1));
    h.store.set_commit_delay(Duration::from_millis(50));
    let pool = SubmissionPool::new(h.engine.clone());

    let running = pool.submit(csv(SUBJECT)).unwrap();
    let queued = pool.submit(csv(SUBJECT)).unwrap();
    pool.cancel(queued.id()).unwrap();

    assert_eq!(queued.wait().await.unwrap(), JobState::Cancelled);
    let id = running.id();
    assert!(matches!(running.wait().await.unwrap(), JobState::Completed(_)));
    assert_eq!(pool.cancel(id), Err(PoolError::NotCancellable(id)));
    assert_eq!(h.store.commit_count(), 1);
}

#[tokio::test]
async fn full_queue_rejects_new_jobs() {
    let h = harness_with(EngineConfig::default().with_queue_capacity(1));
    let pool = SubmissionPool::new(h.engine.clone());

    let first = pool.submit(csv(SUBJECT)).unwrap();
    assert_eq!(pool.submit(csv(SUBJECT)).unwrap_err(), PoolError::QueueFull(1));

    first.wait().await.unwrap();
    assert!(pool.submit(csv(SUBJECT)).is_ok());
}

#[tokio::test]
async fn unknown_jobs_are_reported() {
    let h = harness();
    let pool = SubmissionPool::new(h.engine.clone());
    let id = JobId::new();

    assert_eq!(pool.cancel(id), Err(PoolError::JobNotFound(id)));
    assert_eq!(pool.wait(id).await, Err(PoolError::JobNotFound(id)));
}
