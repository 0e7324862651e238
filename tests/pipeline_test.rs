//! End-to-end pipeline runs through the trigger processor.
//!
//! Each test submits a recording, scripts executor failures, drains the
//! trigger queue, and checks the job and its step history.

mod common;

use common::TestHarness;
use rf_core::events::EventPayload;
use rf_core::{Error, ErrorKind, JobStatus, Stage, StepStatus};
use rf_db::queries::{now_ms, triggers};
use rf_pipeline::Outcome;
use rf_store::keys;

// ---------------------------------------------------------------------------
// Happy path
// ---------------------------------------------------------------------------

#[tokio::test]
async fn all_stages_succeed_first_try() {
    let harness = TestHarness::new();
    let job = harness.submit().await;

    assert_eq!(harness.drain().await, 4);

    let done = harness.job(job.id);
    assert_eq!(done.status, JobStatus::Succeeded);
    assert_eq!(done.current_stage, Stage::Analyze);
    assert!(done.error_message.is_none());
    assert!(done.completed_at.is_some());
    assert!(done.locked_by.is_none());

    let history = harness.steps(job.id);
    let stages: Vec<Stage> = history.iter().map(|s| s.stage).collect();
    assert_eq!(stages, Stage::ALL.to_vec());
    for step in &history {
        assert_eq!(step.status, StepStatus::Succeeded);
        assert_eq!(step.attempt, 1);
        assert_eq!(step.retry_round, 1);
        assert_eq!(
            step.output_ref.as_deref(),
            Some(keys::stage_output(job.id, step.stage).as_str())
        );
        assert!(step.finished_at.is_some());
    }

    // Every stage consumes the previous stage's output.
    assert_eq!(harness.executor(Stage::Convert).inputs(), vec![job.upload_ref.clone()]);
    for stage in [Stage::ExtractAudio, Stage::Transcribe, Stage::Analyze] {
        let prev = Stage::ALL[stage.index() - 1];
        assert_eq!(
            harness.executor(stage).inputs(),
            vec![keys::stage_output(job.id, prev)]
        );
    }
}

#[tokio::test]
async fn submit_twice_reuses_job() {
    let harness = TestHarness::new();
    let job = harness.submit().await;

    let (again, created) = harness
        .ctx
        .orchestrator
        .submit(job.recording_id, &job.upload_ref)
        .await
        .unwrap();
    assert!(!created);
    assert_eq!(again.id, job.id);

    assert_eq!(harness.drain().await, 4);
    assert_eq!(harness.executor(Stage::Convert).calls(), 1);
}

// ---------------------------------------------------------------------------
// Failures and retries
// ---------------------------------------------------------------------------

#[tokio::test]
async fn transient_failure_recovers() {
    let harness = TestHarness::new();
    harness
        .executor(Stage::Convert)
        .fail_next(&[ErrorKind::ExternalServiceTransient]);
    let job = harness.submit().await;

    assert_eq!(harness.drain().await, 5);
    assert_eq!(harness.job(job.id).status, JobStatus::Succeeded);

    let convert = harness.stage_steps(job.id, Stage::Convert);
    assert_eq!(convert.len(), 2);
    assert_eq!(convert[0].attempt, 1);
    assert_eq!(convert[0].status, StepStatus::Failed);
    assert_eq!(convert[0].error_kind, Some(ErrorKind::ExternalServiceTransient));
    assert_eq!(convert[1].attempt, 2);
    assert_eq!(convert[1].status, StepStatus::Succeeded);
    assert_eq!(harness.executor(Stage::Convert).calls(), 2);
}

#[tokio::test]
async fn fatal_failure_stops_the_job() {
    let harness = TestHarness::new();
    harness
        .executor(Stage::Transcribe)
        .fail_next(&[ErrorKind::ExternalServiceFatal]);
    let job = harness.submit().await;

    assert_eq!(harness.drain().await, 3);

    let failed = harness.job(job.id);
    assert_eq!(failed.status, JobStatus::Failed);
    assert_eq!(failed.current_stage, Stage::Transcribe);
    let message = failed.error_message.unwrap();
    assert!(message.starts_with("transcribe failed after 1 attempt(s)"), "{message}");
    assert!(message.contains("HTTP 400"), "{message}");

    let transcribe = harness.stage_steps(job.id, Stage::Transcribe);
    assert_eq!(transcribe.len(), 1);
    assert_eq!(transcribe[0].error_kind, Some(ErrorKind::ExternalServiceFatal));
    assert_eq!(harness.executor(Stage::Analyze).calls(), 0);
    assert_eq!(triggers::count_pending(&harness.conn()).unwrap(), 0);
}

#[tokio::test]
async fn retries_stop_at_max_attempts() {
    let harness = TestHarness::new();
    harness.executor(Stage::ExtractAudio).fail_next(&[
        ErrorKind::TransientInfra,
        ErrorKind::TransientInfra,
        ErrorKind::TransientInfra,
    ]);
    let job = harness.submit().await;

    assert_eq!(harness.drain().await, 4);

    let failed = harness.job(job.id);
    assert_eq!(failed.status, JobStatus::Failed);
    assert!(failed
        .error_message
        .unwrap()
        .starts_with("extract_audio failed after 3 attempt(s)"));

    let attempts: Vec<u32> = harness
        .stage_steps(job.id, Stage::ExtractAudio)
        .iter()
        .map(|s| s.attempt)
        .collect();
    assert_eq!(attempts, vec![1, 2, 3]);
    assert_eq!(harness.executor(Stage::Transcribe).calls(), 0);
}

#[tokio::test]
async fn validation_failure_is_not_retried() {
    let harness = TestHarness::new();
    harness
        .executor(Stage::Convert)
        .fail_next(&[ErrorKind::ValidationError]);
    let job = harness.submit().await;

    assert_eq!(harness.drain().await, 1);
    assert_eq!(harness.job(job.id).status, JobStatus::Failed);
    assert_eq!(harness.executor(Stage::Convert).calls(), 1);
}

// ---------------------------------------------------------------------------
// Redelivery
// ---------------------------------------------------------------------------

#[tokio::test]
async fn redelivery_after_success_changes_nothing() {
    let harness = TestHarness::new();
    let job = harness.submit().await;
    harness.drain().await;
    let before = harness.steps(job.id).len();

    for stage in Stage::ALL {
        let outcome = harness.ctx.orchestrator.advance(job.id, stage, None).await.unwrap();
        assert_eq!(outcome, Outcome::Discarded);
    }
    {
        let conn = harness.conn();
        triggers::enqueue(&conn, job.id, Stage::Analyze, Some(1), now_ms()).unwrap();
    }
    assert_eq!(harness.drain().await, 1);

    assert_eq!(harness.steps(job.id).len(), before);
    assert_eq!(harness.job(job.id).status, JobStatus::Succeeded);
    for stage in Stage::ALL {
        assert_eq!(harness.executor(stage).calls(), 1);
    }
}

#[tokio::test]
async fn redelivery_after_failure_changes_nothing() {
    let harness = TestHarness::new();
    harness
        .executor(Stage::Convert)
        .fail_next(&[ErrorKind::ExternalServiceFatal]);
    let job = harness.submit().await;
    harness.drain().await;

    let outcome = harness
        .ctx
        .orchestrator
        .advance(job.id, Stage::Convert, Some(1))
        .await
        .unwrap();
    assert_eq!(outcome, Outcome::Discarded);
    assert_eq!(harness.executor(Stage::Convert).calls(), 1);
    assert_eq!(harness.job(job.id).status, JobStatus::Failed);
}

// ---------------------------------------------------------------------------
// Manual retry
// ---------------------------------------------------------------------------

#[tokio::test]
async fn manual_retry_resumes_at_failed_stage() {
    let harness = TestHarness::new();
    harness
        .executor(Stage::Transcribe)
        .fail_next(&[ErrorKind::ExternalServiceFatal]);
    let job = harness.submit().await;
    harness.drain().await;
    assert_eq!(harness.job(job.id).status, JobStatus::Failed);

    let reopened = harness.ctx.orchestrator.retry_job(job.id).await.unwrap();
    assert_eq!(reopened.status, JobStatus::Running);
    assert_eq!(reopened.retry_round, 2);
    assert!(reopened.error_message.is_none());

    assert_eq!(harness.drain().await, 2);
    assert_eq!(harness.job(job.id).status, JobStatus::Succeeded);

    // Earlier stages are not run again.
    assert_eq!(harness.executor(Stage::Convert).calls(), 1);
    assert_eq!(harness.executor(Stage::ExtractAudio).calls(), 1);

    let transcribe = harness.stage_steps(job.id, Stage::Transcribe);
    assert_eq!(transcribe.len(), 2);
    assert_eq!((transcribe[0].retry_round, transcribe[0].attempt), (1, 1));
    assert_eq!(transcribe[0].status, StepStatus::Failed);
    assert_eq!((transcribe[1].retry_round, transcribe[1].attempt), (2, 1));
    assert_eq!(transcribe[1].status, StepStatus::Succeeded);
}

#[tokio::test]
async fn manual_retry_rejects_live_job() {
    let harness = TestHarness::new();
    let job = harness.submit().await;

    let err = harness.ctx.orchestrator.retry_job(job.id).await.unwrap_err();
    assert!(matches!(err, Error::Conflict(_)));
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

#[tokio::test]
async fn events_follow_the_job() {
    let harness = TestHarness::new();
    harness
        .executor(Stage::Analyze)
        .fail_next(&[ErrorKind::ExternalServiceTransient]);
    let job = harness.submit().await;
    harness.drain().await;

    // Oldest first.
    let mut events = harness.ctx.event_bus.recent_for_job(job.id);
    events.reverse();
    assert!(matches!(events.first().map(|e| &e.payload), Some(EventPayload::JobQueued { .. })));
    assert!(matches!(events.last().map(|e| &e.payload), Some(EventPayload::JobSucceeded { .. })));

    let retries: Vec<(Stage, u32)> = events
        .iter()
        .filter_map(|e| match &e.payload {
            EventPayload::StageRetryScheduled { stage, attempt, .. } => Some((*stage, *attempt)),
            _ => None,
        })
        .collect();
    assert_eq!(retries, vec![(Stage::Analyze, 2)]);

    let progress: Vec<f32> = events
        .iter()
        .filter_map(|e| match &e.payload {
            EventPayload::StageSucceeded { progress, .. } => Some(*progress),
            _ => None,
        })
        .collect();
    assert_eq!(progress, vec![0.25, 0.5, 0.75, 1.0]);
}
