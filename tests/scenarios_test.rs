//! The five reference runs of the pipeline: happy path, transient recovery,
//! fatal failure, duplicate delivery, and exhausted retries.

mod common;

use std::time::Duration;

use common::TestHarness;
use rf_core::{ErrorKind, JobStatus, Stage, StepStatus};
use rf_pipeline::Outcome;

fn statuses(harness: &TestHarness, job_id: rf_core::JobId, stage: Stage) -> Vec<StepStatus> {
    harness
        .stage_steps(job_id, stage)
        .iter()
        .map(|s| s.status)
        .collect()
}

#[tokio::test]
async fn scenario_a_happy_path() {
    let harness = TestHarness::new();
    let job = harness.submit().await;

    harness.drain().await;

    assert_eq!(harness.job(job.id).status, JobStatus::Succeeded);
    let history = harness.steps(job.id);
    assert_eq!(history.len(), 4);
    assert!(history.iter().all(|s| s.status == StepStatus::Succeeded));
}

#[tokio::test]
async fn scenario_b_transient_recovery() {
    let harness = TestHarness::new();
    harness.executor(Stage::Convert).fail_next(&[
        ErrorKind::ExternalServiceTransient,
        ErrorKind::ExternalServiceTransient,
    ]);
    let job = harness.submit().await;

    // Two failures and the success of Convert, then the job moves on.
    for _ in 0..3 {
        rf_worker::processor::process_next_trigger(&harness.ctx, "w1")
            .await
            .unwrap();
    }
    assert_eq!(
        statuses(&harness, job.id, Stage::Convert),
        vec![StepStatus::Failed, StepStatus::Failed, StepStatus::Succeeded]
    );
    let job_now = harness.job(job.id);
    assert_eq!(job_now.status, JobStatus::Running);
    assert_eq!(job_now.current_stage, Stage::ExtractAudio);

    harness.drain().await;
    assert_eq!(harness.job(job.id).status, JobStatus::Succeeded);
}

#[tokio::test]
async fn scenario_c_fatal_failure() {
    let harness = TestHarness::new();
    harness
        .executor(Stage::Analyze)
        .fail_next(&[ErrorKind::ExternalServiceFatal]);
    let job = harness.submit().await;

    harness.drain().await;

    let failed = harness.job(job.id);
    assert_eq!(failed.status, JobStatus::Failed);
    assert!(failed.error_message.is_some());
    assert_eq!(statuses(&harness, job.id, Stage::Analyze), vec![StepStatus::Failed]);
    for stage in [Stage::Convert, Stage::ExtractAudio, Stage::Transcribe] {
        assert_eq!(statuses(&harness, job.id, stage), vec![StepStatus::Succeeded]);
    }
    assert!(harness
        .steps(job.id)
        .iter()
        .all(|s| s.status != StepStatus::Running));
}

#[tokio::test]
async fn scenario_d_duplicate_delivery() {
    let harness = TestHarness::new();
    harness
        .executor(Stage::Transcribe)
        .set_delay(Duration::from_millis(50));
    let job = harness.submit().await;

    let orchestrator = &harness.ctx.orchestrator;
    orchestrator.advance(job.id, Stage::Convert, Some(1)).await.unwrap();
    orchestrator.advance(job.id, Stage::ExtractAudio, Some(1)).await.unwrap();

    let (a, b) = tokio::join!(
        orchestrator.advance(job.id, Stage::Transcribe, Some(1)),
        orchestrator.advance(job.id, Stage::Transcribe, Some(1)),
    );
    let outcomes = [a.unwrap(), b.unwrap()];
    assert!(outcomes.contains(&Outcome::Advanced {
        next: Stage::Analyze
    }));
    assert!(outcomes.contains(&Outcome::Busy));
    assert_eq!(harness.executor(Stage::Transcribe).calls(), 1);

    // A late duplicate after the stage succeeded is discarded.
    let late = orchestrator.advance(job.id, Stage::Transcribe, Some(1)).await.unwrap();
    assert_eq!(late, Outcome::Discarded);
    assert_eq!(harness.executor(Stage::Transcribe).calls(), 1);
    assert_eq!(harness.stage_steps(job.id, Stage::Transcribe).len(), 1);
}

#[tokio::test]
async fn scenario_e_exhausted_retries() {
    let harness = TestHarness::new();
    harness.executor(Stage::ExtractAudio).fail_next(&[
        ErrorKind::ExternalServiceTransient,
        ErrorKind::ExternalServiceTransient,
        ErrorKind::ExternalServiceTransient,
    ]);
    let job = harness.submit().await;

    harness.drain().await;

    assert_eq!(harness.job(job.id).status, JobStatus::Failed);
    assert_eq!(
        statuses(&harness, job.id, Stage::ExtractAudio),
        vec![StepStatus::Failed; 3]
    );
    assert!(harness.stage_steps(job.id, Stage::Transcribe).is_empty());
    assert!(harness.stage_steps(job.id, Stage::Analyze).is_empty());
}
