//! The job state machine.
//!
//! [`Orchestrator::advance`] is the only code path that mutates job and step
//! rows once a job exists. Every call takes the per-job lock, re-reads the
//! job, decides what to do from the recorded steps, persists the outcome and
//! schedules at most one follow-up trigger. Because all decisions are made
//! from persisted state, a duplicate or out-of-order trigger is harmless.

use std::sync::Arc;
use std::time::Duration;

use rf_core::events::{EventBus, EventPayload};
use rf_core::{Error, ErrorKind, JobId, JobStatus, RecordingId, Result, Stage, StepStatus};
use rf_db::models::{Job, Step};
use rf_db::pool::{get_conn, DbPool};
use rf_db::queries::{jobs, now_ms, steps};
use uuid::Uuid;

use crate::executor::{ExecutorRegistry, StageContext};
use crate::queue::TriggerSink;
use crate::retry::{RetryDecision, RetryPolicy};

const ABANDONED_DETAIL: &str = "attempt abandoned before completion";

/// What a single [`Orchestrator::advance`] call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The stage succeeded (now or earlier) and `next` was scheduled.
    Advanced { next: Stage },
    /// Analyze succeeded; the job is done.
    Completed,
    /// The attempt failed and `attempt` is scheduled after `delay`.
    RetryScheduled { attempt: u32, delay: Duration },
    /// The attempt failed for good; the job is failed.
    Failed { kind: ErrorKind },
    /// The trigger no longer applies: the job is gone, terminal, at a
    /// different stage, or its attempt has already been made.
    Discarded,
    /// The stage is backing off after a failure; redeliver after `delay`.
    Deferred { delay: Duration },
    /// Another worker holds the job lock; redeliver later.
    Busy,
}

/// Drives jobs through the stages.
pub struct Orchestrator {
    pool: DbPool,
    executors: ExecutorRegistry,
    triggers: Arc<dyn TriggerSink>,
    events: Arc<EventBus>,
    policy: RetryPolicy,
    lock_lease: Duration,
}

impl Orchestrator {
    pub fn new(
        pool: DbPool,
        executors: ExecutorRegistry,
        triggers: Arc<dyn TriggerSink>,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            pool,
            executors,
            triggers,
            events,
            policy: RetryPolicy::default(),
            lock_lease: Duration::from_secs(3600),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Lease on the per-job lock. Must outlive the slowest stage, or a
    /// redelivered trigger may treat a live attempt as abandoned.
    pub fn with_lock_lease(mut self, lease: Duration) -> Self {
        self.lock_lease = lease;
        self
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    // -----------------------------------------------------------------------
    // Entry points
    // -----------------------------------------------------------------------

    /// Create the job for `recording_id` and queue its first stage.
    ///
    /// A recording that already has a job gets that job back and nothing is
    /// queued. The returned flag is `true` when a new job was created.
    pub async fn submit(&self, recording_id: RecordingId, upload_ref: &str) -> Result<(Job, bool)> {
        rf_store::validate_key(upload_ref)?;

        let (job, created) = {
            let conn = get_conn(&self.pool)?;
            jobs::create_job(&conn, recording_id, upload_ref)?
        };

        if created {
            self.triggers
                .schedule(job.id, Stage::first(), Some(1), Duration::ZERO)
                .await?;
            self.events.broadcast(EventPayload::JobQueued { job_id: job.id });
            tracing::info!(job_id = %job.id, %recording_id, upload_ref, "job submitted");
        } else {
            tracing::info!(job_id = %job.id, %recording_id, "recording already has a job");
        }
        Ok((job, created))
    }

    /// Re-open a failed job and queue its failed stage in a new retry round.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] for an unknown job, [`Error::Conflict`] for a job
    /// that is not failed.
    pub async fn retry_job(&self, job_id: JobId) -> Result<Job> {
        let job = {
            let conn = get_conn(&self.pool)?;
            match jobs::reopen_failed_job(&conn, job_id)? {
                Some(job) => job,
                None => {
                    return match jobs::get_job(&conn, job_id)? {
                        None => Err(Error::not_found("job", job_id)),
                        Some(job) => Err(Error::Conflict(format!(
                            "job {job_id} is {}, only failed jobs can be retried",
                            job.status
                        ))),
                    };
                }
            }
        };

        self.triggers
            .schedule(job.id, job.current_stage, Some(1), Duration::ZERO)
            .await?;
        self.events.broadcast(EventPayload::JobQueued { job_id });
        tracing::info!(
            %job_id,
            stage = %job.current_stage,
            retry_round = job.retry_round,
            "manual retry queued"
        );
        Ok(job)
    }

    /// Re-queue live jobs that are unlocked and have no trigger pending.
    ///
    /// Returns the number of jobs re-queued.
    pub async fn recover(&self) -> Result<usize> {
        let stalled = {
            let conn = get_conn(&self.pool)?;
            jobs::find_stalled_jobs(&conn, now_ms())?
        };

        for job in &stalled {
            tracing::warn!(
                job_id = %job.id,
                stage = %job.current_stage,
                status = %job.status,
                "re-queuing stalled job"
            );
            self.triggers
                .schedule(job.id, job.current_stage, None, Duration::ZERO)
                .await?;
        }
        Ok(stalled.len())
    }

    /// Handle one trigger delivery for (job, stage).
    ///
    /// `attempt` is the attempt the trigger was scheduled for, or `None` for
    /// a trigger that just asks the job to make progress. Holds the per-job
    /// lock for the whole call, including the executor run, and releases it
    /// on every exit path.
    pub async fn advance(&self, job_id: JobId, stage: Stage, attempt: Option<u32>) -> Result<Outcome> {
        {
            let conn = get_conn(&self.pool)?;
            match jobs::get_job(&conn, job_id)? {
                Some(job) if applies(&job, stage) => {}
                Some(job) => {
                    tracing::debug!(
                        %job_id,
                        %stage,
                        current_stage = %job.current_stage,
                        status = %job.status,
                        "discarding stale trigger"
                    );
                    return Ok(Outcome::Discarded);
                }
                None => {
                    tracing::warn!(%job_id, %stage, "trigger for unknown job");
                    return Ok(Outcome::Discarded);
                }
            }
        }

        let owner = format!("advance-{}", Uuid::new_v4());
        let locked = {
            let conn = get_conn(&self.pool)?;
            jobs::try_lock_job(&conn, job_id, &owner, now_ms(), duration_ms(self.lock_lease))?
        };
        if !locked {
            tracing::debug!(%job_id, %stage, "job is locked elsewhere");
            return Ok(Outcome::Busy);
        }

        let result = self.advance_locked(job_id, stage, attempt).await;

        match get_conn(&self.pool).and_then(|conn| jobs::unlock_job(&conn, job_id, &owner)) {
            Ok(true) => {}
            Ok(false) => tracing::warn!(%job_id, %stage, "job lock lease expired before release"),
            Err(e) => tracing::error!(%job_id, %stage, error = %e, "failed to release job lock"),
        }

        result
    }

    // -----------------------------------------------------------------------
    // Transition function (lock held)
    // -----------------------------------------------------------------------

    async fn advance_locked(
        &self,
        job_id: JobId,
        stage: Stage,
        requested: Option<u32>,
    ) -> Result<Outcome> {
        let conn = get_conn(&self.pool)?;

        let Some(job) = jobs::get_job(&conn, job_id)? else {
            return Ok(Outcome::Discarded);
        };
        if !applies(&job, stage) {
            return Ok(Outcome::Discarded);
        }
        if job.status == JobStatus::Pending {
            jobs::mark_running(&conn, job_id)?;
        }

        // An earlier delivery ran the stage but did not get to move the job on.
        if let Some(done) = steps::find_succeeded(&conn, job_id, stage)? {
            drop(conn);
            tracing::info!(%job_id, %stage, attempt = done.attempt, "stage already succeeded");
            return self.finish_stage(&job, stage, done.attempt).await;
        }

        let history = steps::steps_for_stage(&conn, job_id, stage, job.retry_round)?;
        let attempt = match history.last() {
            None => 1,
            Some(last) => {
                let abandoned = last.status == StepStatus::Running;
                let (kind, detail) = close_previous(&conn, last)?;
                match self.policy.should_retry(kind, last.attempt) {
                    RetryDecision::Exhausted => {
                        drop(conn);
                        return self.fail_job(&job, stage, last.attempt, kind, &detail);
                    }
                    RetryDecision::Retry(_) if abandoned => last.attempt + 1,
                    RetryDecision::Retry(_) => {
                        let Some(gate) = job.retry_after_ms else {
                            // The failure was recorded but its retry never got scheduled.
                            drop(conn);
                            return self.handle_failure(&job, stage, last.attempt, kind, &detail).await;
                        };
                        if let Some(requested) = requested.filter(|&a| a <= last.attempt) {
                            tracing::debug!(
                                %job_id,
                                %stage,
                                requested,
                                last_attempt = last.attempt,
                                "discarding trigger for an attempt already made"
                            );
                            return Ok(Outcome::Discarded);
                        }
                        if let Some(wait) = backoff_remaining(gate, now_ms()) {
                            tracing::debug!(%job_id, %stage, wait_ms = duration_ms(wait), "retry still backing off");
                            return Ok(Outcome::Deferred { delay: wait });
                        }
                        last.attempt + 1
                    }
                }
            }
        };

        let input = resolve_input(&conn, &job, stage);
        let step = steps::start_step(
            &conn,
            job_id,
            stage,
            job.retry_round,
            attempt,
            input.as_deref().unwrap_or_default(),
        )?;
        if job.retry_after_ms.is_some() {
            jobs::clear_retry_after(&conn, job_id)?;
        }
        drop(conn);

        self.events.broadcast(EventPayload::StageStarted { job_id, stage, attempt });
        tracing::info!(%job_id, %stage, attempt, retry_round = job.retry_round, "stage attempt started");

        let result = match input {
            Ok(input_ref) => {
                let ctx = StageContext { job_id, stage, attempt, input_ref };
                match self.executors.get(stage) {
                    Ok(executor) => executor.run(&ctx).await,
                    Err(e) => Err(e),
                }
            }
            Err(e) => Err(e),
        };

        match result {
            Ok(output_ref) => {
                {
                    let conn = get_conn(&self.pool)?;
                    steps::succeed_step(&conn, step.id, &output_ref)?;
                }
                tracing::info!(%job_id, %stage, attempt, %output_ref, "stage attempt succeeded");
                self.finish_stage(&job, stage, attempt).await
            }
            Err(e) => {
                let kind = e.kind();
                let detail = e.to_string();
                {
                    let conn = get_conn(&self.pool)?;
                    steps::fail_step(&conn, step.id, kind, &detail)?;
                }
                tracing::warn!(%job_id, %stage, attempt, %kind, error = %detail, "stage attempt failed");
                self.handle_failure(&job, stage, attempt, kind, &detail).await
            }
        }
    }

    /// Move the job past a succeeded stage.
    async fn finish_stage(&self, job: &Job, stage: Stage, attempt: u32) -> Result<Outcome> {
        let progress = (stage.index() + 1) as f32 / Stage::ALL.len() as f32;

        match stage.next() {
            Some(next) => {
                {
                    let conn = get_conn(&self.pool)?;
                    jobs::advance_job(&conn, job.id, next)?;
                }
                self.triggers
                    .schedule(job.id, next, Some(1), Duration::ZERO)
                    .await?;
                self.events.broadcast(EventPayload::StageSucceeded {
                    job_id: job.id,
                    stage,
                    attempt,
                    progress,
                });
                Ok(Outcome::Advanced { next })
            }
            None => {
                {
                    let conn = get_conn(&self.pool)?;
                    jobs::complete_job(&conn, job.id)?;
                }
                self.events.broadcast(EventPayload::StageSucceeded {
                    job_id: job.id,
                    stage,
                    attempt,
                    progress,
                });
                self.events.broadcast(EventPayload::JobSucceeded { job_id: job.id });
                tracing::info!(job_id = %job.id, "job succeeded");
                Ok(Outcome::Completed)
            }
        }
    }

    async fn handle_failure(
        &self,
        job: &Job,
        stage: Stage,
        attempt: u32,
        kind: ErrorKind,
        detail: &str,
    ) -> Result<Outcome> {
        match self.policy.should_retry(kind, attempt) {
            RetryDecision::Retry(delay) => {
                let next_attempt = attempt + 1;
                {
                    let conn = get_conn(&self.pool)?;
                    jobs::set_retry_after(&conn, job.id, now_ms().saturating_add(duration_ms(delay)))?;
                }
                self.triggers
                    .schedule(job.id, stage, Some(next_attempt), delay)
                    .await?;
                let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
                self.events.broadcast(EventPayload::StageRetryScheduled {
                    job_id: job.id,
                    stage,
                    attempt: next_attempt,
                    error_kind: kind,
                    delay_ms,
                });
                tracing::info!(job_id = %job.id, %stage, next_attempt, delay_ms, "retry scheduled");
                Ok(Outcome::RetryScheduled {
                    attempt: next_attempt,
                    delay,
                })
            }
            RetryDecision::Exhausted => self.fail_job(job, stage, attempt, kind, detail),
        }
    }

    fn fail_job(
        &self,
        job: &Job,
        stage: Stage,
        attempt: u32,
        kind: ErrorKind,
        detail: &str,
    ) -> Result<Outcome> {
        let message = format!("{stage} failed after {attempt} attempt(s): {detail}");
        {
            let conn = get_conn(&self.pool)?;
            jobs::fail_job(&conn, job.id, &message)?;
        }
        self.events.broadcast(EventPayload::JobFailed {
            job_id: job.id,
            stage,
            error: message.clone(),
        });
        tracing::error!(job_id = %job.id, %stage, attempt, %kind, error = %message, "job failed");
        Ok(Outcome::Failed { kind })
    }
}

/// Whether a trigger for `stage` still applies to `job`.
fn applies(job: &Job, stage: Stage) -> bool {
    !job.status.is_terminal() && job.current_stage == stage
}

/// Time left before a retry gated at `gate_ms` may start, if any.
fn backoff_remaining(gate_ms: i64, now_ms: i64) -> Option<Duration> {
    (gate_ms > now_ms).then(|| Duration::from_millis(u64::try_from(gate_ms - now_ms).unwrap_or(0)))
}

/// Classify the latest recorded attempt of a stage that has not succeeded.
///
/// A step still `Running` belongs to a holder whose lock lease has lapsed;
/// it is closed as an abandoned, retryable failure.
fn close_previous(conn: &rusqlite::Connection, last: &Step) -> Result<(ErrorKind, String)> {
    if last.status == StepStatus::Running {
        tracing::warn!(
            job_id = %last.job_id,
            stage = %last.stage,
            attempt = last.attempt,
            "closing abandoned attempt"
        );
        steps::fail_step(conn, last.id, ErrorKind::TransientInfra, ABANDONED_DETAIL)?;
        return Ok((ErrorKind::TransientInfra, ABANDONED_DETAIL.to_string()));
    }
    Ok((
        last.error_kind.unwrap_or(ErrorKind::TransientInfra),
        last.error_detail.clone().unwrap_or_default(),
    ))
}

/// The upload for Convert, otherwise the previous stage's output.
fn resolve_input(conn: &rusqlite::Connection, job: &Job, stage: Stage) -> Result<String> {
    let Some(prev) = stage.previous() else {
        return Ok(job.upload_ref.clone());
    };
    steps::find_succeeded(conn, job.id, prev)?
        .and_then(|s| s.output_ref)
        .ok_or_else(|| Error::Validation(format!("no {prev} output recorded for job {}", job.id)))
}

fn duration_ms(d: Duration) -> i64 {
    i64::try_from(d.as_millis()).unwrap_or(i64::MAX)
}
