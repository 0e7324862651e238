//! Read-only job and step views.

use rf_core::{Error, ErrorKind, JobId, JobStatus, RecordingId, Result, Stage, StepStatus};
use rf_db::models::{Job, Step};
use rf_db::pool::{get_conn, DbPool};
use rf_db::queries::{jobs, steps};
use serde::Serialize;

/// Job status as shown to users.
#[derive(Debug, Clone, Serialize)]
pub struct JobSummary {
    pub id: JobId,
    pub recording_id: RecordingId,
    pub status: JobStatus,
    pub current_stage: Stage,
    pub error_message: Option<String>,
    /// Fraction of stages completed, 0.0 -- 1.0.
    pub progress: f32,
    pub retry_round: u32,
    pub created_at: String,
    pub updated_at: String,
    pub completed_at: Option<String>,
}

impl From<Job> for JobSummary {
    fn from(job: Job) -> Self {
        let progress = match job.status {
            JobStatus::Succeeded => 1.0,
            _ => job.current_stage.index() as f32 / Stage::ALL.len() as f32,
        };
        Self {
            id: job.id,
            recording_id: job.recording_id,
            status: job.status,
            current_stage: job.current_stage,
            error_message: job.error_message,
            progress,
            retry_round: job.retry_round,
            created_at: job.created_at,
            updated_at: job.updated_at,
            completed_at: job.completed_at,
        }
    }
}

/// One attempt as shown to users.
#[derive(Debug, Clone, Serialize)]
pub struct StepSummary {
    pub stage: Stage,
    pub retry_round: u32,
    pub attempt: u32,
    pub status: StepStatus,
    pub input_ref: String,
    pub output_ref: Option<String>,
    pub error_kind: Option<ErrorKind>,
    pub error_detail: Option<String>,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub duration_ms: Option<i64>,
}

impl From<Step> for StepSummary {
    fn from(step: Step) -> Self {
        Self {
            stage: step.stage,
            retry_round: step.retry_round,
            attempt: step.attempt,
            status: step.status,
            input_ref: step.input_ref,
            output_ref: step.output_ref,
            error_kind: step.error_kind,
            error_detail: step.error_detail,
            started_at: step.started_at,
            finished_at: step.finished_at,
            duration_ms: step.duration_ms,
        }
    }
}

/// Current status of one job.
pub fn get_job(pool: &DbPool, job_id: JobId) -> Result<JobSummary> {
    let conn = get_conn(pool)?;
    jobs::get_job(&conn, job_id)?
        .map(JobSummary::from)
        .ok_or_else(|| Error::not_found("job", job_id))
}

/// Status of the job owning `recording_id`.
pub fn get_job_by_recording(pool: &DbPool, recording_id: RecordingId) -> Result<JobSummary> {
    let conn = get_conn(pool)?;
    jobs::get_job_by_recording(&conn, recording_id)?
        .map(JobSummary::from)
        .ok_or_else(|| Error::not_found("job for recording", recording_id))
}

/// Jobs, oldest first, optionally filtered by status.
pub fn list_jobs(
    pool: &DbPool,
    status: Option<JobStatus>,
    offset: i64,
    limit: i64,
) -> Result<Vec<JobSummary>> {
    let conn = get_conn(pool)?;
    Ok(jobs::list_jobs(&conn, status, offset, limit)?
        .into_iter()
        .map(JobSummary::from)
        .collect())
}

/// Every attempt of a job in execution order.
///
/// The latest failed attempt of a live job's current stage is reported as
/// [`StepStatus::Retrying`]: the job is still running, so that failure has a
/// retry scheduled.
pub fn get_steps(pool: &DbPool, job_id: JobId) -> Result<Vec<StepSummary>> {
    let conn = get_conn(pool)?;
    let job = jobs::get_job(&conn, job_id)?.ok_or_else(|| Error::not_found("job", job_id))?;
    let history = steps::list_steps(&conn, job_id)?;
    drop(conn);

    let retrying = if job.status.is_terminal() {
        None
    } else {
        history
            .iter()
            .rposition(|s| s.stage == job.current_stage && s.retry_round == job.retry_round)
            .filter(|&i| history[i].status == StepStatus::Failed)
    };

    Ok(history
        .into_iter()
        .enumerate()
        .map(|(i, step)| {
            let mut summary = StepSummary::from(step);
            if Some(i) == retrying {
                summary.status = StepStatus::Retrying;
            }
            summary
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rf_db::pool::init_memory_pool;

    fn setup() -> (DbPool, JobId) {
        let pool = init_memory_pool().unwrap();
        let conn = get_conn(&pool).unwrap();
        let (job, _) = jobs::create_job(&conn, RecordingId::new(), "uploads/r/a.webm").unwrap();
        drop(conn);
        (pool, job.id)
    }

    #[test]
    fn unknown_job_is_not_found() {
        let pool = init_memory_pool().unwrap();
        assert!(matches!(get_job(&pool, JobId::new()), Err(Error::NotFound { .. })));
        assert!(matches!(get_steps(&pool, JobId::new()), Err(Error::NotFound { .. })));
    }

    #[test]
    fn progress_tracks_current_stage() {
        let (pool, id) = setup();
        assert_eq!(get_job(&pool, id).unwrap().progress, 0.0);

        let conn = get_conn(&pool).unwrap();
        jobs::advance_job(&conn, id, Stage::Transcribe).unwrap();
        drop(conn);
        let summary = get_job(&pool, id).unwrap();
        assert_eq!(summary.status, JobStatus::Running);
        assert_eq!(summary.progress, 0.5);

        let conn = get_conn(&pool).unwrap();
        jobs::complete_job(&conn, id).unwrap();
        drop(conn);
        assert_eq!(get_job(&pool, id).unwrap().progress, 1.0);
    }

    #[test]
    fn latest_failure_of_live_job_is_retrying() {
        let (pool, id) = setup();
        let conn = get_conn(&pool).unwrap();
        jobs::mark_running(&conn, id).unwrap();
        let s1 = steps::start_step(&conn, id, Stage::Convert, 1, 1, "uploads/r/a.webm").unwrap();
        steps::fail_step(&conn, s1.id, ErrorKind::ExternalServiceTransient, "503").unwrap();
        let s2 = steps::start_step(&conn, id, Stage::Convert, 1, 2, "uploads/r/a.webm").unwrap();
        steps::fail_step(&conn, s2.id, ErrorKind::ExternalServiceTransient, "503").unwrap();
        drop(conn);

        let view = get_steps(&pool, id).unwrap();
        assert_eq!(view.len(), 2);
        assert_eq!(view[0].status, StepStatus::Failed);
        assert_eq!(view[1].status, StepStatus::Retrying);
        assert_eq!(view[1].error_kind, Some(ErrorKind::ExternalServiceTransient));

        let conn = get_conn(&pool).unwrap();
        jobs::fail_job(&conn, id, "convert failed").unwrap();
        drop(conn);
        let view = get_steps(&pool, id).unwrap();
        assert_eq!(view[1].status, StepStatus::Failed);
        assert_eq!(get_job(&pool, id).unwrap().error_message.as_deref(), Some("convert failed"));
    }

    #[test]
    fn lookup_by_recording() {
        let (pool, id) = setup();
        let recording = get_job(&pool, id).unwrap().recording_id;
        assert_eq!(get_job_by_recording(&pool, recording).unwrap().id, id);
        assert!(matches!(
            get_job_by_recording(&pool, RecordingId::new()),
            Err(Error::NotFound { .. })
        ));
    }

    #[test]
    fn list_filters_by_status() {
        let (pool, id) = setup();
        let conn = get_conn(&pool).unwrap();
        jobs::create_job(&conn, RecordingId::new(), "uploads/r2/b.webm").unwrap();
        jobs::fail_job(&conn, id, "boom").unwrap();
        drop(conn);

        assert_eq!(list_jobs(&pool, None, 0, 10).unwrap().len(), 2);
        let failed = list_jobs(&pool, Some(JobStatus::Failed), 0, 10).unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].id, id);
    }
}
