//! Job record operations, including the per-job lock lease.

use rusqlite::{Connection, OptionalExtension};
use rf_core::{Error, JobId, JobStatus, RecordingId, Result, Stage};

use super::now_rfc3339;
use crate::models::Job;

const COLS: &str = "id, recording_id, upload_ref, current_stage, status, error_message,
    retry_round, locked_by, lock_expires_ms, created_at, updated_at, completed_at,
    retry_after_ms";

/// Create the job for a recording, or return the existing one.
///
/// Jobs are 1:1 with recordings, so a second call for the same recording is
/// a no-op. The returned flag is `true` when a new row was inserted.
pub fn create_job(
    conn: &Connection,
    recording_id: RecordingId,
    upload_ref: &str,
) -> Result<(Job, bool)> {
    let id = JobId::new();
    let now = now_rfc3339();

    let inserted = conn
        .execute(
            "INSERT INTO jobs (id, recording_id, upload_ref, current_stage, status,
                               retry_round, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, 'pending', 1, ?5, ?5)
             ON CONFLICT(recording_id) DO NOTHING",
            rusqlite::params![
                id.to_string(),
                recording_id.to_string(),
                upload_ref,
                Stage::first().as_str(),
                &now
            ],
        )
        .map_err(|e| Error::database(e.to_string()))?;

    let job = get_job_by_recording(conn, recording_id)?
        .ok_or_else(|| Error::not_found("job for recording", recording_id))?;
    Ok((job, inserted > 0))
}

/// Get a job by ID.
pub fn get_job(conn: &Connection, id: JobId) -> Result<Option<Job>> {
    let q = format!("SELECT {COLS} FROM jobs WHERE id = ?1");
    conn.query_row(&q, [id.to_string()], Job::from_row)
        .optional()
        .map_err(|e| Error::database(e.to_string()))
}

/// Get the job owned by a recording.
pub fn get_job_by_recording(conn: &Connection, recording_id: RecordingId) -> Result<Option<Job>> {
    let q = format!("SELECT {COLS} FROM jobs WHERE recording_id = ?1");
    conn.query_row(&q, [recording_id.to_string()], Job::from_row)
        .optional()
        .map_err(|e| Error::database(e.to_string()))
}

/// List jobs with optional status filter and pagination, oldest first.
pub fn list_jobs(
    conn: &Connection,
    status: Option<JobStatus>,
    offset: i64,
    limit: i64,
) -> Result<Vec<Job>> {
    let (q, params_vec): (String, Vec<Box<dyn rusqlite::types::ToSql>>) = if let Some(s) = status {
        (
            format!(
                "SELECT {COLS} FROM jobs WHERE status = ?1
                 ORDER BY created_at ASC LIMIT ?2 OFFSET ?3"
            ),
            vec![
                Box::new(s.as_str().to_string()),
                Box::new(limit),
                Box::new(offset),
            ],
        )
    } else {
        (
            format!("SELECT {COLS} FROM jobs ORDER BY created_at ASC LIMIT ?1 OFFSET ?2"),
            vec![Box::new(limit), Box::new(offset)],
        )
    };

    let mut stmt = conn.prepare(&q).map_err(|e| Error::database(e.to_string()))?;
    let params_refs: Vec<&dyn rusqlite::types::ToSql> =
        params_vec.iter().map(|b| b.as_ref()).collect();
    let rows = stmt
        .query_map(params_refs.as_slice(), Job::from_row)
        .map_err(|e| Error::database(e.to_string()))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(rows)
}

/// Try to take the per-job lock for `owner` until `now_ms + lease_ms`.
///
/// Succeeds when the lock is free or its lease has expired. Returns `false`
/// when another owner holds a live lease.
pub fn try_lock_job(
    conn: &Connection,
    id: JobId,
    owner: &str,
    now_ms: i64,
    lease_ms: i64,
) -> Result<bool> {
    let n = conn
        .execute(
            "UPDATE jobs SET locked_by = ?1, lock_expires_ms = ?2
             WHERE id = ?3
               AND (locked_by IS NULL OR lock_expires_ms IS NULL OR lock_expires_ms <= ?4)",
            rusqlite::params![owner, now_ms + lease_ms, id.to_string(), now_ms],
        )
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(n > 0)
}

/// Release the per-job lock if `owner` still holds it.
pub fn unlock_job(conn: &Connection, id: JobId, owner: &str) -> Result<bool> {
    let n = conn
        .execute(
            "UPDATE jobs SET locked_by = NULL, lock_expires_ms = NULL
             WHERE id = ?1 AND locked_by = ?2",
            rusqlite::params![id.to_string(), owner],
        )
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(n > 0)
}

/// Move a pending job to running.
pub fn mark_running(conn: &Connection, id: JobId) -> Result<bool> {
    let n = conn
        .execute(
            "UPDATE jobs SET status = 'running', updated_at = ?1
             WHERE id = ?2 AND status = 'pending'",
            rusqlite::params![now_rfc3339(), id.to_string()],
        )
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(n > 0)
}

/// Advance a live job to `next` and keep it running.
pub fn advance_job(conn: &Connection, id: JobId, next: Stage) -> Result<bool> {
    let n = conn
        .execute(
            "UPDATE jobs SET current_stage = ?1, status = 'running', retry_after_ms = NULL,
                updated_at = ?2
             WHERE id = ?3 AND status IN ('pending', 'running')",
            rusqlite::params![next.as_str(), now_rfc3339(), id.to_string()],
        )
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(n > 0)
}

/// Mark a job as succeeded.
pub fn complete_job(conn: &Connection, id: JobId) -> Result<bool> {
    let now = now_rfc3339();
    let n = conn
        .execute(
            "UPDATE jobs SET status = 'succeeded', error_message = NULL, retry_after_ms = NULL,
                updated_at = ?1, completed_at = ?1
             WHERE id = ?2 AND status IN ('pending', 'running')",
            rusqlite::params![now, id.to_string()],
        )
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(n > 0)
}

/// Mark a job as failed with a human-readable message.
pub fn fail_job(conn: &Connection, id: JobId, error: &str) -> Result<bool> {
    let now = now_rfc3339();
    let n = conn
        .execute(
            "UPDATE jobs SET status = 'failed', error_message = ?1, retry_after_ms = NULL,
                updated_at = ?2, completed_at = ?2
             WHERE id = ?3 AND status IN ('pending', 'running')",
            rusqlite::params![error, now, id.to_string()],
        )
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(n > 0)
}

/// Hold back the next attempt of a live job's current stage until `at_ms`.
pub fn set_retry_after(conn: &Connection, id: JobId, at_ms: i64) -> Result<bool> {
    let n = conn
        .execute(
            "UPDATE jobs SET retry_after_ms = ?1, updated_at = ?2
             WHERE id = ?3 AND status IN ('pending', 'running')",
            rusqlite::params![at_ms, now_rfc3339(), id.to_string()],
        )
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(n > 0)
}

/// Lift the retry gate once the next attempt has started.
pub fn clear_retry_after(conn: &Connection, id: JobId) -> Result<bool> {
    let n = conn
        .execute(
            "UPDATE jobs SET retry_after_ms = NULL WHERE id = ?1",
            [id.to_string()],
        )
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(n > 0)
}

/// Re-open a failed job for a manual retry of its current stage.
///
/// Starts a new retry round so attempt numbering restarts at 1. Returns
/// `None` when the job is not in the `failed` state.
pub fn reopen_failed_job(conn: &Connection, id: JobId) -> Result<Option<Job>> {
    let q = format!(
        "UPDATE jobs SET status = 'running', error_message = NULL, completed_at = NULL,
            retry_round = retry_round + 1, retry_after_ms = NULL, updated_at = ?1
         WHERE id = ?2 AND status = 'failed'
         RETURNING {COLS}"
    );
    conn.query_row(&q, rusqlite::params![now_rfc3339(), id.to_string()], Job::from_row)
        .optional()
        .map_err(|e| Error::database(e.to_string()))
}

/// Non-terminal, unlocked jobs that have no trigger queued.
///
/// These are jobs whose next trigger was lost, e.g. when a process crashed
/// between persisting a stage result and enqueuing the follow-up.
pub fn find_stalled_jobs(conn: &Connection, now_ms: i64) -> Result<Vec<Job>> {
    let q = format!(
        "SELECT {COLS} FROM jobs
         WHERE status IN ('pending', 'running')
           AND (locked_by IS NULL OR lock_expires_ms IS NULL OR lock_expires_ms <= ?1)
           AND NOT EXISTS (SELECT 1 FROM triggers t WHERE t.job_id = jobs.id)
         ORDER BY created_at ASC"
    );
    let mut stmt = conn.prepare(&q).map_err(|e| Error::database(e.to_string()))?;
    let rows = stmt
        .query_map([now_ms], Job::from_row)
        .map_err(|e| Error::database(e.to_string()))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(rows)
}

/// Delete a job together with its steps and triggers.
pub fn delete_job(conn: &Connection, id: JobId) -> Result<bool> {
    let n = conn
        .execute("DELETE FROM jobs WHERE id = ?1", [id.to_string()])
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(n > 0)
}
