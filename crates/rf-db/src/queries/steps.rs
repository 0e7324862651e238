//! Step (stage attempt) operations.
//!
//! Steps are append-only: a finished attempt is never modified again, and a
//! retry always inserts a new row.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension};
use rf_core::{Error, ErrorKind, JobId, Result, Stage, StepId, StepStatus};

use super::now_rfc3339;
use crate::models::Step;

const COLS: &str = "id, job_id, stage, retry_round, attempt, status, input_ref, output_ref,
    error_kind, error_detail, started_at, finished_at, duration_ms";

fn map_insert_err(e: rusqlite::Error) -> Error {
    match e {
        rusqlite::Error::SqliteFailure(ref f, _)
            if f.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            Error::Conflict(format!("step already exists: {e}"))
        }
        other => Error::database(other.to_string()),
    }
}

/// Insert a new `running` attempt.
///
/// Fails with [`Error::Conflict`] if the (job, stage, round, attempt) slot is
/// already taken.
pub fn start_step(
    conn: &Connection,
    job_id: JobId,
    stage: Stage,
    retry_round: u32,
    attempt: u32,
    input_ref: &str,
) -> Result<Step> {
    let id = StepId::new();
    let now = now_rfc3339();

    conn.execute(
        "INSERT INTO steps (id, job_id, stage, retry_round, attempt, status, input_ref, started_at)
         VALUES (?1, ?2, ?3, ?4, ?5, 'running', ?6, ?7)",
        rusqlite::params![
            id.to_string(),
            job_id.to_string(),
            stage.as_str(),
            retry_round,
            attempt,
            input_ref,
            &now
        ],
    )
    .map_err(map_insert_err)?;

    Ok(Step {
        id,
        job_id,
        stage,
        retry_round,
        attempt,
        status: StepStatus::Running,
        input_ref: input_ref.to_string(),
        output_ref: None,
        error_kind: None,
        error_detail: None,
        started_at: now,
        finished_at: None,
        duration_ms: None,
    })
}

/// Milliseconds between `started_at` and `finished`, if `started_at` parses.
fn elapsed_ms(started_at: &str, finished: DateTime<Utc>) -> Option<i64> {
    DateTime::parse_from_rfc3339(started_at)
        .ok()
        .map(|s| (finished - s.with_timezone(&Utc)).num_milliseconds().max(0))
}

fn started_at(conn: &Connection, id: StepId) -> Result<Option<String>> {
    conn.query_row(
        "SELECT started_at FROM steps WHERE id = ?1",
        [id.to_string()],
        |row| row.get(0),
    )
    .optional()
    .map_err(|e| Error::database(e.to_string()))
}

/// Close a running attempt as succeeded.
pub fn succeed_step(conn: &Connection, id: StepId, output_ref: &str) -> Result<bool> {
    let Some(started) = started_at(conn, id)? else {
        return Ok(false);
    };
    let finished = Utc::now();
    let n = conn
        .execute(
            "UPDATE steps SET status = 'succeeded', output_ref = ?1, finished_at = ?2,
                duration_ms = ?3
             WHERE id = ?4 AND status = 'running'",
            rusqlite::params![
                output_ref,
                finished.to_rfc3339(),
                elapsed_ms(&started, finished),
                id.to_string()
            ],
        )
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(n > 0)
}

/// Close a running attempt as failed with its classification.
pub fn fail_step(conn: &Connection, id: StepId, kind: ErrorKind, detail: &str) -> Result<bool> {
    let Some(started) = started_at(conn, id)? else {
        return Ok(false);
    };
    let finished = Utc::now();
    let n = conn
        .execute(
            "UPDATE steps SET status = 'failed', error_kind = ?1, error_detail = ?2,
                finished_at = ?3, duration_ms = ?4
             WHERE id = ?5 AND status = 'running'",
            rusqlite::params![
                kind.as_str(),
                detail,
                finished.to_rfc3339(),
                elapsed_ms(&started, finished),
                id.to_string()
            ],
        )
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(n > 0)
}

/// All steps of a job in the order they were started.
pub fn list_steps(conn: &Connection, job_id: JobId) -> Result<Vec<Step>> {
    let q = format!("SELECT {COLS} FROM steps WHERE job_id = ?1 ORDER BY rowid ASC");
    let mut stmt = conn.prepare(&q).map_err(|e| Error::database(e.to_string()))?;
    let rows = stmt
        .query_map([job_id.to_string()], Step::from_row)
        .map_err(|e| Error::database(e.to_string()))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(rows)
}

/// Attempts of one stage within one retry round, by attempt number.
pub fn steps_for_stage(
    conn: &Connection,
    job_id: JobId,
    stage: Stage,
    retry_round: u32,
) -> Result<Vec<Step>> {
    let q = format!(
        "SELECT {COLS} FROM steps
         WHERE job_id = ?1 AND stage = ?2 AND retry_round = ?3
         ORDER BY attempt ASC"
    );
    let mut stmt = conn.prepare(&q).map_err(|e| Error::database(e.to_string()))?;
    let rows = stmt
        .query_map(
            rusqlite::params![job_id.to_string(), stage.as_str(), retry_round],
            Step::from_row,
        )
        .map_err(|e| Error::database(e.to_string()))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(rows)
}

/// The most recent succeeded attempt of a stage in any round.
pub fn find_succeeded(conn: &Connection, job_id: JobId, stage: Stage) -> Result<Option<Step>> {
    let q = format!(
        "SELECT {COLS} FROM steps
         WHERE job_id = ?1 AND stage = ?2 AND status = 'succeeded'
         ORDER BY rowid DESC LIMIT 1"
    );
    conn.query_row(
        &q,
        rusqlite::params![job_id.to_string(), stage.as_str()],
        Step::from_row,
    )
    .optional()
    .map_err(|e| Error::database(e.to_string()))
}
