//! Rust structs mapping to database tables.
//!
//! Each model implements `from_row` for constructing itself from a
//! `rusqlite::Row`.

use std::str::FromStr;

use rf_core::{ErrorKind, JobId, JobStatus, RecordingId, Stage, StepId, StepStatus, TriggerId};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// helpers
// ---------------------------------------------------------------------------

fn conversion_err(
    idx: usize,
    e: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
}

/// Parse a UUID-based ID from a text column.
fn parse_id<T: From<Uuid>>(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<T> {
    let s: String = row.get(idx)?;
    let uuid = Uuid::parse_str(&s).map_err(|e| conversion_err(idx, e))?;
    Ok(T::from(uuid))
}

/// Parse a snake_case enum column.
fn parse_enum<T>(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let s: String = row.get(idx)?;
    s.parse::<T>().map_err(|e| conversion_err(idx, e))
}

fn parse_opt_enum<T>(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let s: Option<String> = row.get(idx)?;
    match s {
        Some(v) => v.parse::<T>().map(Some).map_err(|e| conversion_err(idx, e)),
        None => Ok(None),
    }
}

// ---------------------------------------------------------------------------
// Job
// ---------------------------------------------------------------------------

/// One recording's pipeline run.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: JobId,
    pub recording_id: RecordingId,
    pub upload_ref: String,
    pub current_stage: Stage,
    pub status: JobStatus,
    pub error_message: Option<String>,
    /// Incremented by each manual retry; attempts restart at 1 per round.
    pub retry_round: u32,
    pub locked_by: Option<String>,
    pub lock_expires_ms: Option<i64>,
    pub created_at: String,
    pub updated_at: String,
    pub completed_at: Option<String>,
    /// Set while a retry of the current stage is backing off; no attempt
    /// may start before this time.
    pub retry_after_ms: Option<i64>,
}

impl Job {
    /// Build from a row selected as:
    /// id, recording_id, upload_ref, current_stage, status, error_message,
    /// retry_round, locked_by, lock_expires_ms, created_at, updated_at,
    /// completed_at, retry_after_ms
    pub fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: parse_id(row, 0)?,
            recording_id: parse_id(row, 1)?,
            upload_ref: row.get(2)?,
            current_stage: parse_enum(row, 3)?,
            status: parse_enum(row, 4)?,
            error_message: row.get(5)?,
            retry_round: row.get(6)?,
            locked_by: row.get(7)?,
            lock_expires_ms: row.get(8)?,
            created_at: row.get(9)?,
            updated_at: row.get(10)?,
            completed_at: row.get(11)?,
            retry_after_ms: row.get(12)?,
        })
    }
}

// ---------------------------------------------------------------------------
// Step
// ---------------------------------------------------------------------------

/// One attempt of one stage.
#[derive(Debug, Clone)]
pub struct Step {
    pub id: StepId,
    pub job_id: JobId,
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

impl Step {
    /// Build from a row selected as:
    /// id, job_id, stage, retry_round, attempt, status, input_ref,
    /// output_ref, error_kind, error_detail, started_at, finished_at,
    /// duration_ms
    pub fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: parse_id(row, 0)?,
            job_id: parse_id(row, 1)?,
            stage: parse_enum(row, 2)?,
            retry_round: row.get(3)?,
            attempt: row.get(4)?,
            status: parse_enum(row, 5)?,
            input_ref: row.get(6)?,
            output_ref: row.get(7)?,
            error_kind: parse_opt_enum(row, 8)?,
            error_detail: row.get(9)?,
            started_at: row.get(10)?,
            finished_at: row.get(11)?,
            duration_ms: row.get(12)?,
        })
    }
}

// ---------------------------------------------------------------------------
// Trigger
// ---------------------------------------------------------------------------

/// A queued request to advance (job, stage).
#[derive(Debug, Clone)]
pub struct Trigger {
    pub id: TriggerId,
    pub job_id: JobId,
    pub stage: Stage,
    /// Attempt the producer expects to run next. A delivery for an attempt
    /// that has already been made is dropped.
    pub attempt: Option<u32>,
    pub run_after_ms: i64,
    pub locked_by: Option<String>,
    pub lease_expires_ms: Option<i64>,
    pub deliveries: u32,
    pub created_at: String,
}

impl Trigger {
    pub fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: parse_id(row, 0)?,
            job_id: parse_id(row, 1)?,
            stage: parse_enum(row, 2)?,
            attempt: row.get(3)?,
            run_after_ms: row.get(4)?,
            locked_by: row.get(5)?,
            lease_expires_ms: row.get(6)?,
            deliveries: row.get(7)?,
            created_at: row.get(8)?,
        })
    }
}
