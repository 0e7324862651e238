//! Durable trigger queue.
//!
//! A trigger asks the orchestrator to advance one (job, stage). Delivery is
//! at-least-once: a dequeued trigger is leased to a worker and becomes
//! visible again if the lease expires before it is acked.

use rusqlite::{Connection, OptionalExtension};
use rf_core::{Error, JobId, Result, Stage, TriggerId};

use super::now_rfc3339;
use crate::models::Trigger;

const COLS: &str = "id, job_id, stage, attempt, run_after_ms, locked_by, lease_expires_ms,
    deliveries, created_at";

/// Enqueue a trigger that becomes deliverable at `run_after_ms`.
pub fn enqueue(
    conn: &Connection,
    job_id: JobId,
    stage: Stage,
    attempt: Option<u32>,
    run_after_ms: i64,
) -> Result<Trigger> {
    let id = TriggerId::new();
    let now = now_rfc3339();

    conn.execute(
        "INSERT INTO triggers (id, job_id, stage, attempt, run_after_ms, deliveries, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6)",
        rusqlite::params![
            id.to_string(),
            job_id.to_string(),
            stage.as_str(),
            attempt,
            run_after_ms,
            &now
        ],
    )
    .map_err(|e| Error::database(e.to_string()))?;

    Ok(Trigger {
        id,
        job_id,
        stage,
        attempt,
        run_after_ms,
        locked_by: None,
        lease_expires_ms: None,
        deliveries: 0,
        created_at: now,
    })
}

/// Atomically lease the next due trigger to `worker`.
///
/// A trigger is due when `run_after_ms <= now_ms` and it is either unleased
/// or its lease has expired. Earliest-due first.
pub fn dequeue_next(
    conn: &Connection,
    worker: &str,
    now_ms: i64,
    lease_ms: i64,
) -> Result<Option<Trigger>> {
    let q = format!(
        "UPDATE triggers SET locked_by = ?1, lease_expires_ms = ?2, deliveries = deliveries + 1
         WHERE id = (
             SELECT id FROM triggers
             WHERE run_after_ms <= ?3
               AND (locked_by IS NULL OR lease_expires_ms IS NULL OR lease_expires_ms <= ?3)
             ORDER BY run_after_ms ASC, rowid ASC LIMIT 1
         )
         RETURNING {COLS}"
    );

    conn.query_row(
        &q,
        rusqlite::params![worker, now_ms + lease_ms, now_ms],
        Trigger::from_row,
    )
    .optional()
    .map_err(|e| Error::database(e.to_string()))
}

/// Remove a handled trigger.
pub fn ack(conn: &Connection, id: TriggerId) -> Result<bool> {
    let n = conn
        .execute("DELETE FROM triggers WHERE id = ?1", [id.to_string()])
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(n > 0)
}

/// Release a leased trigger and make it deliverable again at `run_after_ms`.
pub fn defer(conn: &Connection, id: TriggerId, run_after_ms: i64) -> Result<bool> {
    let n = conn
        .execute(
            "UPDATE triggers SET run_after_ms = ?1, locked_by = NULL, lease_expires_ms = NULL
             WHERE id = ?2",
            rusqlite::params![run_after_ms, id.to_string()],
        )
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(n > 0)
}

/// Pending triggers for one job, earliest-due first.
pub fn list_for_job(conn: &Connection, job_id: JobId) -> Result<Vec<Trigger>> {
    let q = format!(
        "SELECT {COLS} FROM triggers WHERE job_id = ?1 ORDER BY run_after_ms ASC, rowid ASC"
    );
    let mut stmt = conn.prepare(&q).map_err(|e| Error::database(e.to_string()))?;
    let rows = stmt
        .query_map([job_id.to_string()], Trigger::from_row)
        .map_err(|e| Error::database(e.to_string()))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(rows)
}

/// Total number of queued triggers, leased or not.
pub fn count_pending(conn: &Connection) -> Result<i64> {
    conn.query_row("SELECT COUNT(*) FROM triggers", [], |row| row.get(0))
        .map_err(|e| Error::database(e.to_string()))
}
