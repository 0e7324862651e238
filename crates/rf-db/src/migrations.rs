//! Embedded SQL migrations and runner.
//!
//! Migrations are stored as `&str` constants and executed in order.  A
//! `schema_migrations` table tracks which versions have been applied.

use rusqlite::Connection;
use rf_core::{Error, Result};

/// V1: jobs, their append-only step history, and the trigger queue.
const V1_INITIAL: &str = r#"
-- One job per uploaded recording
CREATE TABLE jobs (
    id              TEXT PRIMARY KEY,
    recording_id    TEXT NOT NULL UNIQUE,
    upload_ref      TEXT NOT NULL,
    current_stage   TEXT NOT NULL DEFAULT 'convert',
    status          TEXT NOT NULL DEFAULT 'pending',
    error_message   TEXT,
    retry_round     INTEGER NOT NULL DEFAULT 1,
    locked_by       TEXT,
    lock_expires_ms INTEGER,
    created_at      TEXT NOT NULL,
    updated_at      TEXT NOT NULL,
    completed_at    TEXT
);

-- Stage attempts (never updated once finished)
CREATE TABLE steps (
    id           TEXT PRIMARY KEY,
    job_id       TEXT NOT NULL REFERENCES jobs(id) ON DELETE CASCADE,
    stage        TEXT NOT NULL,
    retry_round  INTEGER NOT NULL,
    attempt      INTEGER NOT NULL CHECK (attempt >= 1),
    status       TEXT NOT NULL DEFAULT 'running',
    input_ref    TEXT NOT NULL,
    output_ref   TEXT,
    error_kind   TEXT,
    error_detail TEXT,
    started_at   TEXT NOT NULL,
    finished_at  TEXT,
    duration_ms  INTEGER,
    UNIQUE (job_id, stage, retry_round, attempt)
);

-- Deferred "advance (job, stage)" messages
CREATE TABLE triggers (
    id               TEXT PRIMARY KEY,
    job_id           TEXT NOT NULL REFERENCES jobs(id) ON DELETE CASCADE,
    stage            TEXT NOT NULL,
    attempt          INTEGER,
    run_after_ms     INTEGER NOT NULL,
    locked_by        TEXT,
    lease_expires_ms INTEGER,
    deliveries       INTEGER NOT NULL DEFAULT 0,
    created_at       TEXT NOT NULL
);

CREATE INDEX idx_jobs_status        ON jobs(status);
CREATE INDEX idx_steps_job_stage    ON steps(job_id, stage);
CREATE INDEX idx_triggers_run_after ON triggers(run_after_ms);
CREATE INDEX idx_triggers_job       ON triggers(job_id);
"#;

/// V2: earliest time the next attempt of the current stage may start.
const V2_RETRY_GATE: &str = r#"
ALTER TABLE jobs ADD COLUMN retry_after_ms INTEGER;
"#;

/// Ordered list of (version, sql) pairs.
const MIGRATIONS: &[(i64, &str)] = &[(1, V1_INITIAL), (2, V2_RETRY_GATE)];

/// Run all pending migrations on `conn`.
///
/// Creates the `schema_migrations` tracking table if it does not exist,
/// then applies each outstanding migration inside a transaction.
pub fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version    INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
    )
    .map_err(|e| Error::database(format!("Failed to create schema_migrations: {e}")))?;

    for &(version, sql) in MIGRATIONS {
        let already: bool = conn
            .query_row(
                "SELECT COUNT(*) > 0 FROM schema_migrations WHERE version = ?1",
                [version],
                |row| row.get(0),
            )
            .map_err(|e| Error::database(e.to_string()))?;

        if already {
            continue;
        }

        let tx = conn
            .unchecked_transaction()
            .map_err(|e| Error::database(e.to_string()))?;

        tx.execute_batch(sql)
            .map_err(|e| Error::database(format!("Migration V{version} failed: {e}")))?;

        tx.execute(
            "INSERT INTO schema_migrations (version) VALUES (?1)",
            [version],
        )
        .map_err(|e| Error::database(e.to_string()))?;

        tx.commit().map_err(|e| Error::database(e.to_string()))?;
    }

    Ok(())
}
