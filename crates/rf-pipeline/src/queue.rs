//! Trigger scheduling.
//!
//! The orchestrator never calls itself: to move a job forward it schedules a
//! trigger for (job, stage), optionally after a delay, and a worker later
//! delivers that trigger back to [`Orchestrator::advance`]. Delivery is
//! at-least-once, so duplicates must be harmless.
//!
//! [`Orchestrator::advance`]: crate::Orchestrator::advance

use std::time::Duration;

use async_trait::async_trait;
use rf_core::{JobId, Result, Stage, TriggerId};
use rf_db::models::Trigger;
use rf_db::pool::{get_conn, DbPool};
use rf_db::queries::{now_ms, triggers};

/// Destination for "advance this job later" requests.
#[async_trait]
pub trait TriggerSink: Send + Sync {
    /// Schedule a delivery of (job, stage) after `delay`.
    ///
    /// `attempt` names the attempt the delivery is for, or `None` when the
    /// job should just make progress. The orchestrator still derives the
    /// attempt it runs from the recorded steps.
    async fn schedule(
        &self,
        job_id: JobId,
        stage: Stage,
        attempt: Option<u32>,
        delay: Duration,
    ) -> Result<()>;
}

/// [`TriggerSink`] backed by the `triggers` table.
#[derive(Clone)]
pub struct DbTriggerQueue {
    pool: DbPool,
}

impl DbTriggerQueue {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Lease the next due trigger to `worker` for `lease`.
    pub fn dequeue(&self, worker: &str, lease: Duration) -> Result<Option<Trigger>> {
        let conn = get_conn(&self.pool)?;
        triggers::dequeue_next(&conn, worker, now_ms(), duration_ms(lease))
    }

    /// Drop a handled trigger.
    pub fn ack(&self, id: TriggerId) -> Result<bool> {
        let conn = get_conn(&self.pool)?;
        triggers::ack(&conn, id)
    }

    /// Release a leased trigger for redelivery after `delay`.
    pub fn defer(&self, id: TriggerId, delay: Duration) -> Result<bool> {
        let conn = get_conn(&self.pool)?;
        triggers::defer(&conn, id, now_ms() + duration_ms(delay))
    }

    /// Queued triggers, leased or not.
    pub fn depth(&self) -> Result<i64> {
        let conn = get_conn(&self.pool)?;
        triggers::count_pending(&conn)
    }
}

#[async_trait]
impl TriggerSink for DbTriggerQueue {
    async fn schedule(
        &self,
        job_id: JobId,
        stage: Stage,
        attempt: Option<u32>,
        delay: Duration,
    ) -> Result<()> {
        let conn = get_conn(&self.pool)?;
        let trigger = triggers::enqueue(&conn, job_id, stage, attempt, now_ms() + duration_ms(delay))?;
        tracing::debug!(
            trigger_id = %trigger.id,
            %job_id,
            %stage,
            delay_ms = duration_ms(delay),
            "trigger scheduled"
        );
        Ok(())
    }
}

fn duration_ms(d: Duration) -> i64 {
    i64::try_from(d.as_millis()).unwrap_or(i64::MAX)
}
