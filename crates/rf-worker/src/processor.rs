//! Trigger processor.
//!
//! Polls the trigger queue, hands each delivery to the orchestrator, and
//! acks it. A delivery is deferred instead when the job is locked elsewhere,
//! its stage is still backing off after a failure, or the call failed.
//! Several processors run side by side; the per-job lock keeps them from
//! working on the same job at once.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use rf_pipeline::Outcome;

use crate::context::WorkerContext;

/// Run one processor until the cancellation token is triggered.
///
/// A stage already in progress is finished before the processor stops.
pub async fn run_processor(ctx: WorkerContext, worker_id: String, cancel: CancellationToken) {
    tracing::info!(worker_id = %worker_id, "Trigger processor started");
    let idle = Duration::from_millis(ctx.config.worker.poll_interval_ms);

    loop {
        if cancel.is_cancelled() {
            break;
        }

        match process_next_trigger(&ctx, &worker_id).await {
            Ok(true) => {
                // Handled a trigger; immediately check for the next one.
                continue;
            }
            Ok(false) => {}
            Err(e) => {
                tracing::error!(worker_id = %worker_id, "Trigger processor error: {e}");
            }
        }

        tokio::select! {
            _ = tokio::time::sleep(idle) => {}
            _ = cancel.cancelled() => { break; }
        }
    }

    tracing::info!(worker_id = %worker_id, "Trigger processor stopped");
}

/// Dequeue and handle the next due trigger.
///
/// Returns `Ok(true)` if a trigger was handled, `Ok(false)` if none was due.
pub async fn process_next_trigger(ctx: &WorkerContext, worker_id: &str) -> rf_core::Result<bool> {
    let Some(trigger) = ctx.queue.dequeue(worker_id, ctx.config.worker.lease())? else {
        return Ok(false);
    };

    tracing::debug!(
        worker_id,
        trigger_id = %trigger.id,
        job_id = %trigger.job_id,
        stage = %trigger.stage,
        attempt = ?trigger.attempt,
        deliveries = trigger.deliveries,
        "Trigger delivered"
    );

    match ctx
        .orchestrator
        .advance(trigger.job_id, trigger.stage, trigger.attempt)
        .await
    {
        Ok(Outcome::Busy) => {
            ctx.queue.defer(trigger.id, ctx.busy_defer())?;
        }
        Ok(Outcome::Deferred { delay }) => {
            tracing::debug!(job_id = %trigger.job_id, stage = %trigger.stage, ?delay, "Trigger deferred until retry is due");
            ctx.queue.defer(trigger.id, delay)?;
        }
        Ok(outcome) => {
            tracing::debug!(job_id = %trigger.job_id, stage = %trigger.stage, ?outcome, "Trigger handled");
            ctx.queue.ack(trigger.id)?;
        }
        Err(e) => {
            tracing::error!(
                job_id = %trigger.job_id,
                stage = %trigger.stage,
                error = %e,
                "Advance failed; trigger will be redelivered"
            );
            ctx.queue.defer(trigger.id, ctx.busy_defer())?;
        }
    }

    Ok(true)
}

/// Handle triggers until none is due. Returns how many were handled.
pub async fn drain(ctx: &WorkerContext, worker_id: &str) -> rf_core::Result<usize> {
    let mut handled = 0;
    while process_next_trigger(ctx, worker_id).await? {
        handled += 1;
    }
    Ok(handled)
}
