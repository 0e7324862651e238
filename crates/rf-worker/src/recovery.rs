//! Periodic sweep for jobs that lost their trigger.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::context::WorkerContext;

/// Re-queue stalled jobs every `worker.recovery_interval_secs` until
/// cancelled. The first sweep runs immediately.
pub async fn run_recovery(ctx: WorkerContext, cancel: CancellationToken) {
    let interval = Duration::from_secs(ctx.config.worker.recovery_interval_secs.max(1));

    loop {
        match ctx.orchestrator.recover().await {
            Ok(0) => {}
            Ok(n) => tracing::info!(jobs = n, "Re-queued stalled jobs"),
            Err(e) => tracing::error!("Recovery sweep failed: {e}"),
        }

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = cancel.cancelled() => { break; }
        }
    }

    tracing::debug!("Recovery sweep stopped");
}
