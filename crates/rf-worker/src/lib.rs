//! rf-worker: the long-running trigger processor pool.
//!
//! This crate ties the other rf-* crates into a running worker process. It
//! provides:
//!
//! - [`WorkerContext`] -- shared infrastructure plus the orchestrator
//! - A pool of trigger processors that deliver queued triggers to
//!   [`Orchestrator::advance`](rf_pipeline::Orchestrator::advance)
//! - A periodic recovery sweep for jobs whose trigger was lost
//! - Graceful shutdown via signal handling

pub mod context;
pub mod processor;
pub mod recovery;

use std::sync::Arc;

use rf_av::ToolRegistry;
use rf_core::config::Config;
use rf_pipeline::ExecutorRegistry;
use rf_providers::{DeepgramClient, GeminiClient};
use rf_store::{ArtifactStore, FsArtifactStore};
use tokio_util::sync::CancellationToken;

pub use context::WorkerContext;

/// Start the worker pool.
///
/// Opens the database and artifact store, builds the production executors,
/// and runs `worker.concurrency` processors plus the recovery sweep until
/// SIGINT or SIGTERM.
pub async fn start(config: Config) -> rf_core::Result<()> {
    for warning in config.validate() {
        tracing::warn!("Config warning: {warning}");
    }

    let db = context::open_database(&config)?;
    context::ensure_storage_root(&config.storage.root)?;
    let store: Arc<dyn ArtifactStore> = Arc::new(FsArtifactStore::new(config.storage.root.clone()));

    // Discover external tools.
    let tools = Arc::new(ToolRegistry::discover(&config.tools));
    for info in tools.check_all() {
        if info.available {
            tracing::info!(
                "Tool found: {} ({})",
                info.name,
                info.version.as_deref().unwrap_or("unknown version")
            );
        } else {
            tracing::warn!("Tool not found: {}; convert and extract_audio will fail", info.name);
        }
    }

    let transcriber = Arc::new(DeepgramClient::new(&config.transcription)?);
    let analyzer = Arc::new(GeminiClient::new(&config.analysis)?);
    let executors =
        ExecutorRegistry::standard(&config, tools.clone(), store.clone(), transcriber, analyzer);

    let ctx = WorkerContext::new(config, db, store, tools, executors);

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        signal_cancel.cancel();
    });

    run_workers(ctx, cancel).await;
    Ok(())
}

/// Run the processor pool and recovery sweep until `cancel` fires, then wait
/// for in-flight stages to finish.
pub async fn run_workers(ctx: WorkerContext, cancel: CancellationToken) {
    let concurrency = ctx.config.worker.concurrency;
    tracing::info!(concurrency, "Starting worker pool");

    let mut handles = Vec::with_capacity(concurrency + 1);
    let host = std::process::id();
    for n in 0..concurrency {
        let worker_id = format!("rf-worker-{host}-{n}");
        handles.push(tokio::spawn(processor::run_processor(
            ctx.clone(),
            worker_id,
            cancel.clone(),
        )));
    }
    handles.push(tokio::spawn(recovery::run_recovery(ctx.clone(), cancel.clone())));

    for handle in handles {
        if let Err(e) = handle.await {
            tracing::error!("Worker task panicked: {e}");
        }
    }

    tracing::info!("Worker pool shutdown complete");
}

/// Wait for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
