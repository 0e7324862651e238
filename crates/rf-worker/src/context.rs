//! Shared worker state.
//!
//! [`WorkerContext`] wraps the long-lived infrastructure (DB pool, artifact
//! store, tools, event bus) and the orchestrator built on top of it. It is
//! cheap to clone and handed to every background task.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use rf_av::ToolRegistry;
use rf_core::config::Config;
use rf_core::events::EventBus;
use rf_core::{Error, Result};
use rf_db::pool::DbPool;
use rf_pipeline::{DbTriggerQueue, ExecutorRegistry, Orchestrator, RetryPolicy};
use rf_store::ArtifactStore;

#[derive(Clone)]
pub struct WorkerContext {
    pub db: DbPool,
    pub config: Arc<Config>,
    pub store: Arc<dyn ArtifactStore>,
    pub tools: Arc<ToolRegistry>,
    pub event_bus: Arc<EventBus>,
    pub queue: DbTriggerQueue,
    pub orchestrator: Arc<Orchestrator>,
}

impl WorkerContext {
    /// Wire an orchestrator over `db` with the retry policy and lock lease
    /// from `config`.
    pub fn new(
        config: Config,
        db: DbPool,
        store: Arc<dyn ArtifactStore>,
        tools: Arc<ToolRegistry>,
        executors: ExecutorRegistry,
    ) -> Self {
        let event_bus = Arc::new(EventBus::default());
        let queue = DbTriggerQueue::new(db.clone());
        let orchestrator = Orchestrator::new(
            db.clone(),
            executors,
            Arc::new(queue.clone()),
            event_bus.clone(),
        )
        .with_policy(RetryPolicy::from(&config.retry))
        .with_lock_lease(config.worker.lock_lease());

        Self {
            db,
            config: Arc::new(config),
            store,
            tools,
            event_bus,
            queue,
            orchestrator: Arc::new(orchestrator),
        }
    }

    /// Delay before a trigger for a locked job is redelivered.
    pub fn busy_defer(&self) -> Duration {
        Duration::from_millis(self.config.worker.busy_defer_ms)
    }
}

/// Open (creating if needed) the SQLite database named in `config`.
pub fn open_database(config: &Config) -> Result<DbPool> {
    let db_path = &config.database.path;
    if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        if !parent.exists() {
            std::fs::create_dir_all(parent).map_err(|e| Error::Io { source: e })?;
            tracing::info!("Created database directory {}", parent.display());
        }
    }
    let existed = db_path.exists();
    let pool_size = u32::try_from(config.worker.concurrency + 2).unwrap_or(u32::MAX);
    let db = rf_db::pool::init_pool(&db_path.to_string_lossy(), pool_size)?;
    if existed {
        tracing::info!("Database opened (existing) at {}", db_path.display());
    } else {
        tracing::info!("Database created (new) at {}", db_path.display());
    }
    Ok(db)
}

/// Create the artifact root if it does not exist.
pub fn ensure_storage_root(root: &Path) -> Result<()> {
    if !root.exists() {
        std::fs::create_dir_all(root).map_err(|e| Error::Io { source: e })?;
        tracing::info!("Created artifact directory {}", root.display());
    }
    Ok(())
}
