//! Shared test harness for integration tests.
//!
//! Provides [`TestHarness`], which wires a full [`WorkerContext`] over an
//! in-memory DB and a [`MemoryArtifactStore`], with one [`Scripted`]
//! executor per stage. Retry delays and busy deferrals are zero so that
//! [`TestHarness::drain`] runs a job to its end without sleeping.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use rf_av::ToolRegistry;
use rf_core::config::Config;
use rf_core::{Error, ErrorKind, JobId, RecordingId, Result, Stage};
use rf_db::models::{Job, Step};
use rf_db::pool::{get_conn, init_memory_pool, DbPool, PooledConnection};
use rf_db::queries::{jobs, steps};
use rf_pipeline::{ExecutorRegistry, StageContext, StageExecutor};
use rf_store::{keys, ArtifactStore, MemoryArtifactStore};
use rf_worker::WorkerContext;

/// Build the error a real executor would return for `kind`.
pub fn error_for(kind: ErrorKind) -> Error {
    match kind {
        ErrorKind::TransientInfra => Error::Storage("disk unavailable".into()),
        ErrorKind::ExternalServiceTransient => Error::provider("fake", Some(503), "unavailable"),
        ErrorKind::ExternalServiceFatal => Error::provider("fake", Some(400), "rejected"),
        ErrorKind::ValidationError => Error::Validation("bad input".into()),
    }
}

/// Stage executor that fails according to a script, then writes a small
/// artifact under the stage's content key.
pub struct Scripted {
    stage: Stage,
    store: Arc<MemoryArtifactStore>,
    failures: Mutex<VecDeque<ErrorKind>>,
    inputs: Mutex<Vec<String>>,
    delay: Mutex<Duration>,
}

impl Scripted {
    pub fn new(stage: Stage, store: Arc<MemoryArtifactStore>) -> Self {
        Self {
            stage,
            store,
            failures: Mutex::new(VecDeque::new()),
            inputs: Mutex::new(Vec::new()),
            delay: Mutex::new(Duration::ZERO),
        }
    }

    /// Fail the next calls with these kinds, in order.
    pub fn fail_next(&self, kinds: &[ErrorKind]) {
        self.failures.lock().extend(kinds.iter().copied());
    }

    /// Sleep this long inside every call.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = delay;
    }

    pub fn calls(&self) -> usize {
        self.inputs.lock().len()
    }

    /// Input refs of every call, in order.
    pub fn inputs(&self) -> Vec<String> {
        self.inputs.lock().clone()
    }
}

#[async_trait]
impl StageExecutor for Scripted {
    fn stage(&self) -> Stage {
        self.stage
    }

    async fn run(&self, ctx: &StageContext) -> Result<String> {
        self.inputs.lock().push(ctx.input_ref.clone());

        let delay = *self.delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let failure = self.failures.lock().pop_front();
        if let Some(kind) = failure {
            return Err(error_for(kind));
        }

        let key = keys::stage_output(ctx.job_id, self.stage);
        let body = format!("{} of {}", self.stage, ctx.input_ref);
        self.store.put(&key, body.as_bytes()).await
    }
}

/// Config with no waiting anywhere: zero retry delay and zero busy deferral.
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.retry.max_attempts = 3;
    config.retry.base_delay_ms = 0;
    config.retry.max_delay_ms = 0;
    config.retry.jitter_ratio = 0.0;
    config.worker.busy_defer_ms = 0;
    config.worker.poll_interval_ms = 10;
    config
}

/// Test harness wrapping a fully-constructed [`WorkerContext`] backed by an
/// in-memory database and artifact store.
pub struct TestHarness {
    pub ctx: WorkerContext,
    pub db: DbPool,
    pub store: Arc<MemoryArtifactStore>,
    scripted: HashMap<Stage, Arc<Scripted>>,
}

impl TestHarness {
    /// Harness with a [`Scripted`] executor for every stage.
    pub fn new() -> Self {
        Self::with_executors(|_, _| {})
    }

    /// Harness with scripted executors running under `config`.
    pub fn with_config(config: Config) -> Self {
        Self::build(config, |_, _| {})
    }

    /// Harness whose registry starts with [`Scripted`] executors for every
    /// stage; `customize` may register replacements.
    pub fn with_executors(
        customize: impl FnOnce(&mut ExecutorRegistry, Arc<MemoryArtifactStore>),
    ) -> Self {
        Self::build(test_config(), customize)
    }

    fn build(
        config: Config,
        customize: impl FnOnce(&mut ExecutorRegistry, Arc<MemoryArtifactStore>),
    ) -> Self {
        let db = init_memory_pool().expect("failed to create in-memory pool");
        let store = Arc::new(MemoryArtifactStore::new());

        let mut executors = ExecutorRegistry::new();
        let mut scripted = HashMap::new();
        for stage in Stage::ALL {
            let executor = Arc::new(Scripted::new(stage, store.clone()));
            executors.register(executor.clone());
            scripted.insert(stage, executor);
        }
        customize(&mut executors, store.clone());

        let ctx = WorkerContext::new(
            config,
            db.clone(),
            store.clone(),
            Arc::new(ToolRegistry::default()),
            executors,
        );

        Self {
            ctx,
            db,
            store,
            scripted,
        }
    }

    pub fn conn(&self) -> PooledConnection {
        get_conn(&self.db).expect("failed to get connection")
    }

    /// The scripted executor registered for `stage`.
    pub fn executor(&self, stage: Stage) -> &Scripted {
        self.scripted
            .get(&stage)
            .expect("every stage has a scripted executor")
    }

    /// Store an upload for a fresh recording and submit it.
    pub async fn submit(&self) -> Job {
        let recording_id = RecordingId::new();
        let upload_ref = keys::upload(recording_id, "talk.webm");
        self.store
            .put(&upload_ref, b"webm bytes")
            .await
            .expect("failed to store upload");
        let (job, created) = self
            .ctx
            .orchestrator
            .submit(recording_id, &upload_ref)
            .await
            .expect("submit failed");
        assert!(created);
        job
    }

    /// Deliver triggers until none is due. Returns how many were handled.
    pub async fn drain(&self) -> usize {
        rf_worker::processor::drain(&self.ctx, "test-worker")
            .await
            .expect("drain failed")
    }

    pub fn job(&self, id: JobId) -> Job {
        jobs::get_job(&self.conn(), id)
            .expect("job query failed")
            .expect("job exists")
    }

    pub fn steps(&self, id: JobId) -> Vec<Step> {
        steps::list_steps(&self.conn(), id).expect("step query failed")
    }

    /// Steps of one stage, in attempt order.
    pub fn stage_steps(&self, id: JobId, stage: Stage) -> Vec<Step> {
        self.steps(id)
            .into_iter()
            .filter(|s| s.stage == stage)
            .collect()
    }
}
