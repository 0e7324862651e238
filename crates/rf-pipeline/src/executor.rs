//! The [`StageExecutor`] trait and the registry that maps stages to executors.
//!
//! An executor performs the work of exactly one [`Stage`]: it reads the
//! artifact named by its input reference, produces one output artifact, and
//! returns that artifact's key. Executors know nothing about jobs, steps,
//! retries or locks; the orchestrator owns all of that.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use rf_core::config::Config;
use rf_core::{Error, JobId, Result, Stage};
use rf_av::ToolRegistry;
use rf_providers::{AnalysisClient, TranscriptionClient};
use rf_store::ArtifactStore;

use crate::executors::{AnalyzeExecutor, ConvertExecutor, ExtractAudioExecutor, TranscribeExecutor};

/// Inputs for one stage attempt.
#[derive(Debug, Clone)]
pub struct StageContext {
    pub job_id: JobId,
    pub stage: Stage,
    /// 1-based attempt number within the current retry round.
    pub attempt: u32,
    /// Artifact key of the upload (Convert) or of the previous stage's output.
    pub input_ref: String,
}

/// Performs the work of a single pipeline stage.
///
/// Implementations must be idempotent: the output key is derived from the
/// job and stage only, and an executor that finds its output already stored
/// returns that key without redoing the work.
#[async_trait]
pub trait StageExecutor: Send + Sync {
    /// The stage this executor handles.
    fn stage(&self) -> Stage;

    /// Run the stage and return the output artifact key.
    ///
    /// The returned error's [`kind`](Error::kind) decides whether the attempt
    /// is retried.
    async fn run(&self, ctx: &StageContext) -> Result<String>;
}

/// Stage-to-executor lookup.
#[derive(Clone, Default)]
pub struct ExecutorRegistry {
    executors: HashMap<Stage, Arc<dyn StageExecutor>>,
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `executor` for the stage it reports, replacing any previous
    /// registration.
    pub fn register(&mut self, executor: Arc<dyn StageExecutor>) -> &mut Self {
        self.executors.insert(executor.stage(), executor);
        self
    }

    /// Look up the executor for `stage`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] if nothing is registered for the stage.
    pub fn get(&self, stage: Stage) -> Result<Arc<dyn StageExecutor>> {
        self.executors
            .get(&stage)
            .cloned()
            .ok_or_else(|| Error::Validation(format!("no executor registered for stage {stage}")))
    }

    /// Stages that have an executor, in pipeline order.
    pub fn stages(&self) -> Vec<Stage> {
        Stage::ALL
            .into_iter()
            .filter(|s| self.executors.contains_key(s))
            .collect()
    }

    /// Build the production registry: ffmpeg for Convert and ExtractAudio,
    /// the given provider clients for Transcribe and Analyze.
    ///
    /// ffmpeg availability is checked when a stage runs, so a host without
    /// it fails those attempts with a validation error instead of refusing
    /// to start.
    pub fn standard(
        config: &Config,
        tools: Arc<ToolRegistry>,
        store: Arc<dyn ArtifactStore>,
        transcriber: Arc<dyn TranscriptionClient>,
        analyzer: Arc<dyn AnalysisClient>,
    ) -> Self {
        let mut registry = Self::new();
        registry
            .register(Arc::new(ConvertExecutor::new(
                tools.clone(),
                store.clone(),
                config.convert.clone(),
            )))
            .register(Arc::new(ExtractAudioExecutor::new(
                tools,
                store.clone(),
                config.audio.clone(),
            )))
            .register(Arc::new(TranscribeExecutor::new(
                transcriber,
                store.clone(),
                (&config.transcription).into(),
            )))
            .register(Arc::new(AnalyzeExecutor::new(analyzer, store)));
        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Noop(Stage);

    #[async_trait]
    impl StageExecutor for Noop {
        fn stage(&self) -> Stage {
            self.0
        }

        async fn run(&self, ctx: &StageContext) -> Result<String> {
            Ok(format!("jobs/{}/{}", ctx.job_id, self.0))
        }
    }

    #[test]
    fn missing_stage_is_validation_error() {
        let registry = ExecutorRegistry::new();
        let err = registry.get(Stage::Convert).err().unwrap();
        assert_eq!(err.kind(), rf_core::ErrorKind::ValidationError);
    }

    #[tokio::test]
    async fn register_replaces_and_orders() {
        let mut registry = ExecutorRegistry::new();
        registry
            .register(Arc::new(Noop(Stage::Analyze)))
            .register(Arc::new(Noop(Stage::Convert)))
            .register(Arc::new(Noop(Stage::Convert)));
        assert_eq!(registry.stages(), vec![Stage::Convert, Stage::Analyze]);

        let job_id = JobId::new();
        let ctx = StageContext {
            job_id,
            stage: Stage::Analyze,
            attempt: 1,
            input_ref: "in".into(),
        };
        let out = registry.get(Stage::Analyze).unwrap().run(&ctx).await.unwrap();
        assert_eq!(out, format!("jobs/{job_id}/analyze"));
    }
}
