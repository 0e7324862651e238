//! Convert: normalize the uploaded recording to a streamable MP4.

use std::sync::Arc;

use async_trait::async_trait;
use rf_av::{transcode, ToolRegistry, Workspace};
use rf_core::config::ConvertConfig;
use rf_core::{Result, Stage};
use rf_store::{keys, ArtifactStore};

use super::{cached_output, input_file_name};
use crate::executor::{StageContext, StageExecutor};

pub struct ConvertExecutor {
    tools: Arc<ToolRegistry>,
    store: Arc<dyn ArtifactStore>,
    config: ConvertConfig,
}

impl ConvertExecutor {
    pub fn new(tools: Arc<ToolRegistry>, store: Arc<dyn ArtifactStore>, config: ConvertConfig) -> Self {
        Self { tools, store, config }
    }
}

#[async_trait]
impl StageExecutor for ConvertExecutor {
    fn stage(&self) -> Stage {
        Stage::Convert
    }

    async fn run(&self, ctx: &StageContext) -> Result<String> {
        let key = keys::stage_output(ctx.job_id, Stage::Convert);
        if let Some(key) = cached_output(self.store.as_ref(), &key).await? {
            return Ok(key);
        }

        let ws = Workspace::new("convert")?;
        let input = ws.file(&input_file_name(&ctx.input_ref));
        let output = ws.file(keys::stage_file_name(Stage::Convert));

        self.store.fetch_to(&ctx.input_ref, &input).await?;
        transcode(&self.tools, &input, &output, &self.config).await?;
        self.store.put_file(&key, &output).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rf_core::{ErrorKind, JobId};
    use rf_store::MemoryArtifactStore;

    fn ctx(job_id: JobId) -> StageContext {
        StageContext {
            job_id,
            stage: Stage::Convert,
            attempt: 1,
            input_ref: "uploads/rec/screen.webm".into(),
        }
    }

    #[tokio::test]
    async fn reuses_stored_output() {
        let store = Arc::new(MemoryArtifactStore::new());
        let job_id = JobId::new();
        let key = keys::stage_output(job_id, Stage::Convert);
        store.put(&key, b"mp4").await.unwrap();

        let exec = ConvertExecutor::new(
            Arc::new(ToolRegistry::default()),
            store.clone(),
            ConvertConfig::default(),
        );
        assert_eq!(exec.run(&ctx(job_id)).await.unwrap(), key);
        assert_eq!(store.put_count(), 1);
    }

    #[tokio::test]
    async fn missing_input_is_validation_error() {
        let exec = ConvertExecutor::new(
            Arc::new(ToolRegistry::default()),
            Arc::new(MemoryArtifactStore::new()),
            ConvertConfig::default(),
        );
        let err = exec.run(&ctx(JobId::new())).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValidationError);
    }

    #[tokio::test]
    async fn missing_ffmpeg_is_validation_error() {
        let store = Arc::new(MemoryArtifactStore::new());
        store.put("uploads/rec/screen.webm", b"webm").await.unwrap();
        let exec = ConvertExecutor::new(
            Arc::new(ToolRegistry::default()),
            store,
            ConvertConfig::default(),
        );
        let err = exec.run(&ctx(JobId::new())).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValidationError);
    }
}
