//! ExtractAudio: pull a speech-ready WAV track out of the converted video.

use std::sync::Arc;

use async_trait::async_trait;
use rf_av::{extract_audio, ToolRegistry, Workspace};
use rf_core::config::AudioConfig;
use rf_core::{Result, Stage};
use rf_store::{keys, ArtifactStore};

use super::{cached_output, input_file_name};
use crate::executor::{StageContext, StageExecutor};

pub struct ExtractAudioExecutor {
    tools: Arc<ToolRegistry>,
    store: Arc<dyn ArtifactStore>,
    config: AudioConfig,
}

impl ExtractAudioExecutor {
    pub fn new(tools: Arc<ToolRegistry>, store: Arc<dyn ArtifactStore>, config: AudioConfig) -> Self {
        Self { tools, store, config }
    }
}

#[async_trait]
impl StageExecutor for ExtractAudioExecutor {
    fn stage(&self) -> Stage {
        Stage::ExtractAudio
    }

    async fn run(&self, ctx: &StageContext) -> Result<String> {
        let key = keys::stage_output(ctx.job_id, Stage::ExtractAudio);
        if let Some(key) = cached_output(self.store.as_ref(), &key).await? {
            return Ok(key);
        }

        let ws = Workspace::new("audio")?;
        let input = ws.file(&input_file_name(&ctx.input_ref));
        let output = ws.file(keys::stage_file_name(Stage::ExtractAudio));

        self.store.fetch_to(&ctx.input_ref, &input).await?;
        extract_audio(&self.tools, &input, &output, &self.config).await?;
        self.store.put_file(&key, &output).await
    }
}
