//! Transcribe: send the extracted audio to the speech-to-text provider and
//! store the transcript as JSON.

use std::sync::Arc;

use async_trait::async_trait;
use rf_core::{Error, Result, Stage};
use rf_providers::{TranscriptionClient, TranscriptionOptions};
use rf_store::{keys, ArtifactStore};

use super::cached_output;
use crate::executor::{StageContext, StageExecutor};

pub struct TranscribeExecutor {
    client: Arc<dyn TranscriptionClient>,
    store: Arc<dyn ArtifactStore>,
    options: TranscriptionOptions,
}

impl TranscribeExecutor {
    pub fn new(
        client: Arc<dyn TranscriptionClient>,
        store: Arc<dyn ArtifactStore>,
        options: TranscriptionOptions,
    ) -> Self {
        Self { client, store, options }
    }
}

#[async_trait]
impl StageExecutor for TranscribeExecutor {
    fn stage(&self) -> Stage {
        Stage::Transcribe
    }

    async fn run(&self, ctx: &StageContext) -> Result<String> {
        let key = keys::stage_output(ctx.job_id, Stage::Transcribe);
        if let Some(key) = cached_output(self.store.as_ref(), &key).await? {
            return Ok(key);
        }

        let audio = self.store.get(&ctx.input_ref).await?;
        let transcript = self.client.transcribe(audio, &self.options).await?;

        tracing::info!(
            job_id = %ctx.job_id,
            segments = transcript.segments.len(),
            speakers = transcript.speaker_count(),
            "transcription complete"
        );

        let bytes = serde_json::to_vec(&transcript)
            .map_err(|e| Error::Internal(format!("failed to encode transcript: {e}")))?;
        self.store.put(&key, &bytes).await
    }
}
