//! Analyze: run every [`AnalysisKind`] over the transcript.
//!
//! Each analysis is stored as its own artifact under
//! `jobs/{job}/analyze/{kind}.json`, and the stage output is a small
//! manifest pointing at the four parts. The stage is retried as a unit, but
//! a retry only calls the provider for parts that are not yet stored.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use rf_core::{Error, JobId, Result, Stage};
use rf_providers::{AnalysisClient, AnalysisKind, Transcript};
use rf_store::{keys, ArtifactStore};
use serde::{Deserialize, Serialize};

use super::cached_output;
use crate::executor::{StageContext, StageExecutor};

/// Stage output of Analyze: artifact keys of the individual analyses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisManifest {
    pub summary: String,
    pub action_items: String,
    pub key_points: String,
    pub sentiment: String,
}

impl AnalysisManifest {
    pub fn for_job(job_id: JobId) -> Self {
        let part = |kind: AnalysisKind| keys::analysis_part(job_id, kind.as_str());
        Self {
            summary: part(AnalysisKind::Summary),
            action_items: part(AnalysisKind::ActionItems),
            key_points: part(AnalysisKind::KeyPoints),
            sentiment: part(AnalysisKind::Sentiment),
        }
    }
}

pub struct AnalyzeExecutor {
    client: Arc<dyn AnalysisClient>,
    store: Arc<dyn ArtifactStore>,
}

impl AnalyzeExecutor {
    pub fn new(client: Arc<dyn AnalysisClient>, store: Arc<dyn ArtifactStore>) -> Self {
        Self { client, store }
    }

    async fn run_part(&self, job_id: JobId, kind: AnalysisKind, transcript: &str) -> Result<()> {
        let key = keys::analysis_part(job_id, kind.as_str());
        if self.store.exists(&key).await? {
            tracing::debug!(%job_id, %kind, "analysis part already stored");
            return Ok(());
        }
        let result = self.client.analyze(kind, transcript).await?;
        let bytes = serde_json::to_vec(&result)
            .map_err(|e| Error::Internal(format!("failed to encode {kind} result: {e}")))?;
        self.store.put(&key, &bytes).await?;
        Ok(())
    }
}

#[async_trait]
impl StageExecutor for AnalyzeExecutor {
    fn stage(&self) -> Stage {
        Stage::Analyze
    }

    async fn run(&self, ctx: &StageContext) -> Result<String> {
        let key = keys::stage_output(ctx.job_id, Stage::Analyze);
        if let Some(key) = cached_output(self.store.as_ref(), &key).await? {
            return Ok(key);
        }

        let raw = self.store.get(&ctx.input_ref).await?;
        let transcript: Transcript = serde_json::from_slice(&raw).map_err(|e| {
            Error::Validation(format!("transcript {} is not valid JSON: {e}", ctx.input_ref))
        })?;
        let text = transcript.format_for_analysis();

        let results = join_all(
            AnalysisKind::ALL
                .into_iter()
                .map(|kind| self.run_part(ctx.job_id, kind, &text)),
        )
        .await;

        let mut errors: Vec<Error> = results.into_iter().filter_map(|r| r.err()).collect();
        if !errors.is_empty() {
            for e in &errors {
                tracing::warn!(job_id = %ctx.job_id, error = %e, "analysis part failed");
            }
            // A fatal part makes a retry pointless, so it wins over transient ones.
            let idx = errors
                .iter()
                .position(|e| !e.kind().is_retryable())
                .unwrap_or(0);
            return Err(errors.swap_remove(idx));
        }

        let manifest = AnalysisManifest::for_job(ctx.job_id);
        let bytes = serde_json::to_vec_pretty(&manifest)
            .map_err(|e| Error::Internal(format!("failed to encode analysis manifest: {e}")))?;
        self.store.put(&key, &bytes).await
    }
}
