//! Gemini `generateContent` analysis adapter.
//!
//! Rate-limited per client so the four concurrent analyses of a job, and
//! other jobs sharing the client, stay under the provider quota.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use governor::{Quota, RateLimiter};
use rf_core::config::AnalysisConfig;
use rf_core::{Error, Result};
use serde::{Deserialize, Serialize};

use crate::analysis::{AnalysisKind, AnalysisResult};
use crate::http;
use crate::AnalysisClient;

const PROVIDER: &str = "gemini";

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct GeminiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    timeout: Duration,
    limiter: Arc<RateLimiter<governor::state::NotKeyed, governor::state::InMemoryState, governor::clock::DefaultClock>>,
}

impl GeminiClient {
    /// Build a client from config. Fails if no API key is configured.
    pub fn new(cfg: &AnalysisConfig) -> Result<Self> {
        let api_key = cfg
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| Error::Validation("analysis.api_key is not configured".into()))?;
        let rps = NonZeroU32::new(cfg.requests_per_second).unwrap_or(NonZeroU32::MIN);
        let timeout = Duration::from_secs(cfg.timeout_secs);
        Ok(Self {
            http: http::build_client(timeout)?,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            api_key,
            model: cfg.model.clone(),
            timeout,
            limiter: Arc::new(RateLimiter::direct(Quota::per_second(rps))),
        })
    }

    async fn generate(&self, prompt: String) -> Result<String> {
        self.limiter.until_ready().await;

        let url = format!("{}/v1beta/models/{}:generateContent", self.base_url, self.model);
        let request = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part { text: prompt }],
            }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json",
            },
        };

        let resp = self
            .http
            .post(&url)
            .header("x-goog-api-key", self.api_key.as_str())
            .json(&request)
            .send()
            .await
            .map_err(|e| http::send_error(PROVIDER, self.timeout, e))?;

        let resp = http::check_status(PROVIDER, resp).await?;
        let body: GenerateResponse = http::json(PROVIDER, resp).await?;

        if let Some(total) = body.usage_metadata.as_ref().and_then(|u| u.total_token_count) {
            tracing::debug!(tokens = total, model = %self.model, "gemini usage");
        }

        body.candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().map(|p| p.text).collect::<String>())
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| Error::provider(PROVIDER, None, "response has no candidate text"))
    }
}

#[async_trait]
impl AnalysisClient for GeminiClient {
    async fn analyze(&self, kind: AnalysisKind, transcript: &str) -> Result<AnalysisResult> {
        let text = self.generate(kind.prompt(transcript)).await?;
        kind.parse(&text)
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: &'static str,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    total_token_count: Option<u64>,
}
