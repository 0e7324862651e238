//! Deepgram pre-recorded transcription adapter.

use std::time::Duration;

use async_trait::async_trait;
use rf_core::config::TranscriptionConfig;
use rf_core::{Error, Result};
use serde::Deserialize;

use crate::http;
use crate::transcript::{Segment, Transcript};
use crate::{TranscriptionClient, TranscriptionOptions};

const PROVIDER: &str = "deepgram";

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct DeepgramClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    timeout: Duration,
}

impl DeepgramClient {
    /// Build a client from config. Fails if no API key is configured.
    pub fn new(cfg: &TranscriptionConfig) -> Result<Self> {
        let api_key = cfg
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| Error::Validation("transcription.api_key is not configured".into()))?;
        let timeout = Duration::from_secs(cfg.timeout_secs);
        Ok(Self {
            http: http::build_client(timeout)?,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            api_key,
            model: cfg.model.clone(),
            timeout,
        })
    }
}

#[async_trait]
impl TranscriptionClient for DeepgramClient {
    async fn transcribe(&self, audio: Vec<u8>, options: &TranscriptionOptions) -> Result<Transcript> {
        let url = format!("{}/v1/listen", self.base_url);
        let flag = |b: bool| if b { "true" } else { "false" };
        let params: Vec<(&str, &str)> = vec![
            ("model", self.model.as_str()),
            ("language", options.language.as_str()),
            ("smart_format", flag(options.smart_format)),
            ("punctuate", flag(options.punctuate)),
            ("diarize", flag(options.diarize)),
            ("utterances", "true"),
        ];

        tracing::debug!(bytes = audio.len(), model = %self.model, "sending audio to deepgram");

        let resp = self
            .http
            .post(&url)
            .query(&params)
            .header("Authorization", format!("Token {}", self.api_key))
            .header("Content-Type", options.content_type.as_str())
            .body(audio)
            .send()
            .await
            .map_err(|e| http::send_error(PROVIDER, self.timeout, e))?;

        let resp = http::check_status(PROVIDER, resp).await?;
        let body: ListenResponse = http::json(PROVIDER, resp).await?;
        body.into_transcript()
    }
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ListenResponse {
    #[serde(default)]
    metadata: Option<ListenMetadata>,
    results: ListenResults,
}

#[derive(Debug, Deserialize)]
struct ListenMetadata {
    duration: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ListenResults {
    channels: Vec<Channel>,
    #[serde(default)]
    utterances: Vec<Utterance>,
}

#[derive(Debug, Deserialize)]
struct Channel {
    alternatives: Vec<Alternative>,
}

#[derive(Debug, Deserialize)]
struct Alternative {
    transcript: String,
    confidence: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct Utterance {
    start: f64,
    end: f64,
    transcript: String,
    speaker: Option<u32>,
}

fn secs_to_ms(secs: f64) -> u64 {
    (secs.max(0.0) * 1000.0).round() as u64
}

impl ListenResponse {
    fn into_transcript(self) -> Result<Transcript> {
        let alt = self
            .results
            .channels
            .into_iter()
            .next()
            .and_then(|c| c.alternatives.into_iter().next())
            .ok_or_else(|| Error::provider(PROVIDER, None, "response has no alternatives"))?;

        let segments = self
            .results
            .utterances
            .into_iter()
            .map(|u| Segment {
                start_ms: secs_to_ms(u.start),
                end_ms: secs_to_ms(u.end),
                speaker_id: u.speaker,
                text: u.transcript,
            })
            .collect();

        Ok(Transcript {
            full_text: alt.transcript,
            confidence: alt.confidence,
            duration_ms: self.metadata.and_then(|m| m.duration).map(secs_to_ms),
            segments,
        })
    }
}
