//! # rf-providers
//!
//! Clients for the external services behind the Transcribe and Analyze
//! stages.
//!
//! - [`TranscriptionClient`] turns audio bytes into a [`Transcript`];
//!   [`DeepgramClient`] is the production adapter.
//! - [`AnalysisClient`] turns transcript text into one typed
//!   [`AnalysisResult`] per [`AnalysisKind`]; [`GeminiClient`] is the
//!   production adapter.
//!
//! Both adapters surface non-2xx responses as [`rf_core::Error::Provider`]
//! carrying the HTTP status, so that `Error::kind()` tells retryable
//! (5xx, 429, network) from fatal (other 4xx) failures.

pub mod analysis;
pub mod deepgram;
pub mod gemini;
mod http;
pub mod transcript;

use async_trait::async_trait;
use rf_core::Result;

pub use analysis::{ActionItem, AnalysisKind, AnalysisResult, Sentiment};
pub use deepgram::DeepgramClient;
pub use gemini::GeminiClient;
pub use transcript::{Segment, Transcript};

/// Options passed with each transcription request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptionOptions {
    pub language: String,
    pub diarize: bool,
    pub punctuate: bool,
    pub smart_format: bool,
    /// MIME type of the audio payload.
    pub content_type: String,
}

impl Default for TranscriptionOptions {
    fn default() -> Self {
        Self {
            language: "en".into(),
            diarize: true,
            punctuate: true,
            smart_format: true,
            content_type: "audio/wav".into(),
        }
    }
}

impl From<&rf_core::config::TranscriptionConfig> for TranscriptionOptions {
    fn from(cfg: &rf_core::config::TranscriptionConfig) -> Self {
        Self {
            language: cfg.language.clone(),
            diarize: cfg.diarize,
            punctuate: cfg.punctuate,
            smart_format: cfg.smart_format,
            content_type: "audio/wav".into(),
        }
    }
}

/// Speech-to-text provider.
#[async_trait]
pub trait TranscriptionClient: Send + Sync {
    async fn transcribe(&self, audio: Vec<u8>, options: &TranscriptionOptions) -> Result<Transcript>;
}

/// Transcript analysis provider.
#[async_trait]
pub trait AnalysisClient: Send + Sync {
    /// Produce the `kind` analysis of a speaker-formatted transcript.
    async fn analyze(&self, kind: AnalysisKind, transcript: &str) -> Result<AnalysisResult>;
}
