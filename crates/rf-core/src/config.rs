//! Application configuration types.
//!
//! The top-level [`Config`] struct is deserialized from JSON and carries all
//! sub-configs for storage, workers, retries, tools and providers. Every
//! section defaults sensibly so a completely empty `{}` file is valid.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::Result;
use crate::Error;

/// Environment variable overriding `transcription.api_key`.
pub const DEEPGRAM_API_KEY_ENV: &str = "DEEPGRAM_API_KEY";
/// Environment variable overriding `analysis.api_key`.
pub const GEMINI_API_KEY_ENV: &str = "GEMINI_API_KEY";

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub storage: StorageConfig,
    pub worker: WorkerConfig,
    pub retry: RetryConfig,
    pub tools: ToolsConfig,
    pub convert: ConvertConfig,
    pub audio: AudioConfig,
    pub transcription: TranscriptionConfig,
    pub analysis: AnalysisConfig,
}

impl Config {
    /// Deserialize a `Config` from a JSON string.
    pub fn from_json(json_str: &str) -> Result<Self> {
        serde_json::from_str(json_str)
            .map_err(|e| Error::Validation(format!("config parse error: {e}")))
    }

    /// Load configuration from a file path, falling back to defaults if the
    /// path is `None` or the file does not exist. API keys from the
    /// environment take precedence over the file.
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let mut config = match path {
            None => Self::default(),
            Some(path) => match std::fs::read_to_string(path) {
                Ok(contents) => Self::from_json(&contents).unwrap_or_else(|e| {
                    tracing::warn!("Failed to parse config file {}: {e}", path.display());
                    Self::default()
                }),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    tracing::info!("No config file at {}; using defaults", path.display());
                    Self::default()
                }
                Err(e) => {
                    tracing::warn!("Failed to read config file {}: {e}", path.display());
                    Self::default()
                }
            },
        };
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config
    }

    /// Overlay secrets from the environment. `lookup` is injectable so tests
    /// don't have to mutate the process environment.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(key) = lookup(DEEPGRAM_API_KEY_ENV).filter(|k| !k.is_empty()) {
            self.transcription.api_key = Some(key);
        }
        if let Some(key) = lookup(GEMINI_API_KEY_ENV).filter(|k| !k.is_empty()) {
            self.analysis.api_key = Some(key);
        }
    }

    /// Return a list of validation warnings (non-fatal issues).
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.worker.concurrency == 0 {
            warnings.push("worker.concurrency is 0; no triggers will be processed".into());
        }
        if self.retry.max_attempts == 0 {
            warnings.push("retry.max_attempts is 0; it will be treated as 1".into());
        }
        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            warnings.push(format!(
                "retry.base_delay_ms ({}) exceeds retry.max_delay_ms ({})",
                self.retry.base_delay_ms, self.retry.max_delay_ms
            ));
        }
        if !(0.0..=1.0).contains(&self.retry.jitter_ratio) {
            warnings.push(format!(
                "retry.jitter_ratio {} is outside 0.0..=1.0",
                self.retry.jitter_ratio
            ));
        }

        let longest_stage = self
            .convert
            .timeout_secs
            .max(self.audio.timeout_secs)
            .max(self.transcription.timeout_secs)
            .max(self.analysis.timeout_secs);
        if self.worker.lock_lease_secs <= longest_stage {
            warnings.push(format!(
                "worker.lock_lease_secs ({}) should exceed the longest stage timeout ({longest_stage}s)",
                self.worker.lock_lease_secs
            ));
        }
        if self.worker.lease_secs <= longest_stage {
            warnings.push(format!(
                "worker.lease_secs ({}) should exceed the longest stage timeout ({longest_stage}s)",
                self.worker.lease_secs
            ));
        }

        if self.transcription.api_key.is_none() {
            warnings.push(format!(
                "transcription.api_key is not set (or {DEEPGRAM_API_KEY_ENV}); transcribe will fail"
            ));
        }
        if self.analysis.api_key.is_none() {
            warnings.push(format!(
                "analysis.api_key is not set (or {GEMINI_API_KEY_ENV}); analyze will fail"
            ));
        }
        if self.analysis.requests_per_second == 0 {
            warnings.push("analysis.requests_per_second is 0; it will be treated as 1".into());
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// SQLite database location.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/recforge.db"),
        }
    }
}

/// Artifact store location.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub root: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("data/artifacts"),
        }
    }
}

/// Trigger-queue worker pool settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Number of concurrent worker tasks.
    pub concurrency: usize,
    /// Sleep between empty polls.
    pub poll_interval_ms: u64,
    /// Visibility timeout of a dequeued trigger before it is redelivered.
    /// Must outlive the slowest stage, or the trigger comes back while the
    /// stage is still running.
    pub lease_secs: u64,
    /// Lease on the per-job lock; must outlive the slowest stage.
    pub lock_lease_secs: u64,
    /// Delay applied to a trigger whose job lock is held elsewhere.
    pub busy_defer_ms: u64,
    /// How often the stalled-job recovery sweep runs.
    pub recovery_interval_secs: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            poll_interval_ms: 1000,
            lease_secs: 3600,
            lock_lease_secs: 3600,
            busy_defer_ms: 2000,
            recovery_interval_secs: 60,
        }
    }
}

impl WorkerConfig {
    pub fn lock_lease(&self) -> Duration {
        Duration::from_secs(self.lock_lease_secs)
    }

    pub fn lease(&self) -> Duration {
        Duration::from_secs(self.lease_secs)
    }
}

/// Retry policy parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum attempts per stage, including the first.
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Upper bound of the random jitter as a fraction of the computed delay.
    pub jitter_ratio: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 2_000,
            max_delay_ms: 300_000,
            jitter_ratio: 0.2,
        }
    }
}

/// Paths to external CLI tools.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub ffmpeg_path: Option<PathBuf>,
}

/// Video normalization (Convert stage) settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConvertConfig {
    pub timeout_secs: u64,
    pub video_codec: String,
    pub preset: String,
    pub crf: u32,
    pub audio_codec: String,
    pub audio_bitrate: String,
}

impl Default for ConvertConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 1800,
            video_codec: "libx264".into(),
            preset: "medium".into(),
            crf: 23,
            audio_codec: "aac".into(),
            audio_bitrate: "128k".into(),
        }
    }
}

/// Audio extraction (ExtractAudio stage) settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub channels: u32,
    pub timeout_secs: u64,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            channels: 1,
            timeout_secs: 1800,
        }
    }
}

/// Transcription provider (Deepgram) settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriptionConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub language: String,
    pub diarize: bool,
    pub punctuate: bool,
    pub smart_format: bool,
    pub timeout_secs: u64,
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.deepgram.com".into(),
            api_key: None,
            model: "nova-2".into(),
            language: "en".into(),
            diarize: true,
            punctuate: true,
            smart_format: true,
            timeout_secs: 600,
        }
    }
}

/// Analysis provider (Gemini) settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub requests_per_second: u32,
    pub timeout_secs: u64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            base_url: "https://generativelanguage.googleapis.com".into(),
            api_key: None,
            model: "gemini-1.5-flash".into(),
            requests_per_second: 4,
            timeout_secs: 120,
        }
    }
}
