//! Built-in stage executors.
//!
//! | Stage          | Executor                 | Work                                   |
//! |----------------|--------------------------|----------------------------------------|
//! | Convert        | [`ConvertExecutor`]      | ffmpeg transcode to H.264/AAC MP4      |
//! | ExtractAudio   | [`ExtractAudioExecutor`] | ffmpeg to 16 kHz mono PCM WAV          |
//! | Transcribe     | [`TranscribeExecutor`]   | speech-to-text provider call           |
//! | Analyze        | [`AnalyzeExecutor`]      | four analysis provider calls           |

mod analyze;
mod convert;
mod extract_audio;
mod transcribe;

pub use analyze::{AnalysisManifest, AnalyzeExecutor};
pub use convert::ConvertExecutor;
pub use extract_audio::ExtractAudioExecutor;
pub use transcribe::TranscribeExecutor;

use std::path::Path;

use rf_core::Result;
use rf_store::ArtifactStore;

/// Return `key` if an earlier attempt already stored it.
pub(crate) async fn cached_output(store: &dyn ArtifactStore, key: &str) -> Result<Option<String>> {
    if store.exists(key).await? {
        tracing::info!(key, "stage output already stored, skipping work");
        return Ok(Some(key.to_string()));
    }
    Ok(None)
}

/// Local file name for a fetched input, keeping the key's extension so
/// ffmpeg can probe the container.
pub(crate) fn input_file_name(input_ref: &str) -> String {
    let ext = Path::new(input_ref)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("bin");
    format!("input.{ext}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_name_keeps_extension() {
        assert_eq!(input_file_name("uploads/r/screen.webm"), "input.webm");
        assert_eq!(input_file_name("jobs/j/convert/video.mp4"), "input.mp4");
        assert_eq!(input_file_name("uploads/r/raw"), "input.bin");
    }
}
