//! Extract a speech-recognition-ready audio track.

use std::path::Path;
use std::time::Duration;

use rf_core::config::AudioConfig;

use crate::command::ToolCommand;
use crate::tools::ToolRegistry;

/// ffmpeg arguments for [`extract_audio`]: drop video, 16-bit PCM WAV at
/// the configured rate and channel count.
pub fn extract_audio_args(input: &Path, output: &Path, cfg: &AudioConfig) -> Vec<String> {
    vec![
        "-y".to_string(),
        "-i".to_string(),
        input.to_string_lossy().into_owned(),
        "-vn".to_string(),
        "-acodec".to_string(),
        "pcm_s16le".to_string(),
        "-ar".to_string(),
        cfg.sample_rate.to_string(),
        "-ac".to_string(),
        cfg.channels.to_string(),
        output.to_string_lossy().into_owned(),
    ]
}

/// Extract mono PCM audio from the normalized video at `input`.
pub async fn extract_audio(
    tools: &ToolRegistry,
    input: &Path,
    output: &Path,
    cfg: &AudioConfig,
) -> rf_core::Result<()> {
    let ffmpeg = tools.require("ffmpeg")?;

    tracing::info!(
        input = %input.display(),
        sample_rate = cfg.sample_rate,
        channels = cfg.channels,
        "extracting audio"
    );

    ToolCommand::new(ffmpeg.path.clone())
        .args(extract_audio_args(input, output, cfg))
        .timeout(Duration::from_secs(cfg.timeout_secs))
        .execute()
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn default_args_are_mono_16k() {
        let args = extract_audio_args(
            &PathBuf::from("/w/video.mp4"),
            &PathBuf::from("/w/audio.wav"),
            &AudioConfig::default(),
        );
        assert_eq!(
            args.join(" "),
            "-y -i /w/video.mp4 -vn -acodec pcm_s16le -ar 16000 -ac 1 /w/audio.wav"
        );
    }
}
