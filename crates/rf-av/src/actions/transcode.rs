//! Normalize an uploaded recording to H.264/AAC MP4.

use std::path::Path;
use std::time::Duration;

use rf_core::config::ConvertConfig;

use crate::command::ToolCommand;
use crate::tools::ToolRegistry;

/// ffmpeg arguments for [`transcode`].
pub fn transcode_args(input: &Path, output: &Path, cfg: &ConvertConfig) -> Vec<String> {
    vec![
        "-y".to_string(),
        "-i".to_string(),
        input.to_string_lossy().into_owned(),
        "-c:v".to_string(),
        cfg.video_codec.clone(),
        "-preset".to_string(),
        cfg.preset.clone(),
        "-crf".to_string(),
        cfg.crf.to_string(),
        "-c:a".to_string(),
        cfg.audio_codec.clone(),
        "-b:a".to_string(),
        cfg.audio_bitrate.clone(),
        "-movflags".to_string(),
        "+faststart".to_string(),
        output.to_string_lossy().into_owned(),
    ]
}

/// Transcode `input` into an MP4 at `output`.
///
/// Bounded by `cfg.timeout_secs`; running past it fails with a retryable
/// [`rf_core::Error::Timeout`].
pub async fn transcode(
    tools: &ToolRegistry,
    input: &Path,
    output: &Path,
    cfg: &ConvertConfig,
) -> rf_core::Result<()> {
    let ffmpeg = tools.require("ffmpeg")?;

    tracing::info!(input = %input.display(), codec = %cfg.video_codec, "transcoding recording");

    ToolCommand::new(ffmpeg.path.clone())
        .args(transcode_args(input, output, cfg))
        .timeout(Duration::from_secs(cfg.timeout_secs))
        .execute()
        .await?;

    Ok(())
}
