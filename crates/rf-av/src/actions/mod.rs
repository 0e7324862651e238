//! ffmpeg actions used by the pipeline stages.

mod audio;
mod transcode;

pub use audio::{extract_audio, extract_audio_args};
pub use transcode::{transcode, transcode_args};
