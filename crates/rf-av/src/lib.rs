//! # rf-av
//!
//! ffmpeg invocation for the Convert and ExtractAudio stages.
//!
//! This crate provides:
//!
//! - **Tool discovery** ([`ToolRegistry`]) -- find and cache the path to
//!   ffmpeg, honouring a configured override.
//! - **Command execution** ([`ToolCommand`]) -- async builder with a hard
//!   time bound for running external processes.
//! - **Workspace management** ([`Workspace`]) -- scratch directory for the
//!   local input/output files of one stage run.
//! - **Action functions** ([`actions`]) -- transcode to H.264/AAC MP4 and
//!   extract speech-ready mono audio.

pub mod actions;
pub mod command;
pub mod tools;
pub mod workspace;

// ---- Re-exports for convenience ----

pub use command::{ToolCommand, ToolOutput};
pub use tools::{ToolConfig, ToolInfo, ToolRegistry};
pub use workspace::Workspace;

pub use actions::{extract_audio, transcode};
