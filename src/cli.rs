use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "recforge")]
#[command(author, version, about = "Screen-recording processing pipeline")]
pub struct Cli {
    /// Path to config file (JSON)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the worker pool and process queued jobs until interrupted
    Start,

    /// Create a job for an upload already in the artifact store
    Submit {
        /// Artifact key of the raw upload (e.g. uploads/<recording>/screen.webm)
        #[arg(required = true)]
        upload_ref: String,

        /// Recording ID (a new one is generated if omitted)
        #[arg(long)]
        recording: Option<String>,
    },

    /// Copy a local recording into the artifact store and submit it
    Import {
        /// Recording file to import
        #[arg(required = true)]
        file: PathBuf,

        /// Recording ID (a new one is generated if omitted)
        #[arg(long)]
        recording: Option<String>,
    },

    /// Show one job, or list jobs when no ID is given
    Status {
        /// Job ID
        job: Option<String>,

        /// Only list jobs with this status (pending, running, succeeded, failed)
        #[arg(long)]
        status: Option<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show every stage attempt of a job
    Steps {
        /// Job ID
        #[arg(required = true)]
        job: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Retry a failed job from its failed stage
    Retry {
        /// Job ID
        #[arg(required = true)]
        job: String,
    },

    /// Check that required external tools are available
    CheckTools,

    /// Validate configuration file
    Validate {
        /// Config file to validate (defaults to --config)
        file: Option<PathBuf>,
    },

    /// Display version information
    Version,
}
