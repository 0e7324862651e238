//! # rf-pipeline
//!
//! Orchestration of the recording pipeline: Convert, ExtractAudio,
//! Transcribe, Analyze.
//!
//! This crate provides:
//!
//! - **[`Orchestrator`]** -- the per-job state machine. One call to
//!   [`Orchestrator::advance`] per trigger delivery, under an exclusive
//!   per-job lock, with stage-level idempotency.
//! - **[`StageExecutor`]** trait -- the work of one stage, keyed by an
//!   attempt-independent output key so retries reuse stored results.
//! - **Built-in executors** ([`executors`]) -- ffmpeg stages and provider
//!   stages.
//! - **[`ExecutorRegistry`]** -- stage-to-executor lookup, with
//!   [`ExecutorRegistry::standard`] wiring the production executors.
//! - **[`RetryPolicy`]** -- exponential backoff with jitter over classified
//!   errors.
//! - **[`TriggerSink`]** / **[`DbTriggerQueue`]** -- deferred trigger
//!   scheduling on the durable queue.
//! - **[`status`]** -- read-only job and step views.

pub mod executor;
pub mod executors;
pub mod orchestrator;
pub mod queue;
pub mod retry;
pub mod status;

// Re-export key types at the crate root.
pub use executor::{ExecutorRegistry, StageContext, StageExecutor};
pub use orchestrator::{Orchestrator, Outcome};
pub use queue::{DbTriggerQueue, TriggerSink};
pub use retry::{RetryDecision, RetryPolicy};
pub use status::{JobSummary, StepSummary};
