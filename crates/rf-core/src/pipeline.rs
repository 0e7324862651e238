//! Pipeline state-machine enums: stages, job status, and step status.
//!
//! All enums serialize in snake_case and round-trip through the same strings
//! via `Display` / `FromStr`, which is also how they are stored in the
//! database.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::Error;

// ---------------------------------------------------------------------------
// Stage
// ---------------------------------------------------------------------------

/// One of the four fixed pipeline phases, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Convert,
    ExtractAudio,
    Transcribe,
    Analyze,
}

impl Stage {
    /// Every stage in pipeline order.
    pub const ALL: [Stage; 4] = [
        Stage::Convert,
        Stage::ExtractAudio,
        Stage::Transcribe,
        Stage::Analyze,
    ];

    /// The first stage of every job.
    pub const fn first() -> Self {
        Stage::Convert
    }

    /// The stage after this one, or `None` for [`Stage::Analyze`].
    pub const fn next(self) -> Option<Self> {
        match self {
            Stage::Convert => Some(Stage::ExtractAudio),
            Stage::ExtractAudio => Some(Stage::Transcribe),
            Stage::Transcribe => Some(Stage::Analyze),
            Stage::Analyze => None,
        }
    }

    /// The stage before this one, or `None` for [`Stage::Convert`].
    pub const fn previous(self) -> Option<Self> {
        match self {
            Stage::Convert => None,
            Stage::ExtractAudio => Some(Stage::Convert),
            Stage::Transcribe => Some(Stage::ExtractAudio),
            Stage::Analyze => Some(Stage::Transcribe),
        }
    }

    /// Zero-based position in the pipeline.
    pub const fn index(self) -> usize {
        self as usize
    }

    pub const fn is_last(self) -> bool {
        self.next().is_none()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Convert => "convert",
            Stage::ExtractAudio => "extract_audio",
            Stage::Transcribe => "transcribe",
            Stage::Analyze => "analyze",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "convert" => Ok(Stage::Convert),
            "extract_audio" => Ok(Stage::ExtractAudio),
            "transcribe" => Ok(Stage::Transcribe),
            "analyze" => Ok(Stage::Analyze),
            other => Err(Error::Validation(format!("unknown stage: {other}"))),
        }
    }
}

// ---------------------------------------------------------------------------
// JobStatus
// ---------------------------------------------------------------------------

/// Overall status of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl JobStatus {
    /// Terminal jobs are never re-entered automatically.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Succeeded | JobStatus::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Succeeded => "succeeded",
            JobStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "running" => Ok(JobStatus::Running),
            "succeeded" => Ok(JobStatus::Succeeded),
            "failed" => Ok(JobStatus::Failed),
            other => Err(Error::Validation(format!("unknown job status: {other}"))),
        }
    }
}

// ---------------------------------------------------------------------------
// StepStatus
// ---------------------------------------------------------------------------

/// Status of one stage attempt.
///
/// `Retrying` is reported by status queries for a failed attempt whose retry
/// has been scheduled; stored rows only ever hold the other three.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Running,
    Succeeded,
    Failed,
    Retrying,
}

impl StepStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            StepStatus::Running => "running",
            StepStatus::Succeeded => "succeeded",
            StepStatus::Failed => "failed",
            StepStatus::Retrying => "retrying",
        }
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StepStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(StepStatus::Running),
            "succeeded" => Ok(StepStatus::Succeeded),
            "failed" => Ok(StepStatus::Failed),
            "retrying" => Ok(StepStatus::Retrying),
            other => Err(Error::Validation(format!("unknown step status: {other}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_order_is_fixed() {
        assert_eq!(Stage::first(), Stage::Convert);
        assert_eq!(Stage::Convert.next(), Some(Stage::ExtractAudio));
        assert_eq!(Stage::ExtractAudio.next(), Some(Stage::Transcribe));
        assert_eq!(Stage::Transcribe.next(), Some(Stage::Analyze));
        assert_eq!(Stage::Analyze.next(), None);
        assert!(Stage::Analyze.is_last());
        assert!(Stage::Convert < Stage::Analyze);
    }

    #[test]
    fn previous_inverts_next() {
        for stage in Stage::ALL {
            if let Some(next) = stage.next() {
                assert_eq!(next.previous(), Some(stage));
            }
        }
        assert_eq!(Stage::Convert.previous(), None);
    }

    #[test]
    fn index_matches_position() {
        for (i, stage) in Stage::ALL.iter().enumerate() {
            assert_eq!(stage.index(), i);
        }
    }

    #[test]
    fn stage_strings_roundtrip() {
        for stage in Stage::ALL {
            assert_eq!(stage.to_string().parse::<Stage>().unwrap(), stage);
        }
        assert!("transcode".parse::<Stage>().is_err());
    }

    #[test]
    fn serde_matches_display() {
        let json = serde_json::to_string(&Stage::ExtractAudio).unwrap();
        assert_eq!(json, "\"extract_audio\"");
        let json = serde_json::to_string(&JobStatus::Succeeded).unwrap();
        assert_eq!(json, "\"succeeded\"");
    }

    #[test]
    fn terminal_statuses() {
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
        assert!(JobStatus::Succeeded.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
    }

    #[test]
    fn status_strings_roundtrip() {
        for s in ["pending", "running", "succeeded", "failed"] {
            assert_eq!(s.parse::<JobStatus>().unwrap().as_str(), s);
        }
        for s in ["running", "succeeded", "failed", "retrying"] {
            assert_eq!(s.parse::<StepStatus>().unwrap().as_str(), s);
        }
    }
}
