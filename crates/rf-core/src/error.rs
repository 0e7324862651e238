//! Unified error type for recforge.
//!
//! All crates funnel their failures into [`Error`]. Every error can be
//! classified into an [`ErrorKind`] via [`Error::kind`], which is what the
//! retry policy and the orchestrator reason about.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Failure classification used to decide whether a stage attempt is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Storage, database or local I/O failure.
    TransientInfra,
    /// 5xx, 429, timeout or connection failure from a provider or tool.
    ExternalServiceTransient,
    /// 4xx from a provider or a tool rejecting its input.
    ExternalServiceFatal,
    /// Missing or invalid artifact reference, or missing configuration.
    ValidationError,
}

impl ErrorKind {
    /// Whether an attempt failing with this kind may be retried.
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::TransientInfra | Self::ExternalServiceTransient)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::TransientInfra => "transient_infra",
            Self::ExternalServiceTransient => "external_service_transient",
            Self::ExternalServiceFatal => "external_service_fatal",
            Self::ValidationError => "validation_error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ErrorKind {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "transient_infra" => Ok(Self::TransientInfra),
            "external_service_transient" => Ok(Self::ExternalServiceTransient),
            "external_service_fatal" => Ok(Self::ExternalServiceFatal),
            "validation_error" => Ok(Self::ValidationError),
            other => Err(Error::Validation(format!("unknown error kind: {other}"))),
        }
    }
}

/// Unified error type covering all failure modes in recforge.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The requested entity could not be found.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// The kind of entity (e.g. "job", "artifact").
        entity: String,
        /// The identifier that was looked up.
        id: String,
    },

    /// Input data failed validation.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The requested transition conflicts with the current state.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// A database operation failed.
    #[error("Database error: {source}")]
    Database {
        /// The underlying database error.
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// An I/O operation failed.
    #[error("IO error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// An external tool (ffmpeg) returned an error.
    #[error("Tool error [{tool}]: {message}")]
    Tool {
        /// Name of the tool that failed.
        tool: String,
        /// Human-readable error description.
        message: String,
    },

    /// An external tool or request exceeded its time bound.
    #[error("Timeout [{operation}]: exceeded {after:?}")]
    Timeout {
        /// What was running.
        operation: String,
        /// The bound that was exceeded.
        after: Duration,
    },

    /// A transcription or analysis provider call failed.
    ///
    /// `status` is the HTTP status when a response was received, `None` for
    /// connection-level failures.
    #[error("Provider error [{provider}]{}: {message}", .status.map(|s| format!(" HTTP {s}")).unwrap_or_default())]
    Provider {
        provider: String,
        status: Option<u16>,
        message: String,
    },

    /// The artifact store failed.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Catch-all for unexpected internal errors.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Classify this error for the retry policy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NotFound { .. } | Error::Validation(_) | Error::Conflict(_) => {
                ErrorKind::ValidationError
            }
            Error::Database { .. } | Error::Io { .. } | Error::Storage(_) | Error::Internal(_) => {
                ErrorKind::TransientInfra
            }
            Error::Timeout { .. } => ErrorKind::ExternalServiceTransient,
            Error::Tool { .. } => ErrorKind::ExternalServiceFatal,
            Error::Provider { status, .. } => match status {
                None => ErrorKind::ExternalServiceTransient,
                Some(429) => ErrorKind::ExternalServiceTransient,
                Some(s) if (400..500).contains(s) => ErrorKind::ExternalServiceFatal,
                Some(_) => ErrorKind::ExternalServiceTransient,
            },
        }
    }

    /// Convenience constructor for [`Error::NotFound`].
    pub fn not_found(entity: impl Into<String>, id: impl fmt::Display) -> Self {
        Error::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    /// Convenience constructor for [`Error::Database`].
    pub fn database(source: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Error::Database {
            source: source.into(),
        }
    }

    /// Convenience constructor for [`Error::Tool`].
    pub fn tool(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Tool {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Convenience constructor for [`Error::Timeout`].
    pub fn timeout(operation: impl Into<String>, after: Duration) -> Self {
        Error::Timeout {
            operation: operation.into(),
            after,
        }
    }

    /// Convenience constructor for [`Error::Provider`].
    pub fn provider(
        provider: impl Into<String>,
        status: Option<u16>,
        message: impl Into<String>,
    ) -> Self {
        Error::Provider {
            provider: provider.into(),
            status,
            message: message.into(),
        }
    }
}

/// Result alias using the crate-level [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
