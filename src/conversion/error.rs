//! Conversion error types.

use serde::Serialize;
use std::time::Duration;

/// Result type for conversion and session operations.
pub type Result<T> = std::result::Result<T, ConversionError>;

/// Errors returned by the conversion supervisor and the session orchestrator.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConversionError {
    #[error("transcoding engine is not available")]
    EngineUnavailable,

    #[error("a conversion is already running")]
    AlreadyConverting,

    #[error("no conversion is running")]
    NotConverting,

    #[error("failed to start engine: {0}")]
    EngineSpawn(String),

    #[error("engine failed: {0}")]
    EngineRuntime(String),

    #[error("engine was not ready within {0:?}")]
    Timeout(Duration),

    /// Output or process cleanup failed. Logged, never fatal.
    #[error("cleanup failed: {0}")]
    ResourceCleanup(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl ConversionError {
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    /// Whether this failure was already reported on the event channel by the
    /// supervisor when it was returned.
    pub fn is_reported(&self) -> bool {
        matches!(
            self,
            Self::EngineSpawn(_) | Self::EngineRuntime(_) | Self::Timeout(_)
        )
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            Self::EngineUnavailable => FailureKind::EngineUnavailable,
            Self::EngineSpawn(_) => FailureKind::EngineSpawn,
            Self::Timeout(_) => FailureKind::Timeout,
            Self::ResourceCleanup(_) => FailureKind::ResourceCleanup,
            Self::AlreadyConverting
            | Self::NotConverting
            | Self::InvalidRequest(_)
            | Self::EngineRuntime(_) => FailureKind::EngineRuntime,
        }
    }
}

/// Category of a conversion failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    EngineUnavailable,
    EngineSpawn,
    EngineRuntime,
    Timeout,
    ResourceCleanup,
}

/// Why a conversion ended up in `Failed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureReason {
    pub kind: FailureKind,
    pub message: String,
}

impl From<&ConversionError> for FailureReason {
    fn from(err: &ConversionError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_reason_from_error() {
        let reason = FailureReason::from(&ConversionError::EngineSpawn("no such file".into()));
        assert_eq!(reason.kind, FailureKind::EngineSpawn);
        assert_eq!(reason.message, "failed to start engine: no such file");
    }

    #[test]
    fn test_reported_errors() {
        assert!(ConversionError::Timeout(Duration::from_secs(1)).is_reported());
        assert!(!ConversionError::AlreadyConverting.is_reported());
        assert!(!ConversionError::invalid_request("x").is_reported());
    }
}
