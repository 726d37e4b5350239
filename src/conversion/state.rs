//! Converter state, events and stats snapshots.

use super::error::FailureReason;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

/// Lifecycle state of a session's conversion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ConverterState {
    #[default]
    Idle,
    Starting,
    Converting,
    Switching,
    Stopping,
    Stopped,
    Failed(FailureReason),
}

impl ConverterState {
    /// A new conversion may be started from this state.
    pub fn can_start(&self) -> bool {
        matches!(self, Self::Idle | Self::Stopped | Self::Failed(_))
    }

    /// An engine run belongs to this state.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Starting | Self::Converting | Self::Switching)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Starting => "starting",
            Self::Converting => "converting",
            Self::Switching => "switching",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
            Self::Failed(_) => "failed",
        }
    }
}

impl fmt::Display for ConverterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Failed(reason) => write!(f, "failed: {}", reason),
            other => f.write_str(other.as_str()),
        }
    }
}

/// Status values reported to listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConverterStatus {
    Connecting,
    Ready,
    Switching,
    Stopped,
}

impl ConverterStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Ready => "ready",
            Self::Switching => "switching",
            Self::Stopped => "stopped",
        }
    }
}

impl fmt::Display for ConverterStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Event emitted by the supervisor on its injected channel.
#[derive(Debug, Clone, PartialEq)]
pub enum ConverterEvent {
    Status {
        status: ConverterStatus,
        message: String,
        /// Set with `Ready`: the playlist URL for the new output.
        hls_url: Option<String>,
        /// Input the status applies to.
        input_url: Option<String>,
    },
    Error {
        reason: FailureReason,
    },
}

/// Read-only conversion stats, serialized for hosts and the HTTP API.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub state: String,
    pub is_converting: bool,
    pub hls_url: Option<String>,
    pub input_url: Option<String>,
    pub output_path: Option<PathBuf>,
    pub started_at: Option<DateTime<Utc>>,
    pub uptime_secs: Option<u64>,
    pub segments: usize,
    pub bitrate_kbps: Option<f64>,
    pub last_error: Option<String>,
    pub switch_count: u32,
    pub generation: Option<u64>,
}

impl Stats {
    /// Stats of a session with no conversion.
    pub fn inactive() -> Self {
        Self {
            state: ConverterState::Idle.as_str().to_string(),
            is_converting: false,
            hls_url: None,
            input_url: None,
            output_path: None,
            started_at: None,
            uptime_secs: None,
            segments: 0,
            bitrate_kbps: None,
            last_error: None,
            switch_count: 0,
            generation: None,
        }
    }
}

impl Default for Stats {
    fn default() -> Self {
        Self::inactive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversion::FailureKind;

    #[test]
    fn test_state_predicates() {
        assert!(ConverterState::Idle.can_start());
        assert!(ConverterState::Stopped.can_start());
        assert!(!ConverterState::Converting.can_start());
        assert!(ConverterState::Switching.is_active());
        assert!(!ConverterState::Stopping.is_active());

        let failed = ConverterState::Failed(FailureReason {
            kind: FailureKind::Timeout,
            message: "engine was not ready within 1s".into(),
        });
        assert!(failed.can_start());
        assert_eq!(failed.as_str(), "failed");
        assert_eq!(failed.to_string(), "failed: engine was not ready within 1s");
    }

    #[test]
    fn test_stats_serialize_camel_case() {
        let json = serde_json::to_value(Stats::inactive()).unwrap();
        assert_eq!(json["state"], "idle");
        assert_eq!(json["isConverting"], false);
        assert!(json["hlsUrl"].is_null());
        assert_eq!(json["switchCount"], 0);
    }
}
