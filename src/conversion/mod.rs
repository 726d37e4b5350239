//! Live RTSP → HLS conversion.
//!
//! The [`ConversionSupervisor`] owns a session's transcoding engine and its
//! lifecycle:
//!
//! ```text
//! Idle|Stopped|Failed --start--> Starting --ready--> Converting
//! Converting --switch--> Switching --ready--> Converting
//! Starting|Converting|Switching --stop--> Stopping --> Stopped
//! any active state --engine failure / timeout--> Failed
//! ```
//!
//! Each run writes to a fresh output generation, so a playlist URL handed out
//! for one run never serves segments of another.

mod error;
mod state;
mod supervisor;

pub use error::{ConversionError, FailureKind, FailureReason, Result};
pub use state::{ConverterEvent, ConverterState, ConverterStatus, Stats};
pub use supervisor::{ConversionSupervisor, ConverterEventSender, SupervisorOptions};
