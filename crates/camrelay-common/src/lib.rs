//! Camrelay-Common: Shared types, constants, and utilities.
//!
//! This crate provides common functionality used across camrelay:
//!
//! - **Typed IDs**: Type-safe UUID wrapper for playback sessions
//! - **Core Types**: Camera positions and the per-session camera source table
//! - **URL Utilities**: RTSP URL validation and credential redaction for logs
//! - **Error Handling**: Common error types and result aliases
//!
//! # Examples
//!
//! ```
//! use camrelay_common::{Camera, CameraSources, SessionId};
//! use camrelay_common::urls::is_rtsp_url;
//!
//! let session_id = SessionId::new();
//! let sources = CameraSources::new("rtsp://cam1/stream", Some("rtsp://cam2/stream"));
//!
//! assert_eq!(sources.url(Camera::Rear), Some("rtsp://cam2/stream"));
//! assert!(is_rtsp_url("rtsp://cam1/stream"));
//! assert!(!session_id.to_string().is_empty());
//! ```

pub mod error;
pub mod ids;
pub mod types;
pub mod urls;

pub use error::{Error, Result};
pub use ids::*;
pub use types::*;
