//! # camrelay-av
//!
//! Transcoding engine adapters and HLS output handling for camrelay.
//!
//! This crate provides functionality for:
//! - Detecting external tools (ffmpeg) and their versions
//! - Driving a live RTSP → HLS transcoding engine behind the
//!   [`TranscodeEngine`] trait, with readiness reported as [`EngineSignal`]s
//! - Managing per-session, per-generation HLS output directories
//! - Parsing and rendering live HLS media playlists
//!
//! ## Features
//!
//! - `tracing` - Enable tracing support
//!
//! ## Example
//!
//! ```no_run
//! use camrelay_av::{EngineSignal, FfmpegEngine, FfmpegSettings, TranscodeEngine};
//! use std::path::Path;
//!
//! # async fn example() -> camrelay_av::Result<()> {
//! let mut engine = FfmpegEngine::new(FfmpegSettings::default());
//! if engine.is_available() {
//!     let mut signals = engine
//!         .start("rtsp://192.168.0.1/live", Path::new("/tmp/camrelay/out"))
//!         .await?;
//!     while let Some(signal) = signals.recv().await {
//!         if let EngineSignal::Ready { segments } = signal {
//!             println!("playable with {} segments", segments);
//!             break;
//!         }
//!     }
//!     engine.stop().await;
//! }
//! # Ok(())
//! # }
//! ```

mod error;
pub mod engine;
pub mod playlist;
pub mod template;
pub mod tools;
pub mod workspace;

// Re-exports
pub use engine::{
    EngineFactory, EngineSignal, EngineSignals, FfmpegEngine, FfmpegEngineFactory, FfmpegSettings,
    TranscodeEngine,
};
pub use error::{Error, Result};
pub use playlist::{MediaPlaylist, PlaylistType, SegmentEntry};
pub use template::TemplateContext;
pub use tools::{check_tool_with_arg, check_tools, ToolInfo};
pub use workspace::OutputWorkspace;
