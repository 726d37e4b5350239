//! Playback surface control.
//!
//! A [`PlaybackSurface`] is the platform player: it accepts a URL, renders it
//! and reports what the user does. The [`PlaybackController`] owns one surface
//! for a session, decides between an initial load and an in-place source
//! swap, and turns raw surface events into [`PlaybackEvent`]s.

pub mod terminal;

pub use terminal::{TerminalCommand, TerminalRemote, TerminalSurface};

use async_trait::async_trait;
use camrelay_common::Camera;
use tokio::sync::mpsc;

/// Sender a surface uses to report events.
pub type SurfaceEventSender = mpsc::UnboundedSender<SurfaceEvent>;

/// Raw event reported by a surface.
#[derive(Debug, Clone, PartialEq)]
pub enum SurfaceEvent {
    StatusChanged {
        status: String,
        message: String,
    },
    /// The user closed the player.
    Closed,
    /// A UI control was used (record, snapshot, ...).
    Action {
        action: String,
        camera: Option<Camera>,
        data: Option<serde_json::Value>,
    },
    Error {
        error: String,
    },
    SwitchCameraRequested {
        camera: Camera,
    },
}

/// Session details a surface renders.
#[derive(Debug, Clone)]
pub struct SurfaceSetup {
    pub title: String,
    /// Camera device API, for surfaces that talk to the camera directly.
    pub api_base_url: String,
    /// Cameras with a source, in display order.
    pub cameras: Vec<Camera>,
    pub initial_camera: Camera,
}

/// A surface's view of its session plus the channel for its events.
#[derive(Debug, Clone)]
pub struct SurfaceContext {
    pub setup: SurfaceSetup,
    pub events: SurfaceEventSender,
}

/// Platform playback sink.
#[async_trait]
pub trait PlaybackSurface: Send {
    /// Called once before any other method.
    fn attach(&mut self, context: SurfaceContext);

    /// Start playing `url`.
    async fn load(&mut self, url: &str);

    /// Swap the playing source without tearing the player down.
    async fn replace_source(&mut self, url: &str);

    /// Stop showing video and display `message` instead.
    async fn show_placeholder(&mut self, message: &str);

    /// Dismiss the player.
    async fn close(&mut self);
}

/// Surface event after translation by the controller.
#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackEvent {
    Status {
        status: String,
        message: String,
    },
    Closed,
    Action {
        action: String,
        camera: Option<Camera>,
        data: Option<serde_json::Value>,
    },
    Error {
        error: String,
    },
    SwitchCamera {
        camera: Camera,
    },
}

/// Outcome of [`PlaybackController::update_url`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UrlUpdate {
    /// First URL: the surface loaded it.
    Loaded,
    /// The surface swapped its source in place.
    Replaced,
    /// Same URL as the current one.
    Unchanged,
    /// The surface is closed.
    Ignored,
}

/// Owns a session's surface and the URL it is playing.
pub struct PlaybackController {
    surface: Box<dyn PlaybackSurface>,
    current_url: Option<String>,
    has_loaded: bool,
    closed: bool,
}

impl PlaybackController {
    /// Attach `surface` and return the controller with the receiver for the
    /// surface's events.
    pub fn new(
        mut surface: Box<dyn PlaybackSurface>,
        setup: SurfaceSetup,
    ) -> (Self, mpsc::UnboundedReceiver<SurfaceEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        surface.attach(SurfaceContext { setup, events: tx });

        let controller = Self {
            surface,
            current_url: None,
            has_loaded: false,
            closed: false,
        };
        (controller, rx)
    }

    pub fn current_url(&self) -> Option<&str> {
        self.current_url.as_deref()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Point the surface at `url`.
    pub async fn update_url(&mut self, url: &str) -> UrlUpdate {
        if self.closed {
            tracing::debug!("Surface closed, ignoring URL {}", url);
            return UrlUpdate::Ignored;
        }
        if self.current_url.as_deref() == Some(url) {
            return UrlUpdate::Unchanged;
        }

        self.current_url = Some(url.to_string());
        if self.has_loaded {
            tracing::debug!("Replacing playback source with {}", url);
            self.surface.replace_source(url).await;
            UrlUpdate::Replaced
        } else {
            tracing::debug!("Loading playback source {}", url);
            self.has_loaded = true;
            self.surface.load(url).await;
            UrlUpdate::Loaded
        }
    }

    /// Drop the current URL and show `message` in its place.
    pub async fn halt(&mut self, message: &str) {
        if self.closed {
            return;
        }
        self.current_url = None;
        self.surface.show_placeholder(message).await;
    }

    /// Close the surface. Only the first call reaches it.
    pub async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.current_url = None;
        self.surface.close().await;
    }

    /// Translate a surface event.
    ///
    /// `Closed` comes out exactly once; nothing comes out after it.
    pub fn translate(&mut self, event: SurfaceEvent) -> Option<PlaybackEvent> {
        if self.closed {
            return None;
        }

        let event = match event {
            SurfaceEvent::StatusChanged { status, message } => {
                PlaybackEvent::Status { status, message }
            }
            SurfaceEvent::Closed => {
                self.closed = true;
                self.current_url = None;
                PlaybackEvent::Closed
            }
            SurfaceEvent::Action {
                action,
                camera,
                data,
            } => PlaybackEvent::Action {
                action,
                camera,
                data,
            },
            SurfaceEvent::Error { error } => PlaybackEvent::Error { error },
            SurfaceEvent::SwitchCameraRequested { camera } => {
                PlaybackEvent::SwitchCamera { camera }
            }
        };
        Some(event)
    }
}
