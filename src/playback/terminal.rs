//! Terminal playback surface used by the `camrelay play` command.
//!
//! The surface prints what a player would show; a [`TerminalRemote`] stands
//! in for the player's buttons and feeds user input back as surface events.

use super::{PlaybackSurface, SurfaceContext, SurfaceEvent, SurfaceEventSender};
use async_trait::async_trait;
use camrelay_common::Camera;
use parking_lot::Mutex;
use std::sync::Arc;

/// A command typed on the terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalCommand {
    /// Switch to the given camera, or the other one.
    Switch(Option<Camera>),
    Record,
    Stats,
    Quit,
    Help,
    Unknown(String),
}

impl TerminalCommand {
    /// Parse one input line. Blank lines yield `None`.
    pub fn parse(line: &str) -> Option<Self> {
        let mut words = line.split_whitespace();
        let command = words.next()?.to_ascii_lowercase();

        let parsed = match command.as_str() {
            "s" | "switch" => match words.next() {
                Some(name) => match name.parse() {
                    Ok(camera) => Self::Switch(Some(camera)),
                    Err(_) => Self::Unknown(line.trim().to_string()),
                },
                None => Self::Switch(None),
            },
            "r" | "record" => Self::Record,
            "stats" => Self::Stats,
            "q" | "quit" | "exit" => Self::Quit,
            "h" | "help" | "?" => Self::Help,
            _ => Self::Unknown(line.trim().to_string()),
        };
        Some(parsed)
    }

    pub fn help() -> &'static str {
        "Commands: s|switch [front|rear], r|record, stats, q|quit"
    }
}

#[derive(Default)]
struct RemoteState {
    events: Option<SurfaceEventSender>,
    selected: Camera,
    cameras: Vec<Camera>,
}

/// Player controls for a [`TerminalSurface`].
#[derive(Clone, Default)]
pub struct TerminalRemote {
    state: Arc<Mutex<RemoteState>>,
}

impl TerminalRemote {
    /// Camera the user last selected.
    pub fn selected(&self) -> Camera {
        self.state.lock().selected
    }

    /// Ask for a camera switch. Without a camera, toggles to the other one.
    ///
    /// Returns `false` when the camera has no source or the surface is not
    /// attached.
    pub fn request_switch(&self, camera: Option<Camera>) -> bool {
        let mut state = self.state.lock();
        let target = camera.unwrap_or_else(|| state.selected.other());
        if !state.cameras.contains(&target) {
            return false;
        }
        state.selected = target;
        send(&state, SurfaceEvent::SwitchCameraRequested { camera: target })
    }

    /// Report a button press.
    pub fn action(&self, action: &str) -> bool {
        let state = self.state.lock();
        let event = SurfaceEvent::Action {
            action: action.to_string(),
            camera: Some(state.selected),
            data: None,
        };
        send(&state, event)
    }

    /// Report that the user closed the player.
    pub fn close(&self) -> bool {
        let state = self.state.lock();
        send(&state, SurfaceEvent::Closed)
    }
}

fn send(state: &RemoteState, event: SurfaceEvent) -> bool {
    match state.events {
        Some(ref tx) => tx.send(event).is_ok(),
        None => false,
    }
}

/// Surface that prints playback changes to stdout.
pub struct TerminalSurface {
    remote: TerminalRemote,
    title: String,
}

impl TerminalSurface {
    pub fn new() -> (Self, TerminalRemote) {
        let remote = TerminalRemote::default();
        let surface = Self {
            remote: remote.clone(),
            title: String::new(),
        };
        (surface, remote)
    }
}

#[async_trait]
impl PlaybackSurface for TerminalSurface {
    fn attach(&mut self, context: SurfaceContext) {
        let mut state = self.remote.state.lock();
        state.selected = context.setup.initial_camera;
        state.cameras = context.setup.cameras.clone();
        state.events = Some(context.events);
        self.title = context.setup.title;

        println!(
            "┌ {} (camera API {}) ─ cameras: {}",
            self.title,
            context.setup.api_base_url,
            state
                .cameras
                .iter()
                .map(|c| c.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        );
    }

    async fn load(&mut self, url: &str) {
        println!("▶ {} [{}]: {}", self.title, self.remote.selected(), url);
    }

    async fn replace_source(&mut self, url: &str) {
        println!("↻ {} [{}]: {}", self.title, self.remote.selected(), url);
    }

    async fn show_placeholder(&mut self, message: &str) {
        println!("⏸ {}", message);
    }

    async fn close(&mut self) {
        self.remote.state.lock().events = None;
        println!("■ {} closed", self.title);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playback::SurfaceSetup;
    use tokio::sync::mpsc;

    #[test]
    fn test_parse_commands() {
        assert_eq!(TerminalCommand::parse(""), None);
        assert_eq!(TerminalCommand::parse("s"), Some(TerminalCommand::Switch(None)));
        assert_eq!(
            TerminalCommand::parse("switch REAR"),
            Some(TerminalCommand::Switch(Some(Camera::Rear)))
        );
        assert_eq!(TerminalCommand::parse(" r "), Some(TerminalCommand::Record));
        assert_eq!(TerminalCommand::parse("q"), Some(TerminalCommand::Quit));
        assert_eq!(
            TerminalCommand::parse("switch sideways"),
            Some(TerminalCommand::Unknown("switch sideways".into()))
        );
    }

    #[test]
    fn test_remote_sends_surface_events() {
        let (mut surface, remote) = TerminalSurface::new();
        assert!(!remote.close());

        let (tx, mut rx) = mpsc::unbounded_channel();
        surface.attach(SurfaceContext {
            setup: SurfaceSetup {
                title: "Live Stream".into(),
                api_base_url: "http://192.168.0.1".into(),
                cameras: vec![Camera::Front, Camera::Rear],
                initial_camera: Camera::Front,
            },
            events: tx,
        });

        assert!(remote.request_switch(None));
        assert_eq!(
            rx.try_recv().unwrap(),
            SurfaceEvent::SwitchCameraRequested {
                camera: Camera::Rear
            }
        );

        assert!(remote.action("record"));
        assert_eq!(
            rx.try_recv().unwrap(),
            SurfaceEvent::Action {
                action: "record".into(),
                camera: Some(Camera::Rear),
                data: None
            }
        );

        assert!(remote.close());
        assert_eq!(rx.try_recv().unwrap(), SurfaceEvent::Closed);
    }

    #[test]
    fn test_switch_to_camera_without_source_is_refused() {
        let (mut surface, remote) = TerminalSurface::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        surface.attach(SurfaceContext {
            setup: SurfaceSetup {
                title: "Live Stream".into(),
                api_base_url: "http://192.168.0.1".into(),
                cameras: vec![Camera::Front],
                initial_camera: Camera::Front,
            },
            events: tx,
        });

        assert!(!remote.request_switch(Some(Camera::Rear)));
        assert!(rx.try_recv().is_err());
        assert_eq!(remote.selected(), Camera::Front);
    }
}
