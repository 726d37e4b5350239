//! Session orchestration.
//!
//! The [`SessionOrchestrator`] is the command surface hosts use: `play`,
//! `stop`, `check_availability`, `get_stats` and `switch_camera`. It holds at
//! most one live session, wires the session's [`ConversionSupervisor`] to its
//! [`PlaybackController`] through channels, and reports everything the host
//! should see as [`SessionEvent`]s.

mod events;

pub use events::{SessionEvent, SessionEvents};

use crate::config::SessionConfig;
use crate::conversion::{
    ConversionError, ConversionSupervisor, ConverterEvent, ConverterStatus, Result, Stats,
    SupervisorOptions,
};
use crate::playback::{
    PlaybackController, PlaybackEvent, PlaybackSurface, SurfaceEvent, SurfaceSetup,
};
use camrelay_av::EngineFactory;
use camrelay_common::{urls, Camera, CameraSources, SessionId};
use parking_lot::{Mutex as SyncMutex, RwLock};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::sync::CancellationToken;

/// Time the pump gets to finish after a stop before it is aborted.
const PUMP_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Parameters of a `play` call.
#[derive(Debug, Clone)]
pub struct PlayRequest {
    pub sources: CameraSources,
    pub camera: Camera,
    pub title: String,
    pub api_base_url: String,
}

impl PlayRequest {
    /// Request for the given sources with the default title, API base URL
    /// and starting camera.
    pub fn new(sources: CameraSources) -> Self {
        Self::with_defaults(sources, &SessionConfig::default())
    }

    pub fn with_defaults(sources: CameraSources, defaults: &SessionConfig) -> Self {
        Self {
            sources,
            camera: defaults.default_camera,
            title: defaults.default_title.clone(),
            api_base_url: defaults.default_api_base_url.clone(),
        }
    }

    pub fn camera(mut self, camera: Camera) -> Self {
        self.camera = camera;
        self
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into();
        self
    }

    fn validate(&self) -> Result<&str> {
        let url = self.sources.url(self.camera).ok_or_else(|| {
            ConversionError::invalid_request(format!("no stream URL for {} camera", self.camera))
        })?;

        for camera in self.sources.cameras() {
            let Some(url) = self.sources.url(camera) else {
                continue;
            };
            if !urls::is_stream_url(url) {
                return Err(ConversionError::invalid_request(format!(
                    "invalid {} stream URL: {}",
                    camera,
                    urls::redact_credentials(url)
                )));
            }
        }
        Ok(url)
    }
}

/// State shared between a session handle and its pump task.
struct SessionShared {
    id: SessionId,
    sources: CameraSources,
    supervisor: ConversionSupervisor,
    playback: Mutex<PlaybackController>,
    cameras: RwLock<CameraSelection>,
    events: mpsc::UnboundedSender<SessionEvent>,
    /// Cancelled once the host must not see further events.
    closed: CancellationToken,
}

#[derive(Debug, Clone, Copy)]
struct CameraSelection {
    current: Camera,
    pending: Option<Camera>,
}

impl SessionShared {
    fn emit(&self, event: SessionEvent) {
        if self.closed.is_cancelled() {
            return;
        }
        if self.events.send(event).is_err() {
            tracing::debug!(session_id = %self.id, "No listener for session event");
        }
    }

    fn current_camera(&self) -> Camera {
        self.cameras.read().current
    }

    /// Route a camera switch into the supervisor.
    async fn request_switch(&self, camera: Camera) -> Result<()> {
        if self.closed.is_cancelled() {
            return Err(ConversionError::NotConverting);
        }

        let url = {
            let mut cameras = self.cameras.write();
            let target = cameras.pending.unwrap_or(cameras.current);
            if camera == target {
                tracing::debug!(
                    session_id = %self.id,
                    %camera,
                    "Already on camera, ignoring switch"
                );
                return Ok(());
            }
            let Some(url) = self.sources.url(camera) else {
                tracing::info!(
                    session_id = %self.id,
                    %camera,
                    "No stream URL for camera, ignoring switch"
                );
                return Ok(());
            };
            cameras.pending = Some(camera);
            url.to_string()
        };

        // Both cameras may share a source; nothing to restart then.
        if self.supervisor.input_url().as_deref() == Some(url.as_str())
            && self.supervisor.hls_url().is_some()
        {
            let mut cameras = self.cameras.write();
            cameras.current = camera;
            cameras.pending = None;
            return Ok(());
        }

        tracing::info!(session_id = %self.id, %camera, "Switching camera");
        match self.supervisor.switch_to_url(&url).await {
            Ok(()) => Ok(()),
            Err(e) => {
                let mut cameras = self.cameras.write();
                if cameras.pending == Some(camera) {
                    cameras.pending = None;
                }
                tracing::warn!(session_id = %self.id, %camera, "Camera switch failed: {}", e);
                Err(e)
            }
        }
    }

    async fn on_converter_event(&self, event: ConverterEvent) {
        match event {
            ConverterEvent::Status {
                status: ConverterStatus::Ready,
                message,
                hls_url,
                input_url,
            } => {
                if let Some(ref url) = hls_url {
                    self.playback.lock().await.update_url(url).await;
                }

                {
                    let mut cameras = self.cameras.write();
                    if let Some(pending) = cameras.pending {
                        let committed = self.sources.url(pending);
                        if input_url.is_some() && committed == input_url.as_deref() {
                            cameras.current = pending;
                            cameras.pending = None;
                        }
                    }
                }

                self.emit(SessionEvent::StatusChanged {
                    status: ConverterStatus::Ready.to_string(),
                    message,
                });
            }
            ConverterEvent::Status {
                status, message, ..
            } => {
                self.emit(SessionEvent::StatusChanged {
                    status: status.to_string(),
                    message,
                });
            }
            ConverterEvent::Error { reason } => {
                self.cameras.write().pending = None;
                self.playback.lock().await.halt(&reason.message).await;
                self.emit(SessionEvent::Error {
                    error: reason.message,
                });
            }
        }
    }

    /// Returns `false` once the surface has closed.
    async fn on_surface_event(&self, event: SurfaceEvent) -> bool {
        let translated = self.playback.lock().await.translate(event);
        let Some(event) = translated else {
            return true;
        };

        match event {
            PlaybackEvent::Status { status, message } => {
                self.emit(SessionEvent::StatusChanged { status, message });
            }
            PlaybackEvent::Action {
                action,
                camera,
                data,
            } => {
                self.emit(SessionEvent::Action {
                    action,
                    camera,
                    data,
                });
            }
            PlaybackEvent::Error { error } => {
                self.emit(SessionEvent::Error { error });
            }
            PlaybackEvent::SwitchCamera { camera } => {
                self.emit(SessionEvent::SwitchCameraRequested { camera });
                match self.request_switch(camera).await {
                    Ok(()) => {}
                    // Already delivered by the converter.
                    Err(e) if e.is_reported() => {}
                    Err(e) => self.emit(SessionEvent::Error {
                        error: e.to_string(),
                    }),
                }
            }
            PlaybackEvent::Closed => {
                self.emit(SessionEvent::Closed);
                self.closed.cancel();
                tracing::info!(session_id = %self.id, "Player closed, ending session");
                self.supervisor.cleanup().await;
                return false;
            }
        }
        true
    }
}

/// A live session held by the orchestrator.
struct Session {
    shared: Arc<SessionShared>,
    pump: JoinHandle<()>,
    shutdown: CancellationToken,
}

impl Session {
    fn is_live(&self) -> bool {
        !self.shared.closed.is_cancelled() && self.shared.supervisor.is_converting()
    }

    /// Stop conversion, close the surface, end the pump.
    async fn teardown(self) {
        let Session {
            shared,
            mut pump,
            shutdown,
        } = self;

        shared.supervisor.cleanup().await;
        shared.closed.cancel();
        shutdown.cancel();

        if tokio::time::timeout(PUMP_SHUTDOWN_TIMEOUT, &mut pump)
            .await
            .is_err()
        {
            tracing::warn!(session_id = %shared.id, "Session pump did not stop, aborting");
            pump.abort();
        }

        shared.playback.lock().await.close().await;
        tracing::info!(session_id = %shared.id, "Session ended");
    }
}

type SessionSlot = Arc<SyncMutex<Option<Session>>>;

/// Coordinates conversion and playback for one session at a time.
pub struct SessionOrchestrator {
    factory: Arc<dyn EngineFactory>,
    options: SupervisorOptions,
    slot: SessionSlot,
    /// Serializes `play` and `stop`. Readers only touch `slot`.
    lifecycle: Mutex<()>,
}

impl SessionOrchestrator {
    pub fn new(factory: Arc<dyn EngineFactory>, options: SupervisorOptions) -> Self {
        Self {
            factory,
            options,
            slot: Arc::new(SyncMutex::new(None)),
            lifecycle: Mutex::new(()),
        }
    }

    /// Start a session: convert the starting camera's stream and show it on
    /// `surface` once it is playable.
    ///
    /// Fails with `AlreadyConverting` while another session is live. A
    /// session whose conversion failed or stopped is replaced.
    pub async fn play(
        &self,
        request: PlayRequest,
        surface: Box<dyn PlaybackSurface>,
    ) -> Result<SessionEvents> {
        let input_url = request.validate()?.to_string();

        let _lifecycle = self.lifecycle.lock().await;
        let previous = {
            let mut slot = self.slot.lock();
            if slot.as_ref().is_some_and(Session::is_live) {
                return Err(ConversionError::AlreadyConverting);
            }
            slot.take()
        };
        if let Some(previous) = previous {
            tracing::debug!(session_id = %previous.shared.id, "Replacing inactive session");
            previous.teardown().await;
        }

        if !self.check_availability().await {
            return Err(ConversionError::EngineUnavailable);
        }

        let id = SessionId::new();
        let (converter_tx, converter_rx) = mpsc::unbounded_channel();
        let supervisor = ConversionSupervisor::new(id, self.factory.create(), self.options.clone())
            .with_events(converter_tx);

        let setup = SurfaceSetup {
            title: request.title.clone(),
            api_base_url: request.api_base_url.clone(),
            cameras: request.sources.cameras().collect(),
            initial_camera: request.camera,
        };
        let (playback, surface_rx) = PlaybackController::new(surface, setup);

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(SessionShared {
            id,
            sources: request.sources.clone(),
            supervisor: supervisor.clone(),
            playback: Mutex::new(playback),
            cameras: RwLock::new(CameraSelection {
                current: request.camera,
                pending: None,
            }),
            events: events_tx,
            closed: CancellationToken::new(),
        });

        let shutdown = CancellationToken::new();
        let pump = tokio::spawn(run_pump(
            shared.clone(),
            Arc::downgrade(&self.slot),
            converter_rx,
            surface_rx,
            shutdown.clone(),
        ));

        tracing::info!(
            session_id = %id,
            camera = %request.camera,
            title = %request.title,
            "Starting session"
        );

        *self.slot.lock() = Some(Session {
            shared,
            pump,
            shutdown,
        });

        match supervisor.start_conversion(&input_url).await {
            Ok(()) => {}
            // Reported on the event stream; the session stays until stopped.
            Err(e) if e.is_reported() => {}
            Err(e) => {
                if let Some(session) = self.take_session(id) {
                    session.teardown().await;
                }
                return Err(e);
            }
        }

        Ok(UnboundedReceiverStream::new(events_rx))
    }

    /// End the current session. Does nothing without one.
    pub async fn stop(&self) {
        let _lifecycle = self.lifecycle.lock().await;
        let session = self.slot.lock().take();
        if let Some(session) = session {
            session.teardown().await;
        }
    }

    fn take_session(&self, id: SessionId) -> Option<Session> {
        let mut slot = self.slot.lock();
        if slot.as_ref().map(|s| s.shared.id) == Some(id) {
            slot.take()
        } else {
            None
        }
    }

    /// Whether the transcoding engine can run here. Touches no session.
    pub async fn check_availability(&self) -> bool {
        let factory = self.factory.clone();
        tokio::task::spawn_blocking(move || factory.is_available())
            .await
            .unwrap_or(false)
    }

    /// Stats of the current session's conversion.
    pub async fn get_stats(&self) -> Stats {
        match self.slot.lock().as_ref() {
            Some(session) => session.shared.supervisor.get_stats(),
            None => Stats::inactive(),
        }
    }

    /// Switch the current session to `camera`.
    pub async fn switch_camera(&self, camera: Camera) -> Result<()> {
        let shared = match self.slot.lock().as_ref() {
            Some(session) => session.shared.clone(),
            None => return Err(ConversionError::NotConverting),
        };
        shared.request_switch(camera).await
    }

    pub async fn current_camera(&self) -> Option<Camera> {
        self.slot
            .lock()
            .as_ref()
            .map(|session| session.shared.current_camera())
    }

    pub async fn session_id(&self) -> Option<SessionId> {
        self.slot.lock().as_ref().map(|session| session.shared.id)
    }
}

/// Forward converter and surface events for one session.
async fn run_pump(
    shared: Arc<SessionShared>,
    slot: Weak<SyncMutex<Option<Session>>>,
    mut converter_rx: mpsc::UnboundedReceiver<ConverterEvent>,
    mut surface_rx: mpsc::UnboundedReceiver<SurfaceEvent>,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => return,
            Some(event) = converter_rx.recv() => {
                shared.on_converter_event(event).await;
            }
            Some(event) = surface_rx.recv() => {
                if !shared.on_surface_event(event).await {
                    break;
                }
            }
            else => return,
        }
    }

    // The player closed: release the session unless it was already replaced.
    let Some(slot) = slot.upgrade() else {
        return;
    };
    let mut slot = slot.lock();
    if slot.as_ref().map(|s| s.shared.id) == Some(shared.id) {
        // Cleanup already ran on close.
        slot.take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_play_request_defaults() {
        let request = PlayRequest::new(CameraSources::new("rtsp://cam1/live", None));
        assert_eq!(request.camera, Camera::Front);
        assert_eq!(request.title, "Live Stream");
        assert_eq!(request.api_base_url, "http://192.168.0.1");
    }

    #[test]
    fn test_play_request_requires_url_for_camera() {
        let request =
            PlayRequest::new(CameraSources::new("rtsp://cam1/live", None)).camera(Camera::Rear);
        assert!(matches!(
            request.validate(),
            Err(ConversionError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_play_request_rejects_bad_urls() {
        let request = PlayRequest::new(CameraSources::new(
            "rtsp://cam1/live",
            Some("ftp://cam2/live"),
        ));
        assert!(matches!(
            request.validate(),
            Err(ConversionError::InvalidRequest(_))
        ));

        let request = PlayRequest::new(CameraSources::new(
            "rtsp://cam1/live",
            Some("rtsp://cam2/live"),
        ))
        .camera(Camera::Rear);
        assert_eq!(request.validate().unwrap(), "rtsp://cam2/live");
    }
}
