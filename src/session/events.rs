use camrelay_common::Camera;
use serde::Serialize;
use tokio_stream::wrappers::UnboundedReceiverStream;

/// Event delivered to the host that started a session.
///
/// Serialized with a `type` tag, e.g.
/// `{"type":"status","status":"ready","message":"Stream ready"}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SessionEvent {
    #[serde(rename = "status")]
    StatusChanged { status: String, message: String },
    Closed,
    Action {
        action: String,
        camera: Option<Camera>,
        data: Option<serde_json::Value>,
    },
    Error { error: String },
    #[serde(rename = "switchCamera")]
    SwitchCameraRequested { camera: Camera },
}

impl SessionEvent {
    /// Status name for `StatusChanged` events.
    pub fn status(&self) -> Option<&str> {
        match self {
            Self::StatusChanged { status, .. } => Some(status),
            _ => None,
        }
    }
}

/// Stream of a session's events. Ends when the session is torn down.
pub type SessionEvents = UnboundedReceiverStream<SessionEvent>;
