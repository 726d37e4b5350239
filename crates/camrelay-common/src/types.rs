//! Core type definitions for cameras and their stream sources.
//!
//! Camera names are serialized in lowercase (`"front"`, `"rear"`), matching
//! what player UIs send back in switch requests and action callbacks.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::Error;

/// Physical camera position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Camera {
    /// Forward-facing camera.
    Front,
    /// Rear-facing camera.
    Rear,
}

impl Camera {
    /// The opposite camera.
    #[must_use]
    pub fn other(self) -> Self {
        match self {
            Self::Front => Self::Rear,
            Self::Rear => Self::Front,
        }
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self::Front
    }
}

impl fmt::Display for Camera {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Front => write!(f, "front"),
            Self::Rear => write!(f, "rear"),
        }
    }
}

impl std::str::FromStr for Camera {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "front" => Ok(Self::Front),
            "rear" | "back" => Ok(Self::Rear),
            other => Err(Error::unknown_camera(other)),
        }
    }
}

/// RTSP source URL for each camera of a session.
///
/// Empty or whitespace-only URLs are never stored, so a camera either has a
/// usable URL or is absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraSources {
    urls: BTreeMap<Camera, String>,
}

impl CameraSources {
    /// Build the table from a front URL and an optional rear URL.
    pub fn new(front: impl Into<String>, rear: Option<&str>) -> Self {
        let mut sources = Self::default();
        sources.set(Camera::Front, front);
        if let Some(rear) = rear {
            sources.set(Camera::Rear, rear);
        }
        sources
    }

    /// Set (or clear, if blank) the URL for a camera.
    pub fn set(&mut self, camera: Camera, url: impl Into<String>) {
        let url = url.into().trim().to_string();
        if url.is_empty() {
            self.urls.remove(&camera);
        } else {
            self.urls.insert(camera, url);
        }
    }

    /// URL for a camera, if configured.
    pub fn url(&self, camera: Camera) -> Option<&str> {
        self.urls.get(&camera).map(String::as_str)
    }

    /// Whether a camera has a URL.
    pub fn has(&self, camera: Camera) -> bool {
        self.urls.contains_key(&camera)
    }

    /// Cameras that have a URL, in stable order.
    pub fn cameras(&self) -> impl Iterator<Item = Camera> + '_ {
        self.urls.keys().copied()
    }
}
