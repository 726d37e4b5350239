//! Common error types used throughout camrelay.

/// Common error type for camrelay.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A camera name could not be resolved.
    #[error("Unknown camera: {0}")]
    UnknownCamera(String),
}

impl Error {
    /// Create a new UnknownCamera error.
    pub fn unknown_camera<S: Into<String>>(name: S) -> Self {
        Self::UnknownCamera(name.into())
    }
}

/// Result type alias using the common Error type.
pub type Result<T> = std::result::Result<T, Error>;
