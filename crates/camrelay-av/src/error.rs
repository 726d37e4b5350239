//! Error types for camrelay-av.

use std::path::PathBuf;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while driving a transcoding engine.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An external tool could not be spawned.
    #[error("failed to spawn {tool}: {message}")]
    SpawnFailed { tool: String, message: String },

    /// Failed to parse a playlist.
    #[error("failed to parse playlist: {0}")]
    Playlist(String),

    /// The specified directory was not found.
    #[error("directory not found: {}", path.display())]
    DirectoryNotFound { path: PathBuf },

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid input provided.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The engine does not support the requested operation.
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// Output workspace error.
    #[error("workspace error: {0}")]
    Workspace(String),
}

impl Error {
    /// Create a spawn failure error.
    pub fn spawn_failed(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SpawnFailed {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Create an unsupported-operation error.
    pub fn unsupported(what: impl Into<String>) -> Self {
        Self::Unsupported(what.into())
    }

    /// Whether the caller should fall back to another strategy.
    pub fn is_unsupported(&self) -> bool {
        matches!(self, Self::Unsupported(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        assert_eq!(
            Error::DirectoryNotFound {
                path: PathBuf::from("/srv/hls/1")
            }
            .to_string(),
            "directory not found: /srv/hls/1"
        );
        assert_eq!(
            Error::spawn_failed("ffmpeg", "permission denied").to_string(),
            "failed to spawn ffmpeg: permission denied"
        );
    }

    #[test]
    fn test_is_unsupported() {
        assert!(Error::unsupported("live input swap").is_unsupported());
        assert!(!Error::spawn_failed("ffmpeg", "busy").is_unsupported());
    }
}
