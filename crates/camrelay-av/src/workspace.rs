//! Output directory management for HLS conversion.
//!
//! Each session gets its own directory under the configured output root and
//! every engine run inside it writes to a fresh *generation* directory:
//!
//! ```text
//! <output_root>/<session>/<generation>/index.m3u8
//! <output_root>/<session>/<generation>/seg00000.ts
//! ```
//!
//! A new run never reuses an earlier generation, so a URL handed to a player
//! can only ever resolve to segments of the run it was issued for.

use crate::{Error, Result};
use camrelay_common::SessionId;
use std::path::{Path, PathBuf};

/// Per-session HLS output workspace.
///
/// # Example
///
/// ```no_run
/// use camrelay_av::OutputWorkspace;
/// use camrelay_common::SessionId;
///
/// let workspace = OutputWorkspace::new("/tmp/camrelay/hls", &SessionId::new());
/// let dir = workspace.prepare(1)?;
/// // Start the engine writing into `dir`, then when the session ends:
/// workspace.remove_all()?;
/// # Ok::<(), camrelay_av::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct OutputWorkspace {
    session_dir: PathBuf,
    session_name: String,
}

impl OutputWorkspace {
    /// Create a workspace for a session. No directories are created yet.
    pub fn new<P: AsRef<Path>>(output_root: P, session_id: &SessionId) -> Self {
        let session_name = session_id.simple();
        Self {
            session_dir: output_root.as_ref().join(&session_name),
            session_name,
        }
    }

    /// Get the session directory path.
    pub fn session_dir(&self) -> &Path {
        &self.session_dir
    }

    /// Directory for a given generation.
    pub fn generation_dir(&self, generation: u64) -> PathBuf {
        self.session_dir.join(generation.to_string())
    }

    /// Playlist path relative to the output root, using `/` separators.
    ///
    /// This is the path component of the URL the HLS file server exposes.
    pub fn relative_playlist(&self, generation: u64, playlist_name: &str) -> String {
        format!("{}/{}/{}", self.session_name, generation, playlist_name)
    }

    /// Create an empty directory for a generation.
    ///
    /// Anything left in that directory by an earlier run is removed first.
    pub fn prepare(&self, generation: u64) -> Result<PathBuf> {
        let dir = self.generation_dir(generation);
        remove_dir_if_exists(&dir)?;
        std::fs::create_dir_all(&dir).map_err(|e| {
            Error::Workspace(format!("Failed to create output dir {:?}: {}", dir, e))
        })?;
        Ok(dir)
    }

    /// Remove a single generation directory.
    pub fn remove_generation(&self, generation: u64) -> Result<()> {
        remove_dir_if_exists(&self.generation_dir(generation))
    }

    /// Remove the whole session directory.
    pub fn remove_all(&self) -> Result<()> {
        remove_dir_if_exists(&self.session_dir)
    }

    /// Generations currently present on disk, in ascending order.
    pub fn generations(&self) -> Result<Vec<u64>> {
        let entries = match std::fs::read_dir(&self.session_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut generations: Vec<u64> = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().is_dir())
            .filter_map(|entry| entry.file_name().to_str()?.parse().ok())
            .collect();
        generations.sort_unstable();
        Ok(generations)
    }
}

/// Remove a directory tree, treating "already gone" as success.
pub fn remove_dir_if_exists(path: &Path) -> Result<()> {
    match std::fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Error::Workspace(format!(
            "Failed to remove {:?}: {}",
            path, e
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_workspace_paths() {
        let root = TempDir::new().unwrap();
        let session = SessionId::new();
        let workspace = OutputWorkspace::new(root.path(), &session);

        assert_eq!(workspace.session_dir(), root.path().join(session.simple()));
        assert_eq!(
            workspace.generation_dir(2),
            root.path().join(session.simple()).join("2")
        );
        assert_eq!(
            workspace.relative_playlist(2, "index.m3u8"),
            format!("{}/2/index.m3u8", session.simple())
        );
    }

    #[test]
    fn test_prepare_clears_stale_files() {
        let root = TempDir::new().unwrap();
        let workspace = OutputWorkspace::new(root.path(), &SessionId::new());

        let dir = workspace.prepare(1).unwrap();
        std::fs::write(dir.join("seg00000.ts"), b"stale").unwrap();

        let dir = workspace.prepare(1).unwrap();
        assert!(dir.exists());
        assert_eq!(std::fs::read_dir(&dir).unwrap().count(), 0);
    }

    #[test]
    fn test_generations_listing() {
        let root = TempDir::new().unwrap();
        let workspace = OutputWorkspace::new(root.path(), &SessionId::new());
        assert!(workspace.generations().unwrap().is_empty());

        workspace.prepare(3).unwrap();
        workspace.prepare(1).unwrap();
        assert_eq!(workspace.generations().unwrap(), vec![1, 3]);

        workspace.remove_generation(1).unwrap();
        assert_eq!(workspace.generations().unwrap(), vec![3]);
    }

    #[test]
    fn test_remove_all_is_idempotent() {
        let root = TempDir::new().unwrap();
        let workspace = OutputWorkspace::new(root.path(), &SessionId::new());
        workspace.prepare(1).unwrap();

        workspace.remove_all().unwrap();
        assert!(!workspace.session_dir().exists());
        workspace.remove_all().unwrap();
    }
}
