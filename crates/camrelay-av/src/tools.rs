//! External tool detection and management.

use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// Information about an external tool.
#[derive(Debug, Clone, Serialize)]
pub struct ToolInfo {
    /// Name of the tool.
    pub name: String,
    /// Whether the tool is available.
    pub available: bool,
    /// Version string if available.
    pub version: Option<String>,
    /// Path to the tool executable.
    pub path: Option<PathBuf>,
}

/// Check if a tool is available using a custom version argument.
///
/// `name` may be a bare program name (resolved through `PATH`) or a path.
///
/// # Example
///
/// ```no_run
/// use camrelay_av::check_tool_with_arg;
///
/// let info = check_tool_with_arg("ffmpeg", "-version");
/// if info.available {
///     println!("ffmpeg version: {:?}", info.version);
/// }
/// ```
pub fn check_tool_with_arg(name: &str, version_arg: &str) -> ToolInfo {
    let result = Command::new(name)
        .arg(version_arg)
        .stdin(Stdio::null())
        .output();

    match result {
        Ok(output) if output.status.success() => {
            let version = String::from_utf8_lossy(&output.stdout)
                .lines()
                .next()
                .map(|s| s.to_string());

            let path = which::which(name).ok();

            ToolInfo {
                name: tool_name(name),
                available: true,
                version,
                path,
            }
        }
        _ => ToolInfo {
            name: tool_name(name),
            available: false,
            version: None,
            path: None,
        },
    }
}

/// Check the tools camrelay can drive.
///
/// `ffmpeg` is the configured engine program; ffprobe is looked up on `PATH`
/// and only reported.
pub fn check_tools(ffmpeg: &Path) -> Vec<ToolInfo> {
    vec![
        check_tool_with_arg(&ffmpeg.to_string_lossy(), "-version"),
        check_tool_with_arg("ffprobe", "-version"),
    ]
}

fn tool_name(program: &str) -> String {
    Path::new(program)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| program.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_tool_not_found() {
        let info = check_tool_with_arg("nonexistent_tool_12345", "-version");
        assert!(!info.available);
        assert!(info.version.is_none());
        assert!(info.path.is_none());
    }

    #[test]
    fn test_check_tools_reports_configured_program() {
        let tools = check_tools(Path::new("/definitely/not/here/ffmpeg"));
        assert_eq!(tools.len(), 2);
        assert_eq!(tools[0].name, "ffmpeg");
        assert!(!tools[0].available);
        assert_eq!(tools[1].name, "ffprobe");
    }
}
