//! Variable substitution for user-supplied engine arguments.

use std::collections::HashMap;
use std::path::Path;

/// Variable substitution context for engine argument templates.
///
/// Extra engine arguments from the config may reference the current run with
/// `{varname}` placeholders.
///
/// # Example
///
/// ```
/// use camrelay_av::TemplateContext;
/// use std::path::Path;
///
/// let ctx = TemplateContext::new()
///     .with_output(
///         "rtsp://cam/live",
///         Path::new("/tmp/camrelay/abc/1"),
///         "index.m3u8",
///     )
///     .with_var("camera", "front");
///
/// assert_eq!(ctx.substitute("{output_dir}/seg%05d.ts"), "/tmp/camrelay/abc/1/seg%05d.ts");
/// assert_eq!(ctx.substitute("title={camera}"), "title=front");
/// ```
#[derive(Debug, Clone)]
pub struct TemplateContext {
    vars: HashMap<String, String>,
}

impl TemplateContext {
    /// Create a new empty template context.
    pub fn new() -> Self {
        Self {
            vars: HashMap::new(),
        }
    }

    /// Set output-related variables.
    ///
    /// This adds the following variables:
    /// - `{input}` - Source URL being converted
    /// - `{output_dir}` - Directory receiving playlist and segments
    /// - `{playlist}` - Full path to the output playlist
    /// - `{generation}` - Name of the output directory (the run's generation)
    pub fn with_output(mut self, input: &str, output_dir: &Path, playlist_name: &str) -> Self {
        self.vars.insert("input".to_string(), input.to_string());
        self.vars
            .insert("output_dir".to_string(), output_dir.display().to_string());
        self.vars.insert(
            "playlist".to_string(),
            output_dir.join(playlist_name).display().to_string(),
        );

        if let Some(name) = output_dir.file_name() {
            self.vars
                .insert("generation".to_string(), name.to_string_lossy().to_string());
        }

        self
    }

    /// Add a custom variable.
    pub fn with_var(mut self, key: &str, value: &str) -> Self {
        self.vars.insert(key.to_string(), value.to_string());
        self
    }

    /// Substitute variables in a string.
    ///
    /// Variables are in the form `{varname}`. Unknown placeholders are left
    /// untouched.
    pub fn substitute(&self, template: &str) -> String {
        let mut result = template.to_string();
        for (key, value) in &self.vars {
            result = result.replace(&format!("{{{}}}", key), value);
        }
        result
    }

    /// Substitute variables in a list of strings.
    pub fn substitute_all(&self, templates: &[String]) -> Vec<String> {
        templates.iter().map(|t| self.substitute(t)).collect()
    }
}

impl Default for TemplateContext {
    fn default() -> Self {
        Self::new()
    }
}
