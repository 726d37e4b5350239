use camrelay_av::FfmpegSettings;
use camrelay_common::Camera;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub engine: FfmpegSettings,

    #[serde(default)]
    pub conversion: ConversionConfig,

    #[serde(default)]
    pub session: SessionConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Base URL players use to reach `/hls`. Derived from host and port
    /// when unset.
    #[serde(default)]
    pub public_base_url: Option<String>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            public_base_url: None,
        }
    }
}

impl ServerConfig {
    /// Base URL for HLS playlists, without a trailing slash.
    pub fn hls_base_url(&self) -> String {
        match self.public_base_url {
            Some(ref url) => url.trim_end_matches('/').to_string(),
            None => {
                let host = match self.host.as_str() {
                    "0.0.0.0" | "::" | "[::]" => "127.0.0.1",
                    host => host,
                };
                format!("http://{}:{}/hls", host, self.port)
            }
        }
    }
}

/// How a camera switch is carried out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SwitchPolicy {
    /// Redirect the running engine's input, restarting only if the engine
    /// cannot do that.
    #[default]
    ReuseIfSupported,
    /// Always stop the engine and start a new one.
    AlwaysRestart,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConversionConfig {
    /// Root directory for HLS output. Each session writes below
    /// `<output_root>/<session_id>/<generation>/`.
    #[serde(default = "default_output_root")]
    pub output_root: PathBuf,

    /// Time the engine gets to produce a playable stream after start.
    #[serde(default = "default_start_timeout")]
    pub start_timeout_secs: u64,

    /// Time the engine gets to produce a playable stream after a switch.
    #[serde(default = "default_switch_timeout")]
    pub switch_timeout_secs: u64,

    #[serde(default)]
    pub switch_policy: SwitchPolicy,
}

fn default_output_root() -> PathBuf {
    std::env::temp_dir().join("camrelay").join("hls")
}
fn default_start_timeout() -> u64 {
    20
}
fn default_switch_timeout() -> u64 {
    15
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            output_root: default_output_root(),
            start_timeout_secs: default_start_timeout(),
            switch_timeout_secs: default_switch_timeout(),
            switch_policy: SwitchPolicy::default(),
        }
    }
}

impl ConversionConfig {
    pub fn start_timeout(&self) -> Duration {
        Duration::from_secs(self.start_timeout_secs)
    }

    pub fn switch_timeout(&self) -> Duration {
        Duration::from_secs(self.switch_timeout_secs)
    }
}

/// Defaults applied to `play` requests that leave fields out.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SessionConfig {
    #[serde(default = "default_title")]
    pub default_title: String,

    /// Base URL of the camera device API, handed to the player.
    #[serde(default = "default_api_base_url")]
    pub default_api_base_url: String,

    #[serde(default)]
    pub default_camera: Camera,
}

fn default_title() -> String {
    "Live Stream".to_string()
}
fn default_api_base_url() -> String {
    "http://192.168.0.1".to_string()
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            default_title: default_title(),
            default_api_base_url: default_api_base_url(),
            default_camera: Camera::default(),
        }
    }
}
