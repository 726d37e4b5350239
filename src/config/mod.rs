mod types;

pub use types::*;

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let mut config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    expand_paths(&mut config);
    validate_config(&config)?;

    Ok(config)
}

/// Load config from default locations or return default config
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<Config> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    let default_paths = [
        "./camrelay.toml",
        "~/.config/camrelay/config.toml",
        "/etc/camrelay/config.toml",
    ];

    for path_str in default_paths {
        let path = shellexpand::tilde(path_str);
        let path = Path::new(path.as_ref());
        if path.exists() {
            tracing::debug!("Using config file {:?}", path);
            return load_config(path);
        }
    }

    Ok(Config::default())
}

/// Expand `~` and environment variables in configured paths.
fn expand_paths(config: &mut Config) {
    config.conversion.output_root = expand_path(&config.conversion.output_root);
    if let Some(ref path) = config.engine.ffmpeg_path {
        config.engine.ffmpeg_path = Some(expand_path(path));
    }
}

fn expand_path(path: &Path) -> PathBuf {
    let raw = path.to_string_lossy();
    match shellexpand::full(raw.as_ref()) {
        Ok(expanded) => PathBuf::from(expanded.as_ref()),
        Err(e) => {
            tracing::warn!("Could not expand path {:?}: {}", path, e);
            path.to_path_buf()
        }
    }
}

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<()> {
    if config.server.port == 0 {
        anyhow::bail!("Server port cannot be 0");
    }

    if let Some(ref url) = config.server.public_base_url {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            anyhow::bail!("server.public_base_url must be an http(s) URL: {}", url);
        }
    }

    if config.conversion.start_timeout_secs == 0 {
        anyhow::bail!("conversion.start_timeout_secs cannot be 0");
    }
    if config.conversion.switch_timeout_secs == 0 {
        anyhow::bail!("conversion.switch_timeout_secs cannot be 0");
    }
    if config.conversion.output_root.as_os_str().is_empty() {
        anyhow::bail!("conversion.output_root cannot be empty");
    }

    if config.engine.hls_list_size == 0 {
        anyhow::bail!("engine.hls_list_size cannot be 0");
    }
    if config.engine.hls_time == 0 {
        anyhow::bail!("engine.hls_time cannot be 0");
    }
    if config.engine.min_ready_segments as u64 > u64::from(config.engine.hls_list_size) {
        anyhow::bail!(
            "engine.min_ready_segments ({}) exceeds engine.hls_list_size ({})",
            config.engine.min_ready_segments,
            config.engine.hls_list_size
        );
    }

    if let Some(ref path) = config.engine.ffmpeg_path {
        if !path.exists() {
            tracing::warn!("Configured ffmpeg path does not exist: {:?}", path);
        }
    }

    Ok(())
}
