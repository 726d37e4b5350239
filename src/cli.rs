use camrelay_common::Camera;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "camrelay")]
#[command(author, version, about = "Relay RTSP cameras as HLS with live front/rear switching")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Convert a camera stream to HLS and play it in the terminal player
    Play {
        /// RTSP URL of the front camera
        #[arg(long)]
        front: String,

        /// RTSP URL of the rear camera
        #[arg(long)]
        rear: Option<String>,

        /// Camera to start with
        #[arg(long, value_parser = parse_camera)]
        camera: Option<Camera>,

        /// Player title
        #[arg(long)]
        title: Option<String>,

        /// Base URL of the camera device API
        #[arg(long)]
        api_base_url: Option<String>,
    },

    /// Check that required external tools are available
    CheckTools,

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses default if not specified)
        config: Option<PathBuf>,
    },

    /// Display version information
    Version,
}

fn parse_camera(s: &str) -> Result<Camera, String> {
    s.parse().map_err(|e: camrelay_common::Error| e.to_string())
}
