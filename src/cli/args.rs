//! CLI argument parsing with clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use super::enums::{parse_framerate, parse_lens, parse_zoom, TorchState};
use crate::camera::{LensFacing, ZoomRatio};
use crate::config::Backend;

/// Camera preview with face-match highlighting and torch control
#[derive(Parser, Debug)]
#[command(name = "facecam")]
#[command(version, about = "Camera preview with face-match highlighting", long_about = None)]
#[command(after_help = "EXAMPLES:
    facecam run                          Synthetic camera, front lens
    facecam run --lens back --zoom 2.0   Back lens at 2x
    facecam run --backend native         System webcams (native feature)
    facecam torch on --first-listed      Light the first LED listed
    facecam list-cameras

KEYS (while running, followed by Enter):
    f  flip lens     t  toggle torch
    +  zoom in       -  zoom out      q  quit")]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Config file path
    #[arg(long, short, global = true)]
    pub config: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List available cameras
    ListCameras {
        /// Camera backend (default from config)
        #[arg(long, value_enum)]
        backend: Option<Backend>,
    },
    /// Turn the torch on or off
    Torch {
        #[arg(value_enum)]
        state: TorchState,

        /// Use the first listed LED without checking it is a torch
        #[arg(long)]
        first_listed: bool,
    },
    /// Show the camera preview and analyze frames
    Run(RunArgs),
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Args, Debug, Default)]
pub struct RunArgs {
    /// Camera backend (default from config)
    #[arg(long, value_enum)]
    pub backend: Option<Backend>,

    /// Lens to start with: front or back
    #[arg(long, value_parser = parse_lens)]
    pub lens: Option<LensFacing>,

    /// Initial zoom ratio (1.0-3.0)
    #[arg(long, value_parser = parse_zoom)]
    pub zoom: Option<ZoomRatio>,

    /// Disable face analysis
    #[arg(long)]
    pub no_analysis: bool,

    /// YuNet ONNX face model (requires the yunet feature)
    #[arg(long)]
    pub model: Option<PathBuf>,

    /// Capture framerate (1-120)
    #[arg(long, value_parser = parse_framerate)]
    pub fps: Option<u32>,

    /// Hide the status line
    #[arg(long)]
    pub no_status: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum ConfigAction {
    /// Show current configuration
    Show,
    /// Create default config file
    Init,
}
