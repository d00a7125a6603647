//! Command-line interface definitions and helpers.
//!
//! This module contains all CLI argument parsing, enums, and subcommand handlers.

mod args;
mod commands;
mod enums;
mod run;

pub use args::{Args, Command, ConfigAction, RunArgs};
pub use commands::{handle_config_action, list_cameras, make_provider, set_torch, CommandError};
pub use enums::{parse_framerate, parse_lens, parse_zoom, TorchState};
pub use run::{parse_keys, run};
