//! facecam library crate.
//!
//! Camera preview core: torch control, capture session binding, frame
//! analysis, and the screen that ties them together. The `facecam` binary
//! is a thin wrapper over [`cli`].

pub mod analysis;
pub mod camera;
pub mod cli;
pub mod config;
pub mod errors;
#[cfg(feature = "hotkeys")]
pub mod hotkeys;
pub mod logging;
pub mod render;
pub mod screen;
pub mod session;
pub mod torch;
