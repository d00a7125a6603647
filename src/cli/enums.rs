//! CLI value types and validators.

use clap::ValueEnum;

use crate::camera::{LensFacing, ZoomRatio};

/// Torch state requested on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TorchState {
    On,
    Off,
}

impl TorchState {
    pub fn enabled(self) -> bool {
        self == TorchState::On
    }
}

/// Parse and validate a zoom ratio (1.0-3.0)
pub fn parse_zoom(s: &str) -> Result<ZoomRatio, String> {
    let value: f32 = s
        .trim_end_matches('x')
        .parse()
        .map_err(|_| format!("'{}' is not a valid zoom ratio", s))?;
    ZoomRatio::new(value)
}

/// Parse and validate framerate (1-120 fps)
pub fn parse_framerate(s: &str) -> Result<u32, String> {
    let fps: u32 = s
        .parse()
        .map_err(|_| format!("'{}' is not a valid framerate", s))?;
    if !(1..=120).contains(&fps) {
        return Err(format!(
            "Framerate must be between 1 and 120 fps, got {}",
            fps
        ));
    }
    Ok(fps)
}

/// Parse a lens facing (front, back or rear)
pub fn parse_lens(s: &str) -> Result<LensFacing, String> {
    s.parse()
}
