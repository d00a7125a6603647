//! Status line rendering and the terminal preview surface.

use std::sync::Mutex;
use std::time::Instant;

use crate::analysis::Highlight;
use crate::camera::{FrameImage, PreviewSurface, ZoomRatio};
use crate::screen::UiState;

/// Width of the zoom slider and progress bar, in cells.
pub const BAR_WIDTH: usize = 20;

/// Zoom slider: `[-----|--------------]`, knob positioned by zoom.
pub fn zoom_slider(zoom: ZoomRatio) -> String {
    let knob = (zoom.fraction() * (BAR_WIDTH - 1) as f32).round() as usize;
    let track: String = (0..BAR_WIDTH)
        .map(|i| if i == knob { '|' } else { '-' })
        .collect();
    format!("[{}]", track)
}

/// Indeterminate progress bar; a three-cell block bouncing with `tick`.
pub fn progress_bar(tick: u64) -> String {
    const BLOCK: usize = 3;
    let span = (BAR_WIDTH - BLOCK) as u64;
    let phase = tick % (span * 2);
    let start = if phase <= span { phase } else { span * 2 - phase } as usize;
    let track: String = (0..BAR_WIDTH)
        .map(|i| if (start..start + BLOCK).contains(&i) { '#' } else { ' ' })
        .collect();
    format!("[{}]", track)
}

/// Render the one-line status display.
///
/// Format: ` lens | slider-or-progress zoom | faces | torch | camera [| toast] `
pub fn status_line(state: &UiState, tick: u64) -> String {
    let indicator = if state.progress_visible {
        progress_bar(tick)
    } else {
        zoom_slider(state.zoom)
    };
    let faces = match state.face_count {
        Some(n) => format!("faces:{}", n),
        None => "faces:-".to_string(),
    };
    let marker = match state.highlight {
        Highlight::Positive => "*",
        Highlight::Neutral => " ",
    };

    let mut line = format!(
        "{}{} | {} {} | {} | {} | {}",
        marker,
        state.lens.name(),
        indicator,
        state.zoom,
        faces,
        if state.torch_on { "torch:on" } else { "torch:off" },
        state.bind_status,
    );
    if let Some(toast) = &state.toast {
        line.push_str(" | ");
        line.push_str(toast);
    }
    line
}

#[derive(Debug, Default)]
struct SurfaceStats {
    frames: u64,
    last_size: Option<(u32, u32)>,
    window_start: Option<Instant>,
    window_frames: u64,
    fps: f32,
}

/// Preview surface for a terminal: keeps frame statistics instead of
/// drawing pixels.
#[derive(Debug, Default)]
pub struct TerminalSurface {
    stats: Mutex<SurfaceStats>,
}

impl TerminalSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames(&self) -> u64 {
        self.stats.lock().map(|s| s.frames).unwrap_or(0)
    }

    /// Dimensions of the last rendered frame.
    pub fn last_size(&self) -> Option<(u32, u32)> {
        self.stats.lock().ok().and_then(|s| s.last_size)
    }

    /// Frame rate measured over the last full second.
    pub fn fps(&self) -> f32 {
        self.stats.lock().map(|s| s.fps).unwrap_or(0.0)
    }

    /// Short summary, e.g. `320x240 @ 29.8fps`.
    pub fn summary(&self) -> String {
        match self.last_size() {
            Some((w, h)) => format!("{}x{} @ {:.1}fps", w, h, self.fps()),
            None => "no frames".to_string(),
        }
    }
}

impl PreviewSurface for TerminalSurface {
    fn render(&self, image: &FrameImage) {
        let mut stats = self.stats.lock().unwrap_or_else(|e| e.into_inner());
        stats.frames += 1;
        stats.last_size = Some((image.width, image.height));

        let now = Instant::now();
        let start = *stats.window_start.get_or_insert(now);
        stats.window_frames += 1;
        let elapsed = now.duration_since(start).as_secs_f32();
        if elapsed >= 1.0 {
            stats.fps = stats.window_frames as f32 / elapsed;
            stats.window_start = Some(now);
            stats.window_frames = 0;
        }
    }
}
