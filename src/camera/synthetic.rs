//! Synthetic camera backend producing a test pattern.
//!
//! Useful offline and in tests: no hardware, deterministic frames. Each
//! frame is a dim gradient with a number of bright square markers standing
//! in for faces; the marker count follows a repeating script so the
//! analysis stage sees zero, one, and several subjects over time.

use std::thread;
use std::time::{Duration, Instant};

use super::capture::{CaptureSession, FrameSource, SessionRegistry, SourceFrame};
use super::frame::{FrameFormat, FrameImage, Rotation};
use super::lifecycle::Lifecycle;
use super::provider::{BoundCamera, CameraProvider, LensSelector, Outputs};
use super::types::{CameraError, CameraInfo, LensFacing, Resolution};
use crate::errors::BindError;

/// Brightest value the background gradient reaches.
pub const BACKGROUND_MAX: u8 = 180;

/// Value of marker pixels.
pub const MARKER_VALUE: u8 = 255;

/// Settings for the synthetic camera.
#[derive(Debug, Clone)]
pub struct SyntheticConfig {
    pub resolution: Resolution,
    pub fps: u32,
    /// Marker counts cycled through over time
    pub face_script: Vec<usize>,
    /// Frames each script entry is held for
    pub hold_frames: u32,
    /// Sensor orientation reported with every frame
    pub rotation: Rotation,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            resolution: Resolution::LOW,
            fps: 30,
            face_script: vec![0, 1, 1, 2, 1],
            hold_frames: 60,
            rotation: Rotation::Deg0,
        }
    }
}

/// Provider exposing one synthetic front and one synthetic back camera.
pub struct SyntheticProvider {
    config: SyntheticConfig,
    registry: SessionRegistry,
}

impl SyntheticProvider {
    pub fn new(config: SyntheticConfig) -> Self {
        Self {
            config,
            registry: SessionRegistry::default(),
        }
    }

    /// Number of sessions currently bound to `lifecycle`.
    pub fn bound_count(&self, lifecycle: &Lifecycle) -> usize {
        self.registry.bound_count(lifecycle)
    }
}

impl CameraProvider for SyntheticProvider {
    fn name(&self) -> &str {
        "synthetic"
    }

    fn cameras(&self) -> Result<Vec<CameraInfo>, CameraError> {
        Ok(vec![
            CameraInfo {
                index: 0,
                name: "Synthetic Front Camera".to_string(),
                description: "test pattern".to_string(),
                facing: Some(LensFacing::Front),
            },
            CameraInfo {
                index: 1,
                name: "Synthetic Back Camera".to_string(),
                description: "test pattern".to_string(),
                facing: Some(LensFacing::Back),
            },
        ])
    }

    fn unbind_all(&self, lifecycle: &Lifecycle) {
        let stopped = self.registry.unbind_all(lifecycle);
        if stopped > 0 {
            log::debug!("Unbound {} synthetic session(s)", stopped);
        }
    }

    fn bind_to_lifecycle(
        &self,
        lifecycle: &Lifecycle,
        selector: &LensSelector,
        outputs: &Outputs,
        generation: u64,
    ) -> Result<Box<dyn BoundCamera>, BindError> {
        if !lifecycle.is_active() {
            return Err(BindError::LifecycleInactive);
        }

        let cameras = self
            .cameras()
            .map_err(|e| BindError::ProviderUnavailable(e.to_string()))?;
        let info = selector
            .select(&cameras)
            .cloned()
            .ok_or(BindError::NoMatchingCamera(selector.facing))?;

        let config = self.config.clone();
        let facing = selector.facing;
        let session = CaptureSession::start(
            info,
            move || Ok(SyntheticSource::new(config, facing)),
            outputs.clone(),
            generation,
        )?;
        self.registry.register(lifecycle, session.clone());
        Ok(Box::new(session))
    }
}

/// Frame generator for one synthetic camera.
pub struct SyntheticSource {
    config: SyntheticConfig,
    facing: LensFacing,
    sequence: u64,
    interval: Duration,
    next_due: Instant,
}

impl SyntheticSource {
    pub fn new(config: SyntheticConfig, facing: LensFacing) -> Self {
        let interval = Duration::from_secs_f64(1.0 / config.fps.max(1) as f64);
        Self {
            config,
            facing,
            sequence: 0,
            interval,
            next_due: Instant::now(),
        }
    }

    /// Marker count for a given frame number.
    pub fn faces_at(&self, sequence: u64) -> usize {
        if self.config.face_script.is_empty() {
            return 0;
        }
        let hold = self.config.hold_frames.max(1) as u64;
        let index = (sequence / hold) as usize % self.config.face_script.len();
        self.config.face_script[index]
    }

    /// Render frame number `sequence`.
    pub fn render(&self, sequence: u64) -> FrameImage {
        let Resolution { width, height } = self.config.resolution;
        let (w, h) = (width as usize, height as usize);
        let mut data = vec![0u8; w * h * 3];

        // Dim gradient, tinted per lens so a flip is visible.
        let span = (w + h).max(1);
        for y in 0..h {
            for x in 0..w {
                let v = ((x + y) * BACKGROUND_MAX as usize / span) as u8;
                let px = &mut data[(y * w + x) * 3..(y * w + x) * 3 + 3];
                match self.facing {
                    LensFacing::Front => px.copy_from_slice(&[v / 2, v / 2, v]),
                    LensFacing::Back => px.copy_from_slice(&[v / 2, v, v / 2]),
                }
            }
        }

        let faces = self.faces_at(sequence);
        let size = (h / 4).min(w / 8).max(1);
        for i in 0..faces {
            let cx = (i + 1) * w / (faces + 1);
            let x0 = cx.saturating_sub(size / 2);
            let y0 = (h / 2).saturating_sub(size / 2);
            for y in y0..(y0 + size).min(h) {
                for x in x0..(x0 + size).min(w) {
                    let idx = (y * w + x) * 3;
                    data[idx..idx + 3].fill(MARKER_VALUE);
                }
            }
        }

        FrameImage::new(data, width, height, FrameFormat::Rgb)
    }
}

impl FrameSource for SyntheticSource {
    fn open(&mut self) -> Result<Resolution, BindError> {
        self.next_due = Instant::now();
        Ok(self.config.resolution)
    }

    fn next_frame(&mut self) -> SourceFrame {
        let now = Instant::now();
        if now < self.next_due {
            thread::sleep((self.next_due - now).min(Duration::from_millis(5)));
            return SourceFrame::Empty;
        }
        self.next_due += self.interval;
        let image = self.render(self.sequence);
        self.sequence += 1;
        SourceFrame::Image(image)
    }

    fn rotation(&self) -> Rotation {
        self.config.rotation
    }
}
