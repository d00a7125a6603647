//! Webcam backend built on nokhwa.
//!
//! nokhwa does not report which way a camera faces, so lens selection
//! always goes through the configured device indices.

use std::path::Path;

use nokhwa::pixel_format::RgbFormat;
use nokhwa::query;
use nokhwa::utils::{
    ApiBackend, CameraFormat, CameraIndex, FrameFormat as NokhwaFrameFormat, RequestedFormat,
    RequestedFormatType,
};
use nokhwa::Camera;

use super::access::{check_device_node, video_node, DEFAULT_DEVICE_DIR};
use super::capture::{CaptureSession, FrameSource, SessionRegistry, SourceFrame};
use super::frame::{FrameFormat, FrameImage, Rotation};
use super::frame_utils::mirror_horizontal;
use super::lifecycle::Lifecycle;
use super::provider::{BoundCamera, CameraProvider, LensSelector, Outputs};
use super::types::{CameraError, CameraInfo, LensFacing, Resolution};
use crate::errors::BindError;

/// Settings for camera capture.
#[derive(Debug, Clone)]
pub struct NativeSettings {
    /// Requested capture resolution
    pub resolution: Resolution,
    /// Target FPS (actual may vary)
    pub fps: u32,
    /// Mirror the front lens horizontally (selfie mode)
    pub mirror_front: bool,
    /// How the sensor is mounted relative to the display
    pub rotation: Rotation,
}

impl Default for NativeSettings {
    fn default() -> Self {
        Self {
            resolution: Resolution::default(),
            fps: 30,
            mirror_front: true,
            rotation: Rotation::Deg0,
        }
    }
}

/// List all available camera devices on the system.
///
/// If no cameras are found, returns an empty vector (not an error).
pub fn list_devices() -> Result<Vec<CameraInfo>, CameraError> {
    let devices = query(ApiBackend::Auto).map_err(|e| CameraError::QueryFailed(e.to_string()))?;

    Ok(devices
        .into_iter()
        .map(|d| CameraInfo {
            index: d.index().as_index().unwrap_or(0),
            name: d.human_name(),
            description: d.description().to_string(),
            facing: None,
        })
        .collect())
}

/// Provider for the system's webcams.
pub struct NativeProvider {
    settings: NativeSettings,
    registry: SessionRegistry,
}

impl NativeProvider {
    pub fn new(settings: NativeSettings) -> Self {
        Self {
            settings,
            registry: SessionRegistry::default(),
        }
    }
}

impl CameraProvider for NativeProvider {
    fn name(&self) -> &str {
        "native"
    }

    fn cameras(&self) -> Result<Vec<CameraInfo>, CameraError> {
        list_devices()
    }

    fn unbind_all(&self, lifecycle: &Lifecycle) {
        let stopped = self.registry.unbind_all(lifecycle);
        if stopped > 0 {
            log::debug!("Unbound {} webcam session(s)", stopped);
        }
    }

    fn check_access(&self, selector: &LensSelector) -> Result<(), BindError> {
        if !cfg!(target_os = "linux") {
            return Ok(());
        }
        let cameras = self
            .cameras()
            .map_err(|e| BindError::from_backend_message(&e.to_string()))?;
        match selector.select(&cameras) {
            Some(info) => check_device_node(&video_node(Path::new(DEFAULT_DEVICE_DIR), info.index)),
            None => Ok(()),
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
            .map_err(|e| BindError::from_backend_message(&e.to_string()))?;
        let info = selector
            .select(&cameras)
            .cloned()
            .ok_or(BindError::NoMatchingCamera(selector.facing))?;

        let settings = self.settings.clone();
        let index = info.index;
        let mirror = settings.mirror_front && selector.facing == LensFacing::Front;
        let session = CaptureSession::start(
            info,
            move || Ok(NokhwaSource::new(index, settings, mirror)),
            outputs.clone(),
            generation,
        )?;
        self.registry.register(lifecycle, session.clone());
        Ok(Box::new(session))
    }
}

/// Frame source reading from a nokhwa camera. Lives on the capture thread.
struct NokhwaSource {
    index: CameraIndex,
    settings: NativeSettings,
    mirror: bool,
    camera: Option<Camera>,
}

impl NokhwaSource {
    fn new(index: u32, settings: NativeSettings, mirror: bool) -> Self {
        Self {
            index: CameraIndex::Index(index),
            settings,
            mirror,
            camera: None,
        }
    }
}

impl FrameSource for NokhwaSource {
    fn open(&mut self) -> Result<Resolution, BindError> {
        let mut camera = open_camera_with_fallback(&self.index, &self.settings)?;
        camera
            .open_stream()
            .map_err(|e| BindError::from_backend_message(&e.to_string()))?;

        let res = camera.resolution();
        let actual = Resolution {
            width: res.width(),
            height: res.height(),
        };
        self.camera = Some(camera);
        Ok(actual)
    }

    fn next_frame(&mut self) -> SourceFrame {
        let Some(camera) = self.camera.as_mut() else {
            return SourceFrame::Empty;
        };
        let Ok(raw_frame) = camera.frame() else {
            return SourceFrame::Empty;
        };
        match convert_to_rgb(&raw_frame) {
            Some(mut frame) => {
                if self.mirror {
                    let (w, h) = (frame.width, frame.height);
                    if let Some(data) = std::sync::Arc::get_mut(&mut frame.data) {
                        mirror_horizontal(data, w, h, 3);
                    }
                }
                SourceFrame::Image(frame)
            }
            None => SourceFrame::Corrupt,
        }
    }

    fn rotation(&self) -> Rotation {
        self.settings.rotation
    }

    fn close(&mut self) {
        if let Some(mut camera) = self.camera.take() {
            let _ = camera.stop_stream();
        }
    }
}

/// Convert a nokhwa buffer to an RGB image.
///
/// Returns `None` if the conversion fails (unsupported format or corrupt data).
fn convert_to_rgb(buffer: &nokhwa::Buffer) -> Option<FrameImage> {
    let decoded = buffer.decode_image::<RgbFormat>().ok()?;
    // The decoder can hand back a different size than the buffer header claims.
    let (width, height) = decoded.dimensions();

    Some(FrameImage::new(
        decoded.into_raw(),
        width,
        height,
        FrameFormat::Rgb,
    ))
}

/// Try to open a camera with multiple format fallback strategies.
fn open_camera_with_fallback(
    index: &CameraIndex,
    settings: &NativeSettings,
) -> Result<Camera, BindError> {
    // 1. Closest match with NV12 (common on macOS)
    // 2. Closest match with MJPEG (widely supported)
    // 3. Highest resolution available (let camera decide format)
    let requested_resolution =
        nokhwa::utils::Resolution::new(settings.resolution.width, settings.resolution.height);
    let format_attempts: Vec<RequestedFormat> = vec![
        RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(CameraFormat::new(
            requested_resolution,
            NokhwaFrameFormat::NV12,
            settings.fps,
        ))),
        RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(CameraFormat::new(
            requested_resolution,
            NokhwaFrameFormat::MJPEG,
            settings.fps,
        ))),
        RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestResolution),
    ];

    let mut last_error = String::from("no format attempted");

    for requested in format_attempts {
        match Camera::new(index.clone(), requested) {
            Ok(cam) => return Ok(cam),
            Err(e) => {
                log::debug!("Camera {} rejected format: {}", index, e);
                last_error = e.to_string();
            }
        }
    }

    Err(BindError::from_backend_message(&last_error))
}
