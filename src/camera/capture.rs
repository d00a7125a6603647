//! Capture session handle shared by the camera backends.
//!
//! Each bound session runs a background thread that pulls frames from a
//! [`FrameSource`], applies the current zoom, and feeds the session's
//! preview and analysis outputs. The source is created inside the thread
//! so backends with non-`Send` camera handles work unchanged.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use super::capture_loop::{run_capture_loop, LoopContext};
use super::frame::{FrameImage, Rotation};
use super::lifecycle::Lifecycle;
use super::provider::{BoundCamera, Outputs};
use super::types::{CameraInfo, Resolution, ZoomRatio};
use crate::errors::BindError;

/// Result of polling a [`FrameSource`].
#[derive(Debug)]
pub enum SourceFrame {
    Image(FrameImage),
    /// A frame arrived but its buffer could not be decoded
    Corrupt,
    /// Nothing arrived this time
    Empty,
}

/// A stream of images from one physical (or simulated) camera.
pub trait FrameSource {
    /// Start streaming. Returns the resolution actually in use.
    fn open(&mut self) -> Result<Resolution, BindError>;

    fn next_frame(&mut self) -> SourceFrame;

    /// Sensor orientation of the frames.
    fn rotation(&self) -> Rotation {
        Rotation::Deg0
    }

    fn close(&mut self) {}
}

/// Smallest edge, in pixels, a zoomed crop may keep.
pub const MIN_CROP_EDGE: u32 = 16;

/// A running capture session.
pub struct CaptureSession {
    info: CameraInfo,
    generation: u64,
    /// Zoom ratio as f32 bits, read by the capture thread for every frame
    zoom: Arc<AtomicU32>,
    stop_signal: Arc<AtomicBool>,
    capture_thread: Mutex<Option<JoinHandle<()>>>,
    actual_resolution: Resolution,
}

impl std::fmt::Debug for CaptureSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureSession")
            .field("info", &self.info)
            .field("generation", &self.generation)
            .field("is_running", &self.is_running())
            .finish_non_exhaustive()
    }
}

impl CaptureSession {
    /// Spawn the capture thread and wait until the source reports that it
    /// opened (or failed to).
    pub fn start<S, F>(
        info: CameraInfo,
        make_source: F,
        outputs: Outputs,
        generation: u64,
    ) -> Result<Arc<Self>, BindError>
    where
        S: FrameSource,
        F: FnOnce() -> Result<S, BindError> + Send + 'static,
    {
        let zoom = Arc::new(AtomicU32::new(ZoomRatio::NONE.value().to_bits()));
        let stop_signal = Arc::new(AtomicBool::new(false));

        let (info_tx, info_rx) = mpsc::channel::<Result<Resolution, BindError>>();

        let ctx = LoopContext {
            outputs,
            generation,
            zoom: Arc::clone(&zoom),
            stop: Arc::clone(&stop_signal),
        };

        let thread_name = format!("capture-{}-g{}", info.index, generation);
        let handle = std::thread::Builder::new()
            .name(thread_name)
            .spawn(move || match make_source() {
                Ok(source) => run_capture_loop(source, ctx, info_tx),
                Err(e) => {
                    let _ = info_tx.send(Err(e));
                }
            })
            .map_err(|e| BindError::Backend(format!("Failed to spawn capture thread: {}", e)))?;

        match info_rx.recv() {
            Ok(Ok(actual_resolution)) => {
                log::info!(
                    "Camera {} streaming at {} (session {})",
                    info,
                    actual_resolution,
                    generation
                );
                Ok(Arc::new(Self {
                    info,
                    generation,
                    zoom,
                    stop_signal,
                    capture_thread: Mutex::new(Some(handle)),
                    actual_resolution,
                }))
            }
            Ok(Err(e)) => {
                stop_signal.store(true, Ordering::SeqCst);
                let _ = handle.join();
                Err(e)
            }
            Err(_) => {
                stop_signal.store(true, Ordering::SeqCst);
                let _ = handle.join();
                Err(BindError::Backend(
                    "Capture thread terminated unexpectedly".to_string(),
                ))
            }
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn actual_resolution(&self) -> Resolution {
        self.actual_resolution
    }

    pub fn is_running(&self) -> bool {
        !self.stop_signal.load(Ordering::SeqCst)
            && self
                .capture_thread
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .as_ref()
                .is_some_and(|h| !h.is_finished())
    }

    /// Signal the capture thread to stop and wait for it.
    pub fn stop(&self) {
        self.stop_signal.store(true, Ordering::SeqCst);
        let handle = self
            .capture_thread
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(handle) = handle {
            let _ = handle.join();
            log::debug!("Stopped capture session {}", self.generation);
        }
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        self.stop();
    }
}

impl BoundCamera for Arc<CaptureSession> {
    fn info(&self) -> &CameraInfo {
        &self.info
    }

    fn set_zoom_ratio(&self, zoom: ZoomRatio) -> Result<(), BindError> {
        let short_edge = self
            .actual_resolution
            .width
            .min(self.actual_resolution.height) as f32;
        if zoom > ZoomRatio::NONE && short_edge / zoom.value() < MIN_CROP_EDGE as f32 {
            return Err(BindError::ZoomRejected(zoom.value()));
        }
        self.zoom.store(zoom.value().to_bits(), Ordering::SeqCst);
        Ok(())
    }

    fn zoom_ratio(&self) -> ZoomRatio {
        ZoomRatio::clamped(f32::from_bits(self.zoom.load(Ordering::SeqCst)))
    }

    fn is_running(&self) -> bool {
        CaptureSession::is_running(self)
    }
}

/// Sessions a provider has bound, grouped by lifecycle.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<u64, Vec<Arc<CaptureSession>>>>,
}

impl SessionRegistry {
    pub fn register(&self, lifecycle: &Lifecycle, session: Arc<CaptureSession>) {
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        sessions.entry(lifecycle.id()).or_default().push(session);
    }

    /// Stop and forget every session of `lifecycle`. Returns how many were stopped.
    pub fn unbind_all(&self, lifecycle: &Lifecycle) -> usize {
        let removed = {
            let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
            sessions.remove(&lifecycle.id()).unwrap_or_default()
        };
        for session in &removed {
            session.stop();
        }
        removed.len()
    }

    /// Number of sessions currently bound to `lifecycle`.
    pub fn bound_count(&self, lifecycle: &Lifecycle) -> usize {
        let sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        sessions.get(&lifecycle.id()).map_or(0, Vec::len)
    }
}
