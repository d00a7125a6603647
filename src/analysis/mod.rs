//! Frame analysis stage.
//!
//! A [`FrameAnalyzer`] owns a dedicated thread that takes frames from an
//! [`AnalysisOutput`]'s keep-only-latest slot, runs face detection, and
//! reports the outcome through a caller-supplied sink. Reports carry the
//! generation of the session that produced the frame so the receiver can
//! discard results from sessions that have since been replaced.

pub mod detector;
mod slot;
#[cfg(feature = "yunet")]
pub mod yunet;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

pub use detector::{FaceBox, FaceDetector, Faces, MarkerDetector};
pub use slot::LatestFrameSlot;

use crate::camera::frame_utils::{fit_within, rotate_upright};
use crate::camera::{AnalysisOutput, Frame, Resolution};
use crate::errors::DetectionError;

/// Highlight colour driven by detection results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Highlight {
    #[default]
    Neutral,
    Positive,
}

/// What the UI should show for a detection outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchState {
    pub highlight: Highlight,
    pub progress_visible: bool,
}

/// Exactly one face is a match; none or several are not.
pub fn classify(face_count: usize) -> MatchState {
    if face_count == 1 {
        MatchState {
            highlight: Highlight::Positive,
            progress_visible: true,
        }
    } else {
        MatchState {
            highlight: Highlight::Neutral,
            progress_visible: false,
        }
    }
}

/// Detection outcome for one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisReport {
    /// Session generation that produced the frame
    pub generation: u64,
    pub sequence: u64,
    /// Number of faces found, or the detector's error
    pub outcome: Result<usize, DetectionError>,
}

/// Counters kept by the analysis thread.
#[derive(Debug, Default)]
pub struct AnalyzerCounters {
    analyzed: AtomicU64,
    extraction_failures: AtomicU64,
    detection_failures: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AnalyzerStats {
    pub analyzed: u64,
    pub extraction_failures: u64,
    pub detection_failures: u64,
}

impl AnalyzerCounters {
    pub fn snapshot(&self) -> AnalyzerStats {
        AnalyzerStats {
            analyzed: self.analyzed.load(Ordering::SeqCst),
            extraction_failures: self.extraction_failures.load(Ordering::SeqCst),
            detection_failures: self.detection_failures.load(Ordering::SeqCst),
        }
    }
}

/// Process one delivered frame and release it.
///
/// The image is turned upright using the frame's rotation before it is
/// scaled and handed to the detector.
///
/// Returns `None` when the frame's image could not be extracted; no
/// detection is attempted in that case.
pub fn analyze_frame<D: FaceDetector + ?Sized>(
    detector: &mut D,
    frame: Frame,
    target: Resolution,
    counters: &AnalyzerCounters,
) -> Option<AnalysisReport> {
    let generation = frame.generation();
    let sequence = frame.sequence();

    let image = match frame.image() {
        Ok(image) => fit_within(&rotate_upright(image, frame.rotation()), target),
        Err(e) => {
            log::debug!("Skipping frame: {}", e);
            counters.extraction_failures.fetch_add(1, Ordering::SeqCst);
            frame.close();
            return None;
        }
    };

    let outcome = detector.detect(&image).map(|faces| faces.len());
    frame.close();

    counters.analyzed.fetch_add(1, Ordering::SeqCst);
    if let Err(e) = &outcome {
        counters.detection_failures.fetch_add(1, Ordering::SeqCst);
        log::warn!("Face detection failed on frame {}: {}", sequence, e);
    }

    Some(AnalysisReport {
        generation,
        sequence,
        outcome,
    })
}

/// Handle to the analysis thread.
pub struct FrameAnalyzer {
    slot: Arc<LatestFrameSlot>,
    counters: Arc<AnalyzerCounters>,
    thread: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for FrameAnalyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameAnalyzer")
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

impl FrameAnalyzer {
    /// Start analyzing frames submitted to `output`.
    ///
    /// The detector is built on the analysis thread by `make_detector`, so
    /// it need not be `Send`. If building it fails, frames are still taken
    /// and released, and every report carries the error.
    pub fn spawn<D, F, S>(output: &AnalysisOutput, make_detector: F, mut sink: S) -> Self
    where
        D: FaceDetector,
        F: FnOnce() -> Result<D, DetectionError> + Send + 'static,
        S: FnMut(AnalysisReport) + Send + 'static,
    {
        let slot = Arc::clone(output.slot());
        let counters = Arc::new(AnalyzerCounters::default());
        let target = output.config().target_resolution;

        let thread_slot = Arc::clone(&slot);
        let thread_counters = Arc::clone(&counters);
        let handle = std::thread::Builder::new()
            .name("frame-analyzer".to_string())
            .spawn(move || {
                let mut detector = match make_detector() {
                    Ok(detector) => Ok(detector),
                    Err(e) => {
                        log::error!("Face detection disabled: {}", e);
                        Err(e)
                    }
                };

                while let Some(mut frame) = thread_slot.take() {
                    frame.mark_delivered();
                    let report = match detector.as_mut() {
                        Ok(detector) => analyze_frame(detector, frame, target, &thread_counters),
                        Err(e) => {
                            let report = AnalysisReport {
                                generation: frame.generation(),
                                sequence: frame.sequence(),
                                outcome: Err(e.clone()),
                            };
                            frame.close();
                            Some(report)
                        }
                    };
                    if let Some(report) = report {
                        sink(report);
                    }
                }
                log::debug!("Frame analyzer stopped");
            });

        let thread = match handle {
            Ok(handle) => Some(handle),
            Err(e) => {
                log::error!("Failed to spawn analysis thread: {}", e);
                None
            }
        };

        Self {
            slot,
            counters,
            thread,
        }
    }

    pub fn stats(&self) -> AnalyzerStats {
        self.counters.snapshot()
    }

    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Close the frame slot and wait for the analysis thread to finish.
    pub fn stop(&mut self) {
        self.slot.close();
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for FrameAnalyzer {
    fn drop(&mut self) {
        self.stop();
    }
}
