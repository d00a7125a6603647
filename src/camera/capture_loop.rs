//! Background capture thread implementation.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use super::capture::{FrameSource, SourceFrame};
use super::frame_utils::center_crop;
use super::provider::Outputs;
use super::types::{Resolution, ZoomRatio};
use crate::errors::BindError;

/// Shared state the capture thread reads on every iteration.
pub struct LoopContext {
    pub outputs: Outputs,
    pub generation: u64,
    pub zoom: Arc<AtomicU32>,
    pub stop: Arc<AtomicBool>,
}

/// Run the capture loop in a background thread.
pub fn run_capture_loop<S: FrameSource>(
    mut source: S,
    ctx: LoopContext,
    info_tx: Sender<Result<Resolution, BindError>>,
) {
    match source.open() {
        Ok(resolution) => {
            let _ = info_tx.send(Ok(resolution));
        }
        Err(e) => {
            let _ = info_tx.send(Err(e));
            return;
        }
    }

    let rotation = source.rotation();

    while !ctx.stop.load(Ordering::Relaxed) {
        let frame = match source.next_frame() {
            SourceFrame::Image(image) if image.data.len() != image.expected_len() => {
                log::debug!(
                    "Dropping {}x{} frame holding {} bytes, expected {}",
                    image.width,
                    image.height,
                    image.data.len(),
                    image.expected_len()
                );
                SourceFrame::Corrupt
            }
            frame => frame,
        };

        match frame {
            SourceFrame::Image(image) => {
                let zoom = ZoomRatio::clamped(f32::from_bits(ctx.zoom.load(Ordering::Relaxed)));
                let image = center_crop(&image, zoom);

                ctx.outputs.preview.publish(ctx.generation, &image);
                if let Some(analysis) = &ctx.outputs.analysis {
                    analysis.submit(ctx.generation, Some(image), rotation);
                }
            }
            SourceFrame::Corrupt => {
                // The analyzer still receives the frame so it can release it.
                if let Some(analysis) = &ctx.outputs.analysis {
                    analysis.submit(ctx.generation, None, rotation);
                }
            }
            SourceFrame::Empty => {}
        }

        // Small sleep to allow checking stop signal
        thread::sleep(Duration::from_millis(1));
    }

    source.close();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::{
        AnalysisConfig, AnalysisOutput, FrameFormat, FrameImage, PreviewOutput, PreviewSurface,
    };
    use std::sync::atomic::AtomicU64;
    use std::sync::mpsc;

    struct ScriptedSource {
        frames: Vec<SourceFrame>,
        stop: Arc<AtomicBool>,
    }

    impl FrameSource for ScriptedSource {
        fn open(&mut self) -> Result<Resolution, BindError> {
            Ok(Resolution {
                width: 4,
                height: 4,
            })
        }

        fn next_frame(&mut self) -> SourceFrame {
            if self.frames.is_empty() {
                self.stop.store(true, Ordering::SeqCst);
                return SourceFrame::Empty;
            }
            self.frames.remove(0)
        }
    }

    struct SizeSurface(AtomicU64);

    impl PreviewSurface for SizeSurface {
        fn render(&self, image: &FrameImage) {
            self.0.store(image.width as u64, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_loop_applies_zoom_and_feeds_outputs() {
        let preview = PreviewOutput::new();
        let surface = Arc::new(SizeSurface(AtomicU64::new(0)));
        preview.set_surface(3, surface.clone());
        let analysis = AnalysisOutput::new(AnalysisConfig::default());

        let stop = Arc::new(AtomicBool::new(false));
        let zoom = Arc::new(AtomicU32::new(2.0f32.to_bits()));
        let source = ScriptedSource {
            frames: vec![
                SourceFrame::Image(FrameImage::new(vec![0; 16], 4, 4, FrameFormat::Luma)),
                SourceFrame::Corrupt,
            ],
            stop: stop.clone(),
        };
        let ctx = LoopContext {
            outputs: Outputs::with_analysis(preview.clone(), analysis.clone()),
            generation: 3,
            zoom,
            stop,
        };
        let (tx, rx) = mpsc::channel();
        run_capture_loop(source, ctx, tx);

        assert!(rx.recv().unwrap().is_ok());
        assert_eq!(surface.0.load(Ordering::SeqCst), 2);
        assert_eq!(preview.rendered_frames(), 1);

        // The corrupt frame replaced the zoomed one in the analysis slot.
        let frame = analysis.slot().try_take().unwrap();
        assert!(frame.image().is_err());
        assert_eq!(analysis.ledger().snapshot().produced, 2);
    }

    #[test]
    fn test_loop_treats_mis_sized_image_as_corrupt() {
        let preview = PreviewOutput::new();
        let surface = Arc::new(SizeSurface(AtomicU64::new(0)));
        preview.set_surface(4, surface.clone());
        let analysis = AnalysisOutput::new(AnalysisConfig::default());

        let stop = Arc::new(AtomicBool::new(false));
        // Header says 4x4 RGB, buffer holds a 2x2 image.
        let source = ScriptedSource {
            frames: vec![SourceFrame::Image(FrameImage::new(
                vec![0; 12],
                4,
                4,
                FrameFormat::Rgb,
            ))],
            stop: stop.clone(),
        };
        let ctx = LoopContext {
            outputs: Outputs::with_analysis(preview.clone(), analysis.clone()),
            generation: 4,
            zoom: Arc::new(AtomicU32::new(2.0f32.to_bits())),
            stop,
        };
        let (tx, rx) = mpsc::channel();
        run_capture_loop(source, ctx, tx);

        assert!(rx.recv().unwrap().is_ok());
        assert_eq!(preview.rendered_frames(), 0);
        let frame = analysis.slot().try_take().unwrap();
        assert!(frame.image().is_err());
        drop(frame);
        let snap = analysis.ledger().snapshot();
        assert_eq!(snap.produced, 1);
        assert_eq!(snap.dropped, 1);
    }

    struct FailingSource;

    impl FrameSource for FailingSource {
        fn open(&mut self) -> Result<Resolution, BindError> {
            Err(BindError::PermissionDenied)
        }

        fn next_frame(&mut self) -> SourceFrame {
            SourceFrame::Empty
        }
    }

    #[test]
    fn test_loop_reports_open_failure() {
        let ctx = LoopContext {
            outputs: Outputs::preview_only(PreviewOutput::new()),
            generation: 1,
            zoom: Arc::new(AtomicU32::new(1.0f32.to_bits())),
            stop: Arc::new(AtomicBool::new(false)),
        };
        let (tx, rx) = mpsc::channel();
        run_capture_loop(FailingSource, ctx, tx);
        assert_eq!(rx.recv().unwrap(), Err(BindError::PermissionDenied));
    }
}
