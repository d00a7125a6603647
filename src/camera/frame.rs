//! Frames handed from a bound session to the analysis stage.
//!
//! A [`Frame`] owns a lease on the producer's buffer. The lease is released
//! when the frame is dropped or [`Frame::close`]d, so each frame is released
//! exactly once on every path. A shared [`FrameLedger`] counts what happened
//! to every frame so the producer (and tests) can check nothing leaked.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::errors::FrameExtractionError;

/// Pixel format of a frame image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameFormat {
    /// RGB format (3 bytes per pixel)
    Rgb,
    /// 8-bit luminance (1 byte per pixel)
    Luma,
}

impl FrameFormat {
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            FrameFormat::Rgb => 3,
            FrameFormat::Luma => 1,
        }
    }
}

/// Sensor rotation relative to the display, in clockwise quarter turns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Rotation {
    #[default]
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl Rotation {
    pub fn degrees(&self) -> u16 {
        match self {
            Rotation::Deg0 => 0,
            Rotation::Deg90 => 90,
            Rotation::Deg180 => 180,
            Rotation::Deg270 => 270,
        }
    }

    /// Nearest quarter turn for an arbitrary angle.
    pub fn from_degrees(degrees: i32) -> Self {
        match ((degrees.rem_euclid(360) + 45) / 90) % 4 {
            1 => Rotation::Deg90,
            2 => Rotation::Deg180,
            3 => Rotation::Deg270,
            _ => Rotation::Deg0,
        }
    }
}

/// Image data carried by a frame. Cloning shares the pixel buffer.
#[derive(Debug, Clone)]
pub struct FrameImage {
    /// Raw pixel data
    pub data: Arc<[u8]>,
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Pixel format
    pub format: FrameFormat,
    /// Timestamp when frame was captured
    pub timestamp: Instant,
}

impl FrameImage {
    pub fn new(data: Vec<u8>, width: u32, height: u32, format: FrameFormat) -> Self {
        Self {
            data: data.into(),
            width,
            height,
            format,
            timestamp: Instant::now(),
        }
    }

    pub fn bytes_per_pixel(&self) -> usize {
        self.format.bytes_per_pixel()
    }

    /// Buffer length implied by the dimensions and format.
    pub fn expected_len(&self) -> usize {
        self.width as usize * self.height as usize * self.bytes_per_pixel()
    }
}

/// Counters describing every frame a producer handed out.
///
/// `dropped` counts frames released without reaching the analyzer
/// (superseded by a newer frame); `released` counts frames released after
/// delivery.
#[derive(Debug, Default)]
pub struct FrameLedger {
    produced: AtomicU64,
    dropped: AtomicU64,
    delivered: AtomicU64,
    released: AtomicU64,
}

/// Point-in-time copy of a [`FrameLedger`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LedgerSnapshot {
    pub produced: u64,
    pub dropped: u64,
    pub delivered: u64,
    pub released: u64,
}

impl LedgerSnapshot {
    /// Frames delivered to the analyzer and not yet released.
    pub fn in_flight(&self) -> u64 {
        self.delivered.saturating_sub(self.released)
    }

    /// Frames produced but neither dropped nor delivered yet.
    pub fn pending(&self) -> u64 {
        self.produced
            .saturating_sub(self.dropped)
            .saturating_sub(self.delivered)
    }
}

impl FrameLedger {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn snapshot(&self) -> LedgerSnapshot {
        LedgerSnapshot {
            produced: self.produced.load(Ordering::SeqCst),
            dropped: self.dropped.load(Ordering::SeqCst),
            delivered: self.delivered.load(Ordering::SeqCst),
            released: self.released.load(Ordering::SeqCst),
        }
    }
}

struct FrameLease {
    ledger: Arc<FrameLedger>,
    delivered: bool,
}

impl Drop for FrameLease {
    fn drop(&mut self) {
        if self.delivered {
            self.ledger.released.fetch_add(1, Ordering::SeqCst);
        } else {
            self.ledger.dropped.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// A camera frame on its way to the analyzer.
pub struct Frame {
    image: Option<FrameImage>,
    rotation: Rotation,
    sequence: u64,
    generation: u64,
    lease: FrameLease,
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("sequence", &self.sequence)
            .field("generation", &self.generation)
            .field("rotation", &self.rotation)
            .field("has_image", &self.image.is_some())
            .finish_non_exhaustive()
    }
}

impl Frame {
    /// Create a frame and record it as produced in `ledger`.
    ///
    /// `generation` identifies the session that produced the frame.
    pub fn new(
        image: Option<FrameImage>,
        rotation: Rotation,
        sequence: u64,
        generation: u64,
        ledger: Arc<FrameLedger>,
    ) -> Self {
        ledger.produced.fetch_add(1, Ordering::SeqCst);
        Self {
            image,
            rotation,
            sequence,
            generation,
            lease: FrameLease {
                ledger,
                delivered: false,
            },
        }
    }

    /// Extract the image, validating the buffer against its dimensions.
    pub fn image(&self) -> Result<&FrameImage, FrameExtractionError> {
        let image = self
            .image
            .as_ref()
            .ok_or(FrameExtractionError::MissingBuffer(self.sequence))?;
        let expected = image.expected_len();
        if image.data.len() != expected || expected == 0 {
            return Err(FrameExtractionError::SizeMismatch {
                sequence: self.sequence,
                expected,
                actual: image.data.len(),
            });
        }
        Ok(image)
    }

    pub fn rotation(&self) -> Rotation {
        self.rotation
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Record the hand-off to the analyzer. From here on, releasing the
    /// frame counts as `released` rather than `dropped`.
    pub(crate) fn mark_delivered(&mut self) {
        if !self.lease.delivered {
            self.lease.delivered = true;
            self.lease.ledger.delivered.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Release the frame back to the producer.
    pub fn close(self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rgb(width: u32, height: u32) -> FrameImage {
        FrameImage::new(vec![0; (width * height * 3) as usize], width, height, FrameFormat::Rgb)
    }

    #[test]
    fn test_rotation_from_degrees() {
        assert_eq!(Rotation::from_degrees(0), Rotation::Deg0);
        assert_eq!(Rotation::from_degrees(90), Rotation::Deg90);
        assert_eq!(Rotation::from_degrees(-90), Rotation::Deg270);
        assert_eq!(Rotation::from_degrees(185), Rotation::Deg180);
        assert_eq!(Rotation::from_degrees(359), Rotation::Deg0);
        assert_eq!(Rotation::Deg270.degrees(), 270);
    }

    #[test]
    fn test_undelivered_frame_counts_as_dropped() {
        let ledger = FrameLedger::new();
        let frame = Frame::new(Some(rgb(2, 2)), Rotation::Deg0, 1, 1, ledger.clone());
        assert_eq!(ledger.snapshot().pending(), 1);
        drop(frame);
        let snap = ledger.snapshot();
        assert_eq!(snap.produced, 1);
        assert_eq!(snap.dropped, 1);
        assert_eq!(snap.released, 0);
    }

    #[test]
    fn test_delivered_frame_released_once_on_close() {
        let ledger = FrameLedger::new();
        let mut frame = Frame::new(Some(rgb(2, 2)), Rotation::Deg90, 1, 1, ledger.clone());
        frame.mark_delivered();
        frame.mark_delivered();
        assert_eq!(ledger.snapshot().in_flight(), 1);
        frame.close();
        let snap = ledger.snapshot();
        assert_eq!(snap.delivered, 1);
        assert_eq!(snap.released, 1);
        assert_eq!(snap.dropped, 0);
        assert_eq!(snap.in_flight(), 0);
    }

    #[test]
    fn test_image_missing_buffer() {
        let frame = Frame::new(None, Rotation::Deg0, 4, 1, FrameLedger::new());
        assert_eq!(
            frame.image().unwrap_err(),
            FrameExtractionError::MissingBuffer(4)
        );
    }

    #[test]
    fn test_image_size_mismatch() {
        let image = FrameImage::new(vec![0; 5], 2, 2, FrameFormat::Rgb);
        let frame = Frame::new(Some(image), Rotation::Deg0, 9, 1, FrameLedger::new());
        assert!(matches!(
            frame.image(),
            Err(FrameExtractionError::SizeMismatch {
                sequence: 9,
                expected: 12,
                actual: 5
            })
        ));
    }

    #[test]
    fn test_image_valid() {
        let frame = Frame::new(Some(rgb(4, 3)), Rotation::Deg0, 1, 2, FrameLedger::new());
        let image = frame.image().unwrap();
        assert_eq!(image.width, 4);
        assert_eq!(image.bytes_per_pixel(), 3);
        assert_eq!(frame.generation(), 2);
    }
}
