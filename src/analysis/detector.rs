//! Face detection capability used by the analysis stage.

use crate::camera::frame_utils::to_luma;
use crate::camera::FrameImage;
use crate::errors::DetectionError;

/// A detected face, in pixel coordinates of the analyzed image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaceBox {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
    pub score: f32,
}

pub type Faces = Vec<FaceBox>;

/// Detection interface.
///
/// Implementations may be stateful (e.g., tracking across frames),
/// hence `&mut self`.
pub trait FaceDetector {
    fn detect(&mut self, image: &FrameImage) -> Result<Faces, DetectionError>;
}

impl<D: FaceDetector + ?Sized> FaceDetector for Box<D> {
    fn detect(&mut self, image: &FrameImage) -> Result<Faces, DetectionError> {
        (**self).detect(image)
    }
}

/// Counts bright square markers, such as those drawn by the synthetic camera.
///
/// Pixels at or above `threshold` luminance are grouped into 4-connected
/// regions; regions of at least `min_area` pixels count as faces.
#[derive(Debug, Clone)]
pub struct MarkerDetector {
    pub threshold: u8,
    pub min_area: usize,
}

impl Default for MarkerDetector {
    fn default() -> Self {
        Self {
            threshold: 250,
            min_area: 16,
        }
    }
}

impl FaceDetector for MarkerDetector {
    fn detect(&mut self, image: &FrameImage) -> Result<Faces, DetectionError> {
        let gray = to_luma(image);
        let (w, h) = (gray.width as usize, gray.height as usize);
        if gray.data.len() != w * h {
            return Err(DetectionError::Failed(format!(
                "image buffer {} does not match {}x{}",
                gray.data.len(),
                w,
                h
            )));
        }

        let mut visited = vec![false; w * h];
        let mut faces = Vec::new();
        let mut stack = Vec::new();

        for start in 0..w * h {
            if visited[start] || gray.data[start] < self.threshold {
                continue;
            }
            visited[start] = true;
            stack.push(start);

            let (mut min_x, mut min_y, mut max_x, mut max_y) = (w, h, 0, 0);
            let mut area = 0usize;
            while let Some(idx) = stack.pop() {
                let (x, y) = (idx % w, idx / w);
                area += 1;
                min_x = min_x.min(x);
                min_y = min_y.min(y);
                max_x = max_x.max(x);
                max_y = max_y.max(y);

                let mut visit = |n: usize| {
                    if !visited[n] && gray.data[n] >= self.threshold {
                        visited[n] = true;
                        stack.push(n);
                    }
                };
                if x > 0 {
                    visit(idx - 1);
                }
                if x + 1 < w {
                    visit(idx + 1);
                }
                if y > 0 {
                    visit(idx - w);
                }
                if y + 1 < h {
                    visit(idx + w);
                }
            }

            if area >= self.min_area {
                faces.push(FaceBox {
                    x: min_x as i32,
                    y: min_y as i32,
                    width: (max_x - min_x + 1) as u32,
                    height: (max_y - min_y + 1) as u32,
                    score: 1.0,
                });
            }
        }

        Ok(faces)
    }
}
