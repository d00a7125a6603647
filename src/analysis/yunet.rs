//! YuNet face detector executed with `tract-onnx`.
//!
//! Frames are stretched to a square network input, converted to BGR
//! planes, and run through the model. Both YuNet export layouts are
//! accepted: a single fused `[N, 15]` tensor, or the raw per-stride
//! `cls`/`obj`/`bbox`/`kps` heads which are decoded here.

use std::cmp::Ordering;
use std::path::Path;

use log::{debug, info};
use tract_onnx::prelude::{
    tvec, Datum, Framework, Graph, InferenceModelExt, IntoTensor, SimplePlan, Tensor, TractError,
    TypedFact, TypedOp,
};

use super::detector::{FaceBox, FaceDetector, Faces};
use crate::camera::{FrameFormat, FrameImage};
use crate::errors::DetectionError;

type RunnableModel = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

const STRIDES: [usize; 3] = [8, 16, 32];
const OUTPUTS_PER_STRIDE: usize = 4; // cls, obj, bbox, kps
const FUSED_COLS: usize = 15; // bbox (4) + landmarks (10) + score (1)

/// Square network input edge. Must be a multiple of the largest stride.
pub const INPUT_SIZE: usize = 320;

/// Filtering applied to raw candidates.
#[derive(Debug, Clone, Copy)]
pub struct YuNetSettings {
    pub score_threshold: f32,
    pub nms_threshold: f32,
    /// Smallest face edge kept, in analyzed-image pixels
    pub min_face_size: u32,
}

impl Default for YuNetSettings {
    fn default() -> Self {
        Self {
            score_threshold: 0.9,
            nms_threshold: 0.3,
            min_face_size: 40,
        }
    }
}

/// Candidate box in network input coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Candidate {
    x: f32,
    y: f32,
    w: f32,
    h: f32,
    score: f32,
}

impl Candidate {
    fn area(&self) -> f32 {
        self.w.max(0.0) * self.h.max(0.0)
    }

    fn iou(&self, other: &Candidate) -> f32 {
        let x1 = self.x.max(other.x);
        let y1 = self.y.max(other.y);
        let x2 = (self.x + self.w).min(other.x + other.w);
        let y2 = (self.y + self.h).min(other.y + other.h);
        let inter = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
        if inter <= 0.0 {
            return 0.0;
        }
        let union = self.area() + other.area() - inter;
        if union <= 0.0 {
            0.0
        } else {
            inter / union
        }
    }
}

pub struct YuNetDetector {
    runnable: RunnableModel,
    settings: YuNetSettings,
}

impl YuNetDetector {
    /// Load and optimize an ONNX model for a fixed [`INPUT_SIZE`] input.
    pub fn load(model_path: &Path, settings: YuNetSettings) -> Result<Self, DetectionError> {
        if !model_path.exists() {
            return Err(DetectionError::ModelUnavailable(format!(
                "model file not found: {}",
                model_path.display()
            )));
        }
        let unavailable = |e: TractError| {
            DetectionError::ModelUnavailable(format!("{}: {}", model_path.display(), e))
        };

        let runnable = tract_onnx::onnx()
            .model_for_path(model_path)
            .map_err(unavailable)?
            .with_input_fact(0, f32::fact([1, 3, INPUT_SIZE, INPUT_SIZE]).into())
            .map_err(unavailable)?
            .into_optimized()
            .map_err(unavailable)?
            .into_runnable()
            .map_err(unavailable)?;

        info!(
            "Loaded face model {} ({}x{})",
            model_path.display(),
            INPUT_SIZE,
            INPUT_SIZE
        );
        Ok(Self { runnable, settings })
    }
}

impl FaceDetector for YuNetDetector {
    fn detect(&mut self, image: &FrameImage) -> Result<Faces, DetectionError> {
        if image.width == 0 || image.height == 0 || image.data.len() != image.expected_len() {
            return Err(DetectionError::Failed(format!(
                "image buffer {} does not match {}x{}",
                image.data.len(),
                image.width,
                image.height
            )));
        }

        let input = Tensor::from_shape(&[1, 3, INPUT_SIZE, INPUT_SIZE], &bgr_planes(image))
            .map_err(|e| DetectionError::Failed(format!("input tensor: {}", e)))?;
        let outputs = self
            .runnable
            .run(tvec![input.into()])
            .map_err(|e| DetectionError::Failed(format!("inference: {}", e)))?;
        let tensors: Vec<Tensor> = outputs.into_iter().map(|v| v.into_tensor()).collect();

        let candidates = decode(&tensors)?;
        let kept = filter(candidates, &self.settings);
        debug!("YuNet kept {} of the decoded candidates", kept.len());

        let scale_x = image.width as f32 / INPUT_SIZE as f32;
        let scale_y = image.height as f32 / INPUT_SIZE as f32;
        Ok(kept
            .into_iter()
            .map(|c| FaceBox {
                x: (c.x * scale_x).round() as i32,
                y: (c.y * scale_y).round() as i32,
                width: (c.w * scale_x).round().max(0.0) as u32,
                height: (c.h * scale_y).round().max(0.0) as u32,
                score: c.score,
            })
            .filter(|f| f.width.min(f.height) >= self.settings.min_face_size)
            .collect())
    }
}

/// Nearest-neighbour stretch to the network input, as BGR CHW floats.
fn bgr_planes(image: &FrameImage) -> Vec<f32> {
    let plane = INPUT_SIZE * INPUT_SIZE;
    let mut out = vec![0f32; plane * 3];
    let bpp = image.bytes_per_pixel();
    let (w, h) = (image.width as usize, image.height as usize);

    for y in 0..INPUT_SIZE {
        let src_y = y * h / INPUT_SIZE;
        for x in 0..INPUT_SIZE {
            let src_x = x * w / INPUT_SIZE;
            let px = &image.data[(src_y * w + src_x) * bpp..][..bpp];
            let (r, g, b) = match image.format {
                FrameFormat::Rgb => (px[0], px[1], px[2]),
                FrameFormat::Luma => (px[0], px[0], px[0]),
            };
            let idx = y * INPUT_SIZE + x;
            out[idx] = b as f32;
            out[plane + idx] = g as f32;
            out[2 * plane + idx] = r as f32;
        }
    }
    out
}

fn as_f32(tensor: &Tensor) -> Result<&[f32], DetectionError> {
    tensor
        .as_slice::<f32>()
        .map_err(|e| DetectionError::Failed(format!("model output is not f32: {}", e)))
}

fn decode(outputs: &[Tensor]) -> Result<Vec<Candidate>, DetectionError> {
    match outputs.len() {
        1 => decode_fused(as_f32(&outputs[0])?),
        n if n == STRIDES.len() * OUTPUTS_PER_STRIDE => {
            let heads = outputs
                .iter()
                .map(as_f32)
                .collect::<Result<Vec<_>, _>>()?;
            decode_strides(&heads)
        }
        n => Err(DetectionError::Failed(format!(
            "unexpected number of model outputs: {}",
            n
        ))),
    }
}

/// Rows of `[x, y, w, h, 10 landmark coords, score]`.
fn decode_fused(data: &[f32]) -> Result<Vec<Candidate>, DetectionError> {
    if data.len() % FUSED_COLS != 0 {
        return Err(DetectionError::Failed(format!(
            "fused output length {} is not a multiple of {}",
            data.len(),
            FUSED_COLS
        )));
    }
    Ok(data
        .chunks_exact(FUSED_COLS)
        .map(|row| Candidate {
            x: row[0],
            y: row[1],
            w: row[2],
            h: row[3],
            score: row[14],
        })
        .collect())
}

/// Heads ordered `cls[8,16,32], obj[8,16,32], bbox[8,16,32], kps[8,16,32]`.
fn decode_strides(heads: &[&[f32]]) -> Result<Vec<Candidate>, DetectionError> {
    let mut candidates = Vec::new();

    for (i, &stride) in STRIDES.iter().enumerate() {
        let cols = INPUT_SIZE / stride;
        let cells = cols * cols;
        let cls = heads[i];
        let obj = heads[i + STRIDES.len()];
        let bbox = heads[i + STRIDES.len() * 2];
        if cls.len() != cells || obj.len() != cells || bbox.len() != cells * 4 {
            return Err(DetectionError::Failed(format!(
                "stride {} head sizes do not match a {}x{} grid",
                stride, cols, cols
            )));
        }

        let s = stride as f32;
        for idx in 0..cells {
            let (row, col) = (idx / cols, idx % cols);
            let score = (cls[idx].clamp(0.0, 1.0) * obj[idx].clamp(0.0, 1.0)).sqrt();
            let d = &bbox[idx * 4..idx * 4 + 4];
            let cx = (col as f32 + d[0]) * s;
            let cy = (row as f32 + d[1]) * s;
            let w = d[2].exp() * s;
            let h = d[3].exp() * s;
            candidates.push(Candidate {
                x: cx - w / 2.0,
                y: cy - h / 2.0,
                w,
                h,
                score: if score.is_finite() { score } else { 0.0 },
            });
        }
    }
    Ok(candidates)
}

/// Score threshold, then greedy non-maximum suppression.
fn filter(mut candidates: Vec<Candidate>, settings: &YuNetSettings) -> Vec<Candidate> {
    candidates.retain(|c| {
        c.score.is_finite() && c.score >= settings.score_threshold && c.w > 0.0 && c.h > 0.0
    });
    candidates.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));

    let mut kept: Vec<Candidate> = Vec::with_capacity(candidates.len());
    for c in candidates {
        if kept.iter().all(|k| k.iou(&c) <= settings.nms_threshold) {
            kept.push(c);
        }
    }
    kept
}
