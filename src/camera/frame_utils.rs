//! Frame conversion and transformation utilities.

use super::frame::{FrameFormat, FrameImage, Rotation};
use super::types::{Resolution, ZoomRatio};

/// Mirror a pixel buffer horizontally (flip left-right) for selfie mode.
pub fn mirror_horizontal(data: &mut [u8], width: u32, height: u32, bpp: usize) {
    let width = width as usize;
    let height = height as usize;

    for y in 0..height {
        let row_start = y * width * bpp;
        let row = &mut data[row_start..row_start + width * bpp];

        for x in 0..width / 2 {
            let left = x * bpp;
            let right = (width - 1 - x) * bpp;
            for i in 0..bpp {
                row.swap(left + i, right + i);
            }
        }
    }
}

/// Digital zoom: crop the centre `1/zoom` of the image.
///
/// Returns the input unchanged (sharing its buffer) when no zoom is applied.
pub fn center_crop(image: &FrameImage, zoom: ZoomRatio) -> FrameImage {
    if zoom.value() <= ZoomRatio::MIN {
        return image.clone();
    }

    let bpp = image.bytes_per_pixel();
    let crop_w = ((image.width as f32 / zoom.value()).round() as u32).max(1);
    let crop_h = ((image.height as f32 / zoom.value()).round() as u32).max(1);
    let x0 = (image.width - crop_w) / 2;
    let y0 = (image.height - crop_h) / 2;

    let mut out = Vec::with_capacity(crop_w as usize * crop_h as usize * bpp);
    for y in y0..y0 + crop_h {
        let start = (y as usize * image.width as usize + x0 as usize) * bpp;
        out.extend_from_slice(&image.data[start..start + crop_w as usize * bpp]);
    }

    FrameImage {
        data: out.into(),
        width: crop_w,
        height: crop_h,
        format: image.format,
        timestamp: image.timestamp,
    }
}

/// Turn a sensor-oriented image upright by rotating it clockwise by
/// `rotation`. Quarter turns swap width and height.
pub fn rotate_upright(image: &FrameImage, rotation: Rotation) -> FrameImage {
    if rotation == Rotation::Deg0 {
        return image.clone();
    }

    let (w, h) = (image.width as usize, image.height as usize);
    let bpp = image.bytes_per_pixel();
    let (out_w, out_h) = match rotation {
        Rotation::Deg90 | Rotation::Deg270 => (h, w),
        Rotation::Deg0 | Rotation::Deg180 => (w, h),
    };

    let mut out = Vec::with_capacity(out_w * out_h * bpp);
    for y in 0..out_h {
        for x in 0..out_w {
            let (src_x, src_y) = match rotation {
                Rotation::Deg90 => (y, h - 1 - x),
                Rotation::Deg180 => (w - 1 - x, h - 1 - y),
                Rotation::Deg270 => (w - 1 - y, x),
                Rotation::Deg0 => (x, y),
            };
            let start = (src_y * w + src_x) * bpp;
            out.extend_from_slice(&image.data[start..start + bpp]);
        }
    }

    FrameImage {
        data: out.into(),
        width: out_w as u32,
        height: out_h as u32,
        format: image.format,
        timestamp: image.timestamp,
    }
}

/// Convert an image to 8-bit luminance (BT.601 weights).
pub fn to_luma(image: &FrameImage) -> FrameImage {
    match image.format {
        FrameFormat::Luma => image.clone(),
        FrameFormat::Rgb => {
            let gray: Vec<u8> = image
                .data
                .chunks_exact(3)
                .map(|px| {
                    let y = 299 * px[0] as u32 + 587 * px[1] as u32 + 114 * px[2] as u32;
                    (y / 1000) as u8
                })
                .collect();
            FrameImage {
                data: gray.into(),
                width: image.width,
                height: image.height,
                format: FrameFormat::Luma,
                timestamp: image.timestamp,
            }
        }
    }
}

/// Nearest-neighbour downscale so the image fits within `target`,
/// preserving aspect ratio. Images already within bounds are returned as-is.
pub fn fit_within(image: &FrameImage, target: Resolution) -> FrameImage {
    if image.width <= target.width && image.height <= target.height {
        return image.clone();
    }

    let scale = f32::min(
        target.width as f32 / image.width as f32,
        target.height as f32 / image.height as f32,
    );
    let out_w = ((image.width as f32 * scale) as u32).max(1);
    let out_h = ((image.height as f32 * scale) as u32).max(1);
    let bpp = image.bytes_per_pixel();

    let mut out = Vec::with_capacity(out_w as usize * out_h as usize * bpp);
    for y in 0..out_h {
        let src_y = (y as u64 * image.height as u64 / out_h as u64) as usize;
        for x in 0..out_w {
            let src_x = (x as u64 * image.width as u64 / out_w as u64) as usize;
            let start = (src_y * image.width as usize + src_x) * bpp;
            out.extend_from_slice(&image.data[start..start + bpp]);
        }
    }

    FrameImage {
        data: out.into(),
        width: out_w,
        height: out_h,
        format: image.format,
        timestamp: image.timestamp,
    }
}
