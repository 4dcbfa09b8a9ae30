//! Geometric transforms over HWC image tensors.
//!
//! Every operation consumes its input and returns a fresh buffer, so one
//! buffer is live per pipeline stage. All transforms are batch-invariant:
//! each batch slice is processed independently with identical parameters.
//! Row loops run in parallel via rayon.

use crate::tensor::{Layout, Shape, TensorBuffer, TensorError};
use rayon::prelude::*;

/// Edge-aligned bilinear factor `(src-1)/(dst-1)`; a single-pixel target
/// pins to source coordinate 0.
fn edge_scale(src: usize, dst: usize) -> f32 {
    if dst <= 1 {
        0.0
    } else {
        (src - 1) as f32 / (dst - 1) as f32
    }
}

// ============================================================================
// Letterbox Resize
// ============================================================================

/// Aspect-preserving resize onto a `new_w` x `new_h` canvas.
///
/// The image is scaled by `min(new_w/old_w, new_h/old_h)`, so it fully fits
/// the canvas, and centered; uncovered canvas stays zero (the letterbox).
/// Scaled dimensions truncate (`floor`), padding splits the remainder
/// evenly with integer division. Sampling is bilinear with edge-aligned
/// factors, neighbors clamped to the source edge.
///
/// Resizing to the current dimensions returns the input unchanged.
///
/// # Errors
///
/// Returns [`TensorError::InvalidDimensions`] when a target dimension is
/// zero and [`TensorError::LayoutMismatch`] for non-HWC input.
pub fn resize(image: TensorBuffer, new_w: usize, new_h: usize) -> Result<TensorBuffer, TensorError> {
    image.ensure_layout(Layout::Hwc)?;
    if new_w == 0 || new_h == 0 {
        return Err(TensorError::InvalidDimensions {
            width: new_w,
            height: new_h,
        });
    }

    let Shape {
        batch,
        height: old_h,
        width: old_w,
        channels,
    } = image.shape();
    if old_w == new_w && old_h == new_h {
        return Ok(image);
    }

    let scale = (new_w as f32 / old_w as f32).min(new_h as f32 / old_h as f32);
    let scaled_w = (old_w as f32 * scale) as usize;
    let scaled_h = (old_h as f32 * scale) as usize;
    let pad_x = (new_w - scaled_w) / 2;
    let pad_y = (new_h - scaled_h) / 2;
    let sx = edge_scale(old_w, scaled_w);
    let sy = edge_scale(old_h, scaled_h);

    let src = image.as_slice();
    let mut out = TensorBuffer::zeros(Shape::new(batch, new_h, new_w, channels), Layout::Hwc);
    let row_len = new_w * channels;

    out.as_mut_slice()
        .par_chunks_mut(row_len)
        .enumerate()
        .for_each(|(r, row)| {
            let b = r / new_h;
            let y = r % new_h;
            if y < pad_y || y >= pad_y + scaled_h {
                return;
            }
            let src_y = (y - pad_y) as f32 * sy;
            let y1 = src_y as usize;
            let y2 = (y1 + 1).min(old_h - 1);
            let dy = src_y - y1 as f32;

            for x in 0..scaled_w {
                let src_x = x as f32 * sx;
                let x1 = src_x as usize;
                let x2 = (x1 + 1).min(old_w - 1);
                let dx = src_x - x1 as f32;
                let base = (pad_x + x) * channels;
                for c in 0..channels {
                    let q11 = src[((b * old_h + y1) * old_w + x1) * channels + c];
                    let q21 = src[((b * old_h + y1) * old_w + x2) * channels + c];
                    let q12 = src[((b * old_h + y2) * old_w + x1) * channels + c];
                    let q22 = src[((b * old_h + y2) * old_w + x2) * channels + c];
                    row[base + c] = (1.0 - dx) * (1.0 - dy) * q11
                        + dx * (1.0 - dy) * q21
                        + (1.0 - dx) * dy * q12
                        + dx * dy * q22;
                }
            }
        });

    Ok(out)
}

// ============================================================================
// Center Crop
// ============================================================================

/// Crops the largest centered square, side `min(H, W)`.
///
/// Already-square input is returned unchanged.
///
/// # Errors
///
/// Returns [`TensorError::LayoutMismatch`] for non-HWC input.
pub fn center_crop(image: TensorBuffer) -> Result<TensorBuffer, TensorError> {
    image.ensure_layout(Layout::Hwc)?;
    let Shape {
        batch,
        height,
        width,
        channels,
    } = image.shape();
    if height == width {
        return Ok(image);
    }

    let side = height.min(width);
    let x_off = (width - side) / 2;
    let y_off = (height - side) / 2;

    let src = image.as_slice();
    let mut out = TensorBuffer::zeros(Shape::new(batch, side, side, channels), Layout::Hwc);
    let row_len = side * channels;

    out.as_mut_slice()
        .par_chunks_mut(row_len)
        .enumerate()
        .for_each(|(r, row)| {
            let b = r / side;
            let y = r % side;
            let start = ((b * height + y + y_off) * width + x_off) * channels;
            row.copy_from_slice(&src[start..start + row_len]);
        });

    Ok(out)
}

// ============================================================================
// Rotation
// ============================================================================

/// Rotates image content about the `(W/2, H/2)` center.
///
/// Destination-to-source mapping: each destination offset is multiplied by
/// `[cos, -sin; sin, cos]`, translated back and rounded to the nearest
/// source pixel. Samples falling outside the canvas stay zero. Nearest
/// neighbor only, no interpolation.
///
/// # Errors
///
/// Returns [`TensorError::LayoutMismatch`] for non-HWC input.
pub fn rotate(image: TensorBuffer, angle_degrees: f32) -> Result<TensorBuffer, TensorError> {
    image.ensure_layout(Layout::Hwc)?;
    let Shape {
        height,
        width,
        channels,
        ..
    } = image.shape();

    let theta = angle_degrees.to_radians();
    let (sin_t, cos_t) = theta.sin_cos();
    let cx = width as f32 / 2.0;
    let cy = height as f32 / 2.0;

    let src = image.as_slice();
    let mut out = TensorBuffer::zeros(image.shape(), Layout::Hwc);
    let row_len = width * channels;

    out.as_mut_slice()
        .par_chunks_mut(row_len)
        .enumerate()
        .for_each(|(r, row)| {
            let b = r / height;
            let y = r % height;
            let y_off = y as f32 - cy;
            for x in 0..width {
                let x_off = x as f32 - cx;
                let src_x = (x_off * cos_t - y_off * sin_t + cx).round();
                let src_y = (x_off * sin_t + y_off * cos_t + cy).round();
                if src_x < 0.0 || src_y < 0.0 {
                    continue;
                }
                let (sx, sy) = (src_x as usize, src_y as usize);
                if sx >= width || sy >= height {
                    continue;
                }
                let sbase = ((b * height + sy) * width + sx) * channels;
                let dbase = x * channels;
                row[dbase..dbase + channels].copy_from_slice(&src[sbase..sbase + channels]);
            }
        });

    Ok(out)
}

// ============================================================================
// Flips
// ============================================================================

/// Mirrors along the W axis (left-right).
///
/// # Errors
///
/// Returns [`TensorError::LayoutMismatch`] for non-HWC input.
pub fn flip_horizontal(image: TensorBuffer) -> Result<TensorBuffer, TensorError> {
    image.ensure_layout(Layout::Hwc)?;
    let Shape {
        height,
        width,
        channels,
        ..
    } = image.shape();

    let src = image.as_slice();
    let mut out = TensorBuffer::zeros(image.shape(), Layout::Hwc);
    let row_len = width * channels;

    out.as_mut_slice()
        .par_chunks_mut(row_len)
        .enumerate()
        .for_each(|(r, row)| {
            let row_start = r * row_len;
            for x in 0..width {
                let sbase = row_start + (width - 1 - x) * channels;
                row[x * channels..(x + 1) * channels]
                    .copy_from_slice(&src[sbase..sbase + channels]);
            }
        });

    Ok(out)
}

/// Mirrors along the H axis (top-bottom).
///
/// # Errors
///
/// Returns [`TensorError::LayoutMismatch`] for non-HWC input.
pub fn flip_vertical(image: TensorBuffer) -> Result<TensorBuffer, TensorError> {
    image.ensure_layout(Layout::Hwc)?;
    let Shape { height, width, channels, .. } = image.shape();

    let src = image.as_slice();
    let mut out = TensorBuffer::zeros(image.shape(), Layout::Hwc);
    let row_len = width * channels;

    out.as_mut_slice()
        .par_chunks_mut(row_len)
        .enumerate()
        .for_each(|(r, row)| {
            let b = r / height;
            let y = r % height;
            let start = (b * height + (height - 1 - y)) * row_len;
            row.copy_from_slice(&src[start..start + row_len]);
        });

    Ok(out)
}

// ============================================================================
// Uniform Rescale
// ============================================================================

/// Uniform bilinear scale by `factor`; output dims are
/// `floor(W*factor)` x `floor(H*factor)`.
///
/// Unlike [`resize`], sampling uses the plain reciprocal
/// (`src = dst / factor`) rather than edge-aligned factors.
///
/// # Errors
///
/// Returns [`TensorError::InvalidScale`] for a non-finite or non-positive
/// factor, [`TensorError::InvalidDimensions`] when the result collapses to
/// zero pixels, and [`TensorError::LayoutMismatch`] for non-HWC input.
pub fn rescale(image: TensorBuffer, factor: f32) -> Result<TensorBuffer, TensorError> {
    image.ensure_layout(Layout::Hwc)?;
    if !factor.is_finite() || factor <= 0.0 {
        return Err(TensorError::InvalidScale(factor));
    }

    let Shape {
        batch,
        height: old_h,
        width: old_w,
        channels,
    } = image.shape();
    let new_w = (old_w as f32 * factor) as usize;
    let new_h = (old_h as f32 * factor) as usize;
    if new_w == 0 || new_h == 0 {
        return Err(TensorError::InvalidDimensions {
            width: new_w,
            height: new_h,
        });
    }

    let src = image.as_slice();
    let mut out = TensorBuffer::zeros(Shape::new(batch, new_h, new_w, channels), Layout::Hwc);
    let row_len = new_w * channels;

    out.as_mut_slice()
        .par_chunks_mut(row_len)
        .enumerate()
        .for_each(|(r, row)| {
            let b = r / new_h;
            let y = r % new_h;
            let src_y = y as f32 / factor;
            let y1 = (src_y as usize).min(old_h - 1);
            let y2 = (y1 + 1).min(old_h - 1);
            let dy = src_y - y1 as f32;

            for x in 0..new_w {
                let src_x = x as f32 / factor;
                let x1 = (src_x as usize).min(old_w - 1);
                let x2 = (x1 + 1).min(old_w - 1);
                let dx = src_x - x1 as f32;
                for c in 0..channels {
                    let q11 = src[((b * old_h + y1) * old_w + x1) * channels + c];
                    let q21 = src[((b * old_h + y1) * old_w + x2) * channels + c];
                    let q12 = src[((b * old_h + y2) * old_w + x1) * channels + c];
                    let q22 = src[((b * old_h + y2) * old_w + x2) * channels + c];
                    row[x * channels + c] = (1.0 - dx) * (1.0 - dy) * q11
                        + dx * (1.0 - dy) * q21
                        + (1.0 - dx) * dy * q12
                        + dx * dy * q22;
                }
            }
        });

    Ok(out)
}

// ============================================================================
// Layout Permutation
// ============================================================================

/// Repacks interleaved storage into planar storage. The logical shape is
/// unchanged; only the layout tag and the flat order differ.
///
/// # Errors
///
/// Returns [`TensorError::LayoutMismatch`] for non-HWC input.
pub fn hwc_to_chw(image: TensorBuffer) -> Result<TensorBuffer, TensorError> {
    image.ensure_layout(Layout::Hwc)?;
    let Shape {
        height,
        width,
        channels,
        ..
    } = image.shape();

    let src = image.as_slice();
    let mut out = TensorBuffer::zeros(image.shape(), Layout::Chw);
    let plane_len = height * width;

    out.as_mut_slice()
        .par_chunks_mut(plane_len)
        .enumerate()
        .for_each(|(p, plane)| {
            let b = p / channels;
            let c = p % channels;
            for y in 0..height {
                for x in 0..width {
                    plane[y * width + x] = src[((b * height + y) * width + x) * channels + c];
                }
            }
        });

    Ok(out)
}

/// Repacks planar storage into interleaved storage.
///
/// # Errors
///
/// Returns [`TensorError::LayoutMismatch`] for non-CHW input.
pub fn chw_to_hwc(image: TensorBuffer) -> Result<TensorBuffer, TensorError> {
    image.ensure_layout(Layout::Chw)?;
    let Shape {
        height,
        width,
        channels,
        ..
    } = image.shape();

    let src = image.as_slice();
    let mut out = TensorBuffer::zeros(image.shape(), Layout::Hwc);
    let row_len = width * channels;

    out.as_mut_slice()
        .par_chunks_mut(row_len)
        .enumerate()
        .for_each(|(r, row)| {
            let b = r / height;
            let y = r % height;
            for x in 0..width {
                for c in 0..channels {
                    row[x * channels + c] =
                        src[((b * channels + c) * height + y) * width + x];
                }
            }
        });

    Ok(out)
}

// ============================================================================
// Tests
// ============================================================================
