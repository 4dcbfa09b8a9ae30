//! In-buffer rectangle rendering.
//!
//! Draws unfilled box outlines directly into the CHW tensor that fed the
//! inference engine, so the annotated frame can go straight back through
//! the codec to the display collaborator. This is one of the two
//! documented in-place operations: the tensor is mutated, not replaced.

use crate::decode::Detection;
use crate::labels::ClassColorMap;
use crate::tensor::{Layout, TensorBuffer, TensorError};
use tracing::warn;

/// Reference thickness multiplier: outline depth is
/// `round(confidence * scale)` pixels.
pub const DEFAULT_THICKNESS_SCALE: f32 = 10.0;

/// Outline depth for one detection, never below one pixel.
fn outline_thickness(confidence: f32, scale: f32) -> usize {
    ((confidence * scale).round() as usize).max(1)
}

/// Clamps a corner coordinate to a valid pixel index on an axis of `len`.
fn clamp_axis(v: f32, len: usize) -> usize {
    (v.round().max(0.0) as usize).min(len - 1)
}

/// Fills an inclusive pixel rectangle with `color` on channels 0..=2
/// (bounded by the tensor's channel count).
fn fill_band(
    tensor: &mut TensorBuffer,
    x: (usize, usize),
    y: (usize, usize),
    color: [f32; 3],
) {
    let channels = tensor.shape().channels.min(3);
    for c in 0..channels {
        for py in y.0..=y.1 {
            for px in x.0..=x.1 {
                tensor.set(0, py, px, c, color[c]);
            }
        }
    }
}

/// Draws each detection's outline into a batch-1 CHW tensor.
///
/// The edge bands grow inward from the box edges, `thickness` pixels deep,
/// clipped to the canvas. Overlapping boxes are last-writer-wins.
/// Detections whose label has no color are skipped with a warning,
/// mirroring the decoder's recoverable-skip policy.
///
/// # Errors
///
/// Returns [`TensorError::LayoutMismatch`] for non-CHW input and
/// [`TensorError::UnsupportedBatch`] for batch != 1.
pub fn draw_detections(
    tensor: &mut TensorBuffer,
    detections: &[Detection],
    colors: &ClassColorMap,
    thickness_scale: f32,
) -> Result<(), TensorError> {
    tensor.ensure_layout(Layout::Chw)?;
    let shape = tensor.shape();
    if shape.batch != 1 {
        return Err(TensorError::UnsupportedBatch(shape.batch));
    }
    let (width, height) = (shape.width, shape.height);

    for detection in detections {
        let Some(rgb) = colors.get(&detection.label) else {
            warn!(label = %detection.label, "no color for label, box not drawn");
            continue;
        };
        let color = [rgb.r, rgb.g, rgb.b];

        let (fx1, fy1, fx2, fy2) = detection.rect.corners();
        let x1 = clamp_axis(fx1, width);
        let y1 = clamp_axis(fy1, height);
        let x2 = clamp_axis(fx2, width).max(x1);
        let y2 = clamp_axis(fy2, height).max(y1);

        let t = outline_thickness(detection.confidence, thickness_scale);
        // Bands grow inward and never cross the opposite edge.
        let top_end = (y1 + t - 1).min(y2);
        let bottom_start = y2.saturating_sub(t - 1).max(y1);
        let left_end = (x1 + t - 1).min(x2);
        let right_start = x2.saturating_sub(t - 1).max(x1);

        fill_band(tensor, (x1, x2), (y1, top_end), color);
        fill_band(tensor, (x1, x2), (bottom_start, y2), color);
        fill_band(tensor, (x1, left_end), (y1, y2), color);
        fill_band(tensor, (right_start, x2), (y1, y2), color);
    }

    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
