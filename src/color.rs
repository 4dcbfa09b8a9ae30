//! Elementwise color transforms.

use crate::tensor::{Layout, Shape, TensorBuffer, TensorError};
use rayon::prelude::*;

/// Channel weighting for the RGB -> grayscale reduction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GrayWeights {
    /// Plain channel mean `(r + g + b) / 3`.
    #[default]
    Average,
    /// BT.601 luma `0.299 r + 0.587 g + 0.114 b`.
    Luma,
}

/// Elementwise `v * weight + bias` over the whole storage, any shape or
/// layout. The usual normalization step before inference
/// (e.g. `weight 2, bias -1` maps `[0, 1]` onto `[-1, 1]`).
#[must_use]
pub fn affine(mut image: TensorBuffer, weight: f32, bias: f32) -> TensorBuffer {
    affine_in_place(&mut image, weight, bias);
    image
}

/// In-place variant of [`affine`] for buffers the caller keeps holding.
pub fn affine_in_place(image: &mut TensorBuffer, weight: f32, bias: f32) {
    image
        .as_mut_slice()
        .par_iter_mut()
        .for_each(|v| *v = *v * weight + bias);
}

/// Reduces an RGB(A) tensor to one channel; alpha is ignored.
///
/// # Errors
///
/// Returns [`TensorError::UnsupportedChannels`] for fewer than 3 channels
/// and [`TensorError::LayoutMismatch`] for non-HWC input.
pub fn to_grayscale(image: TensorBuffer, weights: GrayWeights) -> Result<TensorBuffer, TensorError> {
    image.ensure_layout(Layout::Hwc)?;
    let Shape {
        batch,
        height,
        width,
        channels,
    } = image.shape();
    if channels < 3 {
        return Err(TensorError::UnsupportedChannels(channels));
    }

    let src = image.as_slice();
    let mut out = TensorBuffer::zeros(Shape::new(batch, height, width, 1), Layout::Hwc);

    out.as_mut_slice()
        .par_chunks_mut(width)
        .enumerate()
        .for_each(|(r, row)| {
            for (x, v) in row.iter_mut().enumerate() {
                let base = (r * width + x) * channels;
                let (red, green, blue) = (src[base], src[base + 1], src[base + 2]);
                *v = match weights {
                    GrayWeights::Average => (red + green + blue) / 3.0,
                    GrayWeights::Luma => 0.299 * red + 0.587 * green + 0.114 * blue,
                };
            }
        });

    Ok(out)
}
