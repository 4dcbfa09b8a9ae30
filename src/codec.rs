//! Pixel buffer <-> tensor conversion.
//!
//! The exchange type on the pixel side is [`image::RgbaImage`]; on the
//! tensor side everything is a [`TensorBuffer`] with values normalized to
//! `[0, 1]` (u8 channel / 255). Conversion handles both storage layouts,
//! both source row orders, and 1/3/4 channel targets. Compressed inputs go
//! through [`decode_pixels`], which applies size guards before any decode
//! work.

use crate::tensor::{Layout, Shape, TensorBuffer, TensorError};
use image::{ImageFormat, ImageReader, Limits, RgbaImage};
use rayon::prelude::*;
use std::io::Cursor;
use tracing::{debug, instrument};

/// Maximum compressed image size (20MB), checked before any decode work.
const MAX_COMPRESSED_SIZE: usize = 20 * 1024 * 1024;

/// Maximum decoded pixel count (100 megapixels), caps decompression bombs.
const MAX_PIXELS: u64 = 100_000_000;

/// Maximum single image dimension accepted by the decoder.
const MAX_DIMENSION: u32 = 15_000;

/// Allowed compressed formats, explicit allowlist.
const ALLOWED_FORMATS: &[ImageFormat] = &[ImageFormat::Jpeg, ImageFormat::Png];

// ============================================================================
// Conversion Conventions
// ============================================================================

/// Row order of a source pixel buffer.
///
/// Tensor row 0 is always the visual top of the image. `TopLeft` buffers
/// are read as stored; `BottomLeft` buffers (GPU readbacks, typically) are
/// read through `source_row = height - 1 - y`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    TopLeft,
    BottomLeft,
}

/// Guard rails applied before and during compressed-image decode.
#[derive(Debug, Clone)]
pub struct DecodeLimits {
    pub max_input_bytes: usize,
    pub max_pixels: u64,
    pub max_dimension: u32,
}

impl Default for DecodeLimits {
    fn default() -> Self {
        Self {
            max_input_bytes: MAX_COMPRESSED_SIZE,
            max_pixels: MAX_PIXELS,
            max_dimension: MAX_DIMENSION,
        }
    }
}

#[inline]
fn source_row(y: usize, height: usize, origin: Origin) -> usize {
    match origin {
        Origin::TopLeft => y,
        Origin::BottomLeft => height - 1 - y,
    }
}

/// Normalized value of one target channel of an RGBA pixel.
///
/// A single-channel target is the plain average of R, G and B.
#[inline]
fn sample_channel(rgba: &[u8], c: usize, channels: usize) -> f32 {
    if channels == 1 {
        (f32::from(rgba[0]) + f32::from(rgba[1]) + f32::from(rgba[2])) / 3.0 / 255.0
    } else {
        f32::from(rgba[c]) / 255.0
    }
}

#[inline]
fn quantize(v: f32) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}

// ============================================================================
// Pixels -> Tensor
// ============================================================================

/// Converts a pixel buffer into a batch-1 tensor of the given layout.
///
/// `channels` selects the target depth: 1 (grayscale average), 3 (RGB) or
/// 4 (RGBA). Values are normalized to `[0, 1]`. Rows are filled in
/// parallel.
///
/// # Errors
///
/// Returns [`TensorError::EmptyInput`] for a zero-sized image and
/// [`TensorError::UnsupportedChannels`] for any other channel count.
pub fn to_tensor(
    pixels: &RgbaImage,
    layout: Layout,
    origin: Origin,
    channels: usize,
) -> Result<TensorBuffer, TensorError> {
    let width = pixels.width() as usize;
    let height = pixels.height() as usize;
    if width == 0 || height == 0 {
        return Err(TensorError::EmptyInput);
    }
    if !matches!(channels, 1 | 3 | 4) {
        return Err(TensorError::UnsupportedChannels(channels));
    }

    let raw = pixels.as_raw();
    let mut out = TensorBuffer::zeros(Shape::new(1, height, width, channels), layout);

    match layout {
        Layout::Hwc => {
            out.as_mut_slice()
                .par_chunks_mut(width * channels)
                .enumerate()
                .for_each(|(y, row)| {
                    let sy = source_row(y, height, origin);
                    for x in 0..width {
                        let p = (sy * width + x) * 4;
                        let rgba = &raw[p..p + 4];
                        for c in 0..channels {
                            row[x * channels + c] = sample_channel(rgba, c, channels);
                        }
                    }
                });
        }
        Layout::Chw => {
            out.as_mut_slice()
                .par_chunks_mut(height * width)
                .enumerate()
                .for_each(|(c, plane)| {
                    for y in 0..height {
                        let sy = source_row(y, height, origin);
                        for x in 0..width {
                            let p = (sy * width + x) * 4;
                            plane[y * width + x] = sample_channel(&raw[p..p + 4], c, channels);
                        }
                    }
                });
        }
    }

    Ok(out)
}

// ============================================================================
// Tensor -> Pixels
// ============================================================================

/// Converts a batch-1 tensor back into an RGBA pixel buffer.
///
/// Values are clamped to `[0, 1]` and quantized to u8. A single-channel
/// tensor is replicated across R, G and B; alpha is opaque unless the
/// tensor carries 4 channels. Output rows are in top-left order.
///
/// # Errors
///
/// Returns [`TensorError::UnsupportedBatch`] for batch != 1 and
/// [`TensorError::UnsupportedChannels`] for channel counts other than
/// 1, 3 or 4.
pub fn to_pixels(tensor: &TensorBuffer) -> Result<RgbaImage, TensorError> {
    let Shape {
        batch,
        height,
        width,
        channels,
    } = tensor.shape();
    if batch != 1 {
        return Err(TensorError::UnsupportedBatch(batch));
    }
    if !matches!(channels, 1 | 3 | 4) {
        return Err(TensorError::UnsupportedChannels(channels));
    }

    let mut raw = vec![0u8; width * height * 4];
    raw.par_chunks_mut(width * 4).enumerate().for_each(|(y, row)| {
        for x in 0..width {
            let px = &mut row[x * 4..x * 4 + 4];
            match channels {
                1 => {
                    let g = quantize(tensor.get(0, y, x, 0));
                    px[0] = g;
                    px[1] = g;
                    px[2] = g;
                    px[3] = u8::MAX;
                }
                3 => {
                    px[0] = quantize(tensor.get(0, y, x, 0));
                    px[1] = quantize(tensor.get(0, y, x, 1));
                    px[2] = quantize(tensor.get(0, y, x, 2));
                    px[3] = u8::MAX;
                }
                _ => {
                    for c in 0..4 {
                        px[c] = quantize(tensor.get(0, y, x, c));
                    }
                }
            }
        }
    });

    let len = raw.len();
    RgbaImage::from_raw(width as u32, height as u32, raw).ok_or(TensorError::LengthMismatch {
        len,
        shape: tensor.shape(),
        expected: width * height * 4,
    })
}

// ============================================================================
// Compressed Decode
// ============================================================================

/// Decodes a compressed image (PNG or JPEG) into an RGBA pixel buffer.
///
/// Guards run in order: input size, format allowlist, pre-decode dimension
/// probe, then the actual decode under [`image::Limits`].
///
/// # Errors
///
/// Returns the matching guard variant of [`TensorError`], or
/// [`TensorError::Decode`] when the underlying decoder fails.
#[instrument(skip(data, limits), fields(data_len = data.len()))]
pub fn decode_pixels(data: &[u8], limits: &DecodeLimits) -> Result<RgbaImage, TensorError> {
    if data.is_empty() {
        return Err(TensorError::EmptyInput);
    }
    if data.len() > limits.max_input_bytes {
        return Err(TensorError::InputTooLarge {
            size: data.len(),
            max: limits.max_input_bytes,
        });
    }

    let format = image::guess_format(data).map_err(TensorError::Decode)?;
    if !ALLOWED_FORMATS.contains(&format) {
        return Err(TensorError::UnsupportedImageFormat(format!("{format:?}")));
    }

    // Dimension probe before committing to a full decode.
    let reader = ImageReader::new(Cursor::new(data))
        .with_guessed_format()
        .map_err(|e| TensorError::Decode(e.into()))?;
    let (width, height) = reader.into_dimensions().map_err(TensorError::Decode)?;

    if width == 0 || height == 0 {
        return Err(TensorError::EmptyInput);
    }
    let pixel_count = u64::from(width).saturating_mul(u64::from(height));
    if pixel_count > limits.max_pixels {
        return Err(TensorError::PixelCountTooLarge {
            width,
            height,
            max_pixels: limits.max_pixels,
        });
    }

    let mut reader = ImageReader::new(Cursor::new(data))
        .with_guessed_format()
        .map_err(|e| TensorError::Decode(e.into()))?;
    let mut decode_limits = Limits::default();
    decode_limits.max_image_width = Some(limits.max_dimension);
    decode_limits.max_image_height = Some(limits.max_dimension);
    reader.limits(decode_limits);

    let decoded = reader.decode().map_err(TensorError::Decode)?;
    debug!(width, height, format = ?format, "image decoded");
    Ok(decoded.to_rgba8())
}

// ============================================================================
// Tests
// ============================================================================
