//! Decoding of raw detection output into labelled candidates.
//!
//! The external engine hands back a `(1, N, 6)` block where each row is
//! `[x, y, w, h, confidence, class_index]`. Decoding filters rows by a
//! strict confidence threshold and resolves class indices against the
//! label table. Rows are independent, so the scan runs in parallel; rows
//! that reference an unknown class or carry non-finite fields are skipped
//! and counted, never aborting the frame.

use crate::labels::LabelTable;
use crate::tensor::{Shape, TensorBuffer, TensorError};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::warn;

// ============================================================================
// Detection Types
// ============================================================================

/// Center-format bounding box: `(cx, cy)` is the box center, `w` and `h`
/// the full extents. Corners are at `cx ± w/2`, `cy ± h/2`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub cx: f32,
    pub cy: f32,
    pub w: f32,
    pub h: f32,
}

impl Rect {
    #[must_use]
    pub const fn new(cx: f32, cy: f32, w: f32, h: f32) -> Self {
        Self { cx, cy, w, h }
    }

    /// Corner coordinates `(x1, y1, x2, y2)`.
    #[must_use]
    pub fn corners(&self) -> (f32, f32, f32, f32) {
        (
            self.cx - self.w / 2.0,
            self.cy - self.h / 2.0,
            self.cx + self.w / 2.0,
            self.cy + self.h / 2.0,
        )
    }

    #[must_use]
    pub fn area(&self) -> f32 {
        self.w * self.h
    }
}

/// One surviving detection; lives for a single frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[must_use]
pub struct Detection {
    pub rect: Rect,
    /// Confidence score in `[0, 1]`.
    pub confidence: f32,
    /// Resolved class label.
    pub label: String,
}

/// Decode report: the candidates plus how many rows were dropped because
/// their class index had no label.
#[derive(Debug, Clone, Default)]
#[must_use]
pub struct DecodeOutcome {
    pub detections: Vec<Detection>,
    pub skipped_labels: usize,
}

// ============================================================================
// Decoder
// ============================================================================

/// Per-row verdict from the parallel scan. Logging and counting happen
/// after the join so the hot loop stays write-free.
enum RowVerdict {
    Kept(Detection),
    UnknownClass(f32),
}

/// Number of rows and their stride for a detection-shaped tensor.
///
/// A `(1, N, 6)` block canonicalizes to `(1, 1, N, 6)` under `Hwc` and to
/// `(1, N, 6, 1)` under `Chw`; both leave each 6-float row contiguous in
/// storage, so the decoder accepts either tag.
fn detection_rows(shape: Shape) -> Result<usize, TensorError> {
    if shape.batch != 1 {
        return Err(TensorError::UnsupportedBatch(shape.batch));
    }
    if shape.height == 1 && shape.channels == 6 {
        Ok(shape.width)
    } else if shape.channels == 1 && shape.width == 6 {
        Ok(shape.height)
    } else {
        Err(TensorError::InvalidDetectionShape(shape))
    }
}

/// Decodes a raw `(1, N, 6)` output block into confidence-filtered
/// candidates.
///
/// A row survives iff its confidence is finite and strictly greater than
/// `threshold`. The class index is truncated toward zero and looked up in
/// `labels`; rows with an unmapped or non-finite index are skipped with a
/// warning and counted in [`DecodeOutcome::skipped_labels`].
///
/// # Errors
///
/// Returns [`TensorError::UnsupportedBatch`] for batch != 1 and
/// [`TensorError::InvalidDetectionShape`] when the block is not shaped
/// `(1, N, 6)`.
pub fn decode(
    raw: &TensorBuffer,
    labels: &LabelTable,
    threshold: f32,
) -> Result<DecodeOutcome, TensorError> {
    let rows = detection_rows(raw.shape())?;

    let verdicts: Vec<RowVerdict> = raw
        .as_slice()
        .par_chunks_exact(6)
        .filter_map(|row| {
            let confidence = row[4];
            if !confidence.is_finite() || confidence <= threshold {
                return None;
            }
            let class = row[5];
            if !class.is_finite() || class < 0.0 {
                return Some(RowVerdict::UnknownClass(class));
            }
            let Some(label) = labels.get(class.trunc() as usize) else {
                return Some(RowVerdict::UnknownClass(class));
            };
            if row[..4].iter().any(|v| !v.is_finite()) {
                return None;
            }
            Some(RowVerdict::Kept(Detection {
                rect: Rect::new(row[0], row[1], row[2], row[3]),
                confidence,
                label: label.to_owned(),
            }))
        })
        .collect();

    debug_assert!(verdicts.len() <= rows);

    let mut outcome = DecodeOutcome::default();
    for verdict in verdicts {
        match verdict {
            RowVerdict::Kept(detection) => outcome.detections.push(detection),
            RowVerdict::UnknownClass(class) => {
                warn!(class, "detection row references unknown class, skipped");
                outcome.skipped_labels += 1;
            }
        }
    }
    Ok(outcome)
}

// ============================================================================
// Tests
// ============================================================================
