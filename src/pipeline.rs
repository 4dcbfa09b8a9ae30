//! Per-frame orchestration around the external inference engine.
//!
//! [`FramePipeline`] wires the stages together: pixels in, an engine-ready
//! CHW tensor out of [`FramePipeline::preprocess`]; the engine's raw
//! `(1, N, 6)` block back in, a deduplicated detection list and an
//! annotated tensor out of [`FramePipeline::postprocess`]. One frame is
//! processed fully before the next; the only cross-frame state is the
//! label table and color map the caller holds, both read-only here.

use crate::codec::{self, Origin};
use crate::decode::{self, Detection};
use crate::geometry;
use crate::labels::{ClassColorMap, LabelTable};
use crate::math;
use crate::nms;
use crate::render;
use crate::tensor::{Layout, TensorBuffer, TensorError};
use image::RgbaImage;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

// ============================================================================
// Errors & Configuration
// ============================================================================

#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("threshold {name} out of range: {value} (expected 0.0..=1.0)")]
    ThresholdOutOfRange { name: &'static str, value: f32 },

    #[error("invalid model input size: {width}x{height}")]
    InvalidInputSize { width: usize, height: usize },

    #[error("invalid thickness scale: {0}")]
    InvalidThicknessScale(f32),

    #[error(transparent)]
    Tensor(#[from] TensorError),
}

/// Frame pipeline configuration, validated at construction.
#[derive(Debug, Clone, Copy)]
pub struct PipelineConfig {
    /// Model input width in pixels.
    pub input_width: usize,
    /// Model input height in pixels.
    pub input_height: usize,
    /// Minimum confidence for a decoded row to become a candidate
    /// (strict: a row equal to the threshold is dropped).
    pub confidence_threshold: f32,
    /// IoU above which a lower-confidence candidate is suppressed.
    pub iou_threshold: f32,
    /// Outline thickness multiplier for rendering.
    pub thickness_scale: f32,
    /// Vertical-origin convention of incoming pixel buffers.
    pub origin: Origin,
    /// Center-crop to a square before the letterbox resize.
    pub center_crop: bool,
}

impl Default for PipelineConfig {
    /// Reference constants: 640x640 input, 0.5 confidence, 0.45 IoU,
    /// thickness scale 10, top-left origin, crop enabled.
    fn default() -> Self {
        Self {
            input_width: 640,
            input_height: 640,
            confidence_threshold: 0.5,
            iou_threshold: 0.45,
            thickness_scale: render::DEFAULT_THICKNESS_SCALE,
            origin: Origin::TopLeft,
            center_crop: true,
        }
    }
}

impl PipelineConfig {
    fn validate(&self) -> Result<(), PipelineError> {
        if self.input_width == 0 || self.input_height == 0 {
            return Err(PipelineError::InvalidInputSize {
                width: self.input_width,
                height: self.input_height,
            });
        }
        validate_threshold("confidence", self.confidence_threshold)?;
        validate_threshold("iou", self.iou_threshold)?;
        if !self.thickness_scale.is_finite() || self.thickness_scale <= 0.0 {
            return Err(PipelineError::InvalidThicknessScale(self.thickness_scale));
        }
        Ok(())
    }
}

fn validate_threshold(name: &'static str, value: f32) -> Result<(), PipelineError> {
    if value.is_nan() || !(0.0..=1.0).contains(&value) {
        return Err(PipelineError::ThresholdOutOfRange { name, value });
    }
    Ok(())
}

// ============================================================================
// Frame Report
// ============================================================================

/// Summary of one frame's postprocessing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[must_use]
pub struct FrameReport {
    /// Detections surviving suppression, confidence descending.
    pub detections: Vec<Detection>,
    /// Candidate count before NMS.
    pub candidates_before_nms: usize,
    /// Rows dropped during decode because their class had no label.
    pub skipped_labels: usize,
}

/// Classification head result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[must_use]
pub struct Classification {
    pub class_index: usize,
    pub label: String,
    /// Softmax probability of the winning class.
    pub confidence: f32,
}

// ============================================================================
// FramePipeline
// ============================================================================

/// Stateless per-frame driver; all state lives in the config.
#[derive(Debug, Clone)]
pub struct FramePipeline {
    config: PipelineConfig,
}

impl FramePipeline {
    /// # Errors
    ///
    /// Returns a [`PipelineError`] when a config field is out of range.
    pub fn new(config: PipelineConfig) -> Result<Self, PipelineError> {
        config.validate()?;
        Ok(Self { config })
    }

    #[must_use]
    pub const fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Builds the engine-ready input tensor from a pixel buffer:
    /// RGB tensor, optional center-crop, letterbox resize to the model
    /// size, then the HWC -> CHW permutation.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Tensor`] for an empty pixel buffer or any
    /// failed geometry stage.
    #[instrument(skip(self, pixels), fields(w = pixels.width(), h = pixels.height()))]
    pub fn preprocess(&self, pixels: &RgbaImage) -> Result<TensorBuffer, PipelineError> {
        let mut tensor = codec::to_tensor(pixels, Layout::Hwc, self.config.origin, 3)?;
        if self.config.center_crop {
            tensor = geometry::center_crop(tensor)?;
        }
        let tensor = geometry::resize(tensor, self.config.input_width, self.config.input_height)?;
        Ok(geometry::hwc_to_chw(tensor)?)
    }

    /// Turns the engine's raw output into the final detection list and
    /// draws the survivors into the engine input tensor.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Tensor`] for a malformed output block or a
    /// non-CHW engine input tensor.
    #[instrument(skip_all)]
    pub fn postprocess(
        &self,
        engine_input: &mut TensorBuffer,
        raw_output: &TensorBuffer,
        labels: &LabelTable,
        colors: &ClassColorMap,
    ) -> Result<FrameReport, PipelineError> {
        let outcome = decode::decode(raw_output, labels, self.config.confidence_threshold)?;
        let candidates_before_nms = outcome.detections.len();

        let detections = nms::non_max_suppression(outcome.detections, self.config.iou_threshold);
        render::draw_detections(
            engine_input,
            &detections,
            colors,
            self.config.thickness_scale,
        )?;

        debug!(
            detections = detections.len(),
            candidates_before_nms,
            skipped_labels = outcome.skipped_labels,
            "frame postprocessing completed"
        );

        Ok(FrameReport {
            detections,
            candidates_before_nms,
            skipped_labels: outcome.skipped_labels,
        })
    }

    /// Converts an annotated CHW tensor back to pixels for display.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Tensor`] for non-CHW input or batch != 1.
    pub fn annotated_pixels(&self, tensor: TensorBuffer) -> Result<RgbaImage, PipelineError> {
        let hwc = geometry::chw_to_hwc(tensor)?;
        Ok(codec::to_pixels(&hwc)?)
    }

    /// Classification-head postprocessing: softmax over the raw scores,
    /// argmax, label lookup. `None` when the scores are empty or the
    /// winning index has no label.
    #[must_use]
    pub fn classify(&self, scores: &[f32], labels: &LabelTable) -> Option<Classification> {
        let probabilities = math::softmax(scores);
        let class_index = math::argmax(&probabilities)?;
        let label = labels.get(class_index)?;
        Some(Classification {
            class_index,
            label: label.to_owned(),
            confidence: probabilities[class_index],
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
