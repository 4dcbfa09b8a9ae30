//! framesight - frame-to-detection tensor core.
//!
//! Converts live video frames into model-shaped `f32` tensors and raw
//! detector output back into deduplicated, rendered detections. Inference
//! itself is an external collaborator: this crate only produces and
//! consumes plain numeric buffers (via `ndarray` views at the boundary).
//!
//! Per-frame flow: pixel buffer -> [`codec`] -> [`TensorBuffer`] ->
//! [`geometry`] (crop/resize/permute) -> [`color`] (normalize) ->
//! external inference -> [`decode`] -> [`nms`] -> [`render`] (writes into
//! the pre-inference tensor) -> [`codec`] -> external display.
//! [`pipeline::FramePipeline`] drives the whole sequence.

#![forbid(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]

pub mod codec;
pub mod color;
pub mod decode;
pub mod geometry;
pub mod labels;
pub mod math;
pub mod nms;
pub mod pipeline;
pub mod render;
pub mod tensor;

pub use codec::{DecodeLimits, Origin};
pub use decode::{DecodeOutcome, Detection, Rect};
pub use labels::{ClassColorMap, ColorMode, LabelError, LabelTable, Rgb};
pub use pipeline::{Classification, FramePipeline, FrameReport, PipelineConfig, PipelineError};
pub use tensor::{Layout, Shape, TensorBuffer, TensorError};
