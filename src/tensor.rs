//! Dense `f32` tensor storage with an explicit memory layout.
//!
//! Every buffer crossing the frame pipeline is a [`TensorBuffer`]: a flat
//! `Vec<f32>` plus a canonical logical shape `(batch, height, width,
//! channels)` and a [`Layout`] tag naming the storage order. The logical
//! shape never changes meaning when the layout does; only the flat index
//! formula differs. All operations in this crate read and write through
//! that formula, so a buffer handed to an external inference engine is
//! byte-compatible with whatever order the engine expects.

use ndarray::ArrayView4;
use rand::Rng;
use std::fmt;

// ============================================================================
// Error Types
// ============================================================================

/// Errors shared by the tensor, codec, geometry, color and render modules.
#[derive(thiserror::Error, Debug)]
pub enum TensorError {
    #[error("empty input")]
    EmptyInput,

    #[error("unsupported tensor rank: {0} (expected 1 to 4 dimensions)")]
    UnsupportedRank(usize),

    #[error("zero-sized dimension in {0:?}")]
    ZeroDim(Vec<usize>),

    #[error("storage length {len} does not match shape {shape} ({expected} elements)")]
    LengthMismatch {
        len: usize,
        shape: Shape,
        expected: usize,
    },

    #[error("unsupported channel count: {0} (expected 1, 3 or 4)")]
    UnsupportedChannels(usize),

    #[error("unsupported batch size: {0} (expected 1)")]
    UnsupportedBatch(usize),

    #[error("expected {expected:?} layout, got {got:?}")]
    LayoutMismatch { expected: Layout, got: Layout },

    #[error("invalid target dimensions: {width}x{height}")]
    InvalidDimensions { width: usize, height: usize },

    #[error("invalid rescale factor: {0}")]
    InvalidScale(f32),

    #[error("detection output must be shaped (1, N, 6), got {0}")]
    InvalidDetectionShape(Shape),

    #[error("compressed image too large: {size} bytes (max: {max})")]
    InputTooLarge { size: usize, max: usize },

    #[error("decoded image too large: {width}x{height} pixels (max: {max_pixels})")]
    PixelCountTooLarge {
        width: u32,
        height: u32,
        max_pixels: u64,
    },

    #[error("unsupported image format: {0}")]
    UnsupportedImageFormat(String),

    #[error("image decode failed")]
    Decode(#[source] image::ImageError),
}

// ============================================================================
// Layout & Shape
// ============================================================================

/// Storage order of a [`TensorBuffer`].
///
/// `Hwc` stores interleaved pixels (`[r g b, r g b, ..]` row by row), the
/// natural order of decoded images. `Chw` stores planar channels
/// (`[all r, all g, all b]`), the order most detection models consume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Layout {
    Hwc,
    Chw,
}

/// Canonical logical shape `(batch, height, width, channels)`.
///
/// The shape is layout-independent: a `(1, 480, 640, 3)` tensor stays
/// `(1, 480, 640, 3)` whether its storage is interleaved or planar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Shape {
    pub batch: usize,
    pub height: usize,
    pub width: usize,
    pub channels: usize,
}

impl Shape {
    #[must_use]
    pub const fn new(batch: usize, height: usize, width: usize, channels: usize) -> Self {
        Self {
            batch,
            height,
            width,
            channels,
        }
    }

    /// Canonicalizes raw dimensions to a full 4-axis shape.
    ///
    /// Missing leading axes default to 1, so for `Hwc` the rules are:
    ///
    /// | rank | shape               |
    /// |------|---------------------|
    /// | 4    | `(d0, d1, d2, d3)`  |
    /// | 3    | `(1, d0, d1, d2)`   |
    /// | 2    | `(1, 1, d0, d1)`    |
    /// | 1    | `(1, 1, 1, d0)`     |
    ///
    /// For `Chw` the padded axes are read in `(batch, channels, height,
    /// width)` storage order instead, mirroring the same trailing-axis rule.
    ///
    /// # Errors
    ///
    /// Returns [`TensorError::UnsupportedRank`] for rank 0 or rank > 4 and
    /// [`TensorError::ZeroDim`] when any dimension is zero.
    pub fn from_dims(dims: &[usize], layout: Layout) -> Result<Self, TensorError> {
        if dims.is_empty() || dims.len() > 4 {
            return Err(TensorError::UnsupportedRank(dims.len()));
        }
        if dims.contains(&0) {
            return Err(TensorError::ZeroDim(dims.to_vec()));
        }

        let mut full = [1usize; 4];
        full[4 - dims.len()..].copy_from_slice(dims);

        Ok(match layout {
            Layout::Hwc => Self::new(full[0], full[1], full[2], full[3]),
            Layout::Chw => Self::new(full[0], full[2], full[3], full[1]),
        })
    }

    /// Total element count.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.batch * self.height * self.width * self.channels
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Dimensions in storage order: `(B,H,W,C)` for `Hwc`, `(B,C,H,W)` for
    /// `Chw`.
    #[must_use]
    pub const fn storage_dims(&self, layout: Layout) -> [usize; 4] {
        match layout {
            Layout::Hwc => [self.batch, self.height, self.width, self.channels],
            Layout::Chw => [self.batch, self.channels, self.height, self.width],
        }
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({}, {}, {}, {})",
            self.batch, self.height, self.width, self.channels
        )
    }
}

// ============================================================================
// TensorBuffer
// ============================================================================

/// Dense `f32` tensor with a canonical shape and an explicit [`Layout`].
///
/// The storage length always equals `shape.len()`; constructors enforce
/// this, accessors rely on it. Transform operations consume their input
/// and return a fresh buffer, so exactly one buffer is live per pipeline
/// stage.
#[derive(Debug, Clone, PartialEq)]
pub struct TensorBuffer {
    shape: Shape,
    layout: Layout,
    data: Vec<f32>,
}

impl TensorBuffer {
    /// Zero-filled tensor.
    #[must_use]
    pub fn zeros(shape: Shape, layout: Layout) -> Self {
        Self {
            shape,
            layout,
            data: vec![0.0; shape.len()],
        }
    }

    /// Tensor filled with uniform random values in `[0, 1)`.
    #[must_use]
    pub fn random01(shape: Shape, layout: Layout) -> Self {
        let mut rng = rand::thread_rng();
        let data = (0..shape.len()).map(|_| rng.gen::<f32>()).collect();
        Self {
            shape,
            layout,
            data,
        }
    }

    /// Builds a tensor from raw dimensions and flat data in storage order.
    ///
    /// Dimensions are canonicalized via [`Shape::from_dims`], so a
    /// `(N, 6)` detection table or a bare channel vector are both
    /// accepted.
    ///
    /// # Errors
    ///
    /// Returns [`TensorError::LengthMismatch`] when `data.len()` differs
    /// from the shape's element count, plus any [`Shape::from_dims`] error.
    pub fn from_vec(dims: &[usize], layout: Layout, data: Vec<f32>) -> Result<Self, TensorError> {
        let shape = Shape::from_dims(dims, layout)?;
        if data.len() != shape.len() {
            return Err(TensorError::LengthMismatch {
                len: data.len(),
                shape,
                expected: shape.len(),
            });
        }
        Ok(Self {
            shape,
            layout,
            data,
        })
    }

    #[must_use]
    pub const fn shape(&self) -> Shape {
        self.shape
    }

    #[must_use]
    pub const fn layout(&self) -> Layout {
        self.layout
    }

    /// Checks the storage layout against what an operation requires.
    ///
    /// # Errors
    ///
    /// Returns [`TensorError::LayoutMismatch`] when the layouts differ.
    pub fn ensure_layout(&self, expected: Layout) -> Result<(), TensorError> {
        if self.layout != expected {
            return Err(TensorError::LayoutMismatch {
                expected,
                got: self.layout,
            });
        }
        Ok(())
    }

    /// Element count (equals `shape().len()`).
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[must_use]
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [f32] {
        &mut self.data
    }

    #[must_use]
    pub fn into_vec(self) -> Vec<f32> {
        self.data
    }

    /// Flat storage index of logical coordinates `(b, h, w, c)`.
    ///
    /// `Hwc`: `((b*H + h)*W + w)*C + c`. `Chw`: `((b*C + c)*H + h)*W + w`.
    #[inline]
    fn index(&self, b: usize, h: usize, w: usize, c: usize) -> usize {
        let Shape {
            height,
            width,
            channels,
            ..
        } = self.shape;
        match self.layout {
            Layout::Hwc => ((b * height + h) * width + w) * channels + c,
            Layout::Chw => ((b * channels + c) * height + h) * width + w,
        }
    }

    #[inline]
    fn check_bounds(&self, b: usize, h: usize, w: usize, c: usize) {
        assert!(
            b < self.shape.batch
                && h < self.shape.height
                && w < self.shape.width
                && c < self.shape.channels,
            "coordinates ({b}, {h}, {w}, {c}) out of bounds for shape {}",
            self.shape
        );
    }

    /// Reads the element at logical coordinates `(b, h, w, c)`.
    ///
    /// # Panics
    ///
    /// Panics when any coordinate is out of bounds.
    #[inline]
    #[must_use]
    pub fn get(&self, b: usize, h: usize, w: usize, c: usize) -> f32 {
        self.check_bounds(b, h, w, c);
        self.data[self.index(b, h, w, c)]
    }

    /// Writes the element at logical coordinates `(b, h, w, c)`.
    ///
    /// # Panics
    ///
    /// Panics when any coordinate is out of bounds.
    #[inline]
    pub fn set(&mut self, b: usize, h: usize, w: usize, c: usize, value: f32) {
        self.check_bounds(b, h, w, c);
        let idx = self.index(b, h, w, c);
        self.data[idx] = value;
    }

    /// Borrows the storage as a 4-axis `ndarray` view in storage order
    /// (`(B,H,W,C)` for `Hwc`, `(B,C,H,W)` for `Chw`), the form an external
    /// inference engine consumes.
    ///
    /// # Errors
    ///
    /// Returns [`TensorError::LengthMismatch`] if the storage length does
    /// not match the shape (unreachable for buffers built through this
    /// crate's constructors).
    pub fn as_array4(&self) -> Result<ArrayView4<'_, f32>, TensorError> {
        let [d0, d1, d2, d3] = self.shape.storage_dims(self.layout);
        ArrayView4::from_shape((d0, d1, d2, d3), &self.data).map_err(|_| {
            TensorError::LengthMismatch {
                len: self.data.len(),
                shape: self.shape,
                expected: self.shape.len(),
            }
        })
    }

    /// Ingests an engine-produced 4-axis array whose axes are in the given
    /// layout's storage order.
    ///
    /// # Errors
    ///
    /// Returns [`TensorError::ZeroDim`] when any axis is zero.
    pub fn from_array4(array: ArrayView4<'_, f32>, layout: Layout) -> Result<Self, TensorError> {
        let (d0, d1, d2, d3) = array.dim();
        if d0 == 0 || d1 == 0 || d2 == 0 || d3 == 0 {
            return Err(TensorError::ZeroDim(vec![d0, d1, d2, d3]));
        }
        let shape = match layout {
            Layout::Hwc => Shape::new(d0, d1, d2, d3),
            Layout::Chw => Shape::new(d0, d2, d3, d1),
        };
        // Iteration follows the view's logical row-major order, which is the
        // storage order we want even for non-contiguous views.
        let data: Vec<f32> = array.iter().copied().collect();
        Ok(Self {
            shape,
            layout,
            data,
        })
    }
}

impl fmt::Display for TensorBuffer {
    /// Full nested print in logical `(b, h, w, c)` order; intended for
    /// debugging small tensors.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TensorBuffer{} {:?} [", self.shape, self.layout)?;
        for b in 0..self.shape.batch {
            if b > 0 {
                write!(f, ", ")?;
            }
            write!(f, "[")?;
            for h in 0..self.shape.height {
                if h > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "[")?;
                for w in 0..self.shape.width {
                    if w > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "[")?;
                    for c in 0..self.shape.channels {
                        if c > 0 {
                            write!(f, ", ")?;
                        }
                        write!(f, "{}", self.get(b, h, w, c))?;
                    }
                    write!(f, "]")?;
                }
                write!(f, "]")?;
            }
            write!(f, "]")?;
        }
        write!(f, "]")
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_shape_canonicalization_hwc() {
        let s = Shape::from_dims(&[2, 3, 4, 5], Layout::Hwc).unwrap();
        assert_eq!(s, Shape::new(2, 3, 4, 5));

        let s = Shape::from_dims(&[3, 4, 5], Layout::Hwc).unwrap();
        assert_eq!(s, Shape::new(1, 3, 4, 5));

        let s = Shape::from_dims(&[300, 6], Layout::Hwc).unwrap();
        assert_eq!(s, Shape::new(1, 1, 300, 6));

        let s = Shape::from_dims(&[7], Layout::Hwc).unwrap();
        assert_eq!(s, Shape::new(1, 1, 1, 7));
    }

    #[test]
    fn test_shape_canonicalization_chw() {
        let s = Shape::from_dims(&[1, 3, 480, 640], Layout::Chw).unwrap();
        assert_eq!(s, Shape::new(1, 480, 640, 3));

        let s = Shape::from_dims(&[3, 480, 640], Layout::Chw).unwrap();
        assert_eq!(s, Shape::new(1, 480, 640, 3));

        let s = Shape::from_dims(&[480, 640], Layout::Chw).unwrap();
        assert_eq!(s, Shape::new(1, 480, 640, 1));
    }

    #[test]
    fn test_shape_rejects_bad_rank() {
        assert!(matches!(
            Shape::from_dims(&[], Layout::Hwc),
            Err(TensorError::UnsupportedRank(0))
        ));
        assert!(matches!(
            Shape::from_dims(&[1, 2, 3, 4, 5], Layout::Hwc),
            Err(TensorError::UnsupportedRank(5))
        ));
    }

    #[test]
    fn test_shape_rejects_zero_dim() {
        assert!(matches!(
            Shape::from_dims(&[1, 0, 4], Layout::Hwc),
            Err(TensorError::ZeroDim(_))
        ));
    }

    #[test]
    fn test_from_vec_length_mismatch() {
        let result = TensorBuffer::from_vec(&[2, 2], Layout::Hwc, vec![1.0, 2.0, 3.0]);
        assert!(matches!(result, Err(TensorError::LengthMismatch { .. })));
    }

    #[test]
    fn test_hwc_flat_index() {
        // (1, 2, 2, 3): index of (0, 1, 0, 2) is ((0*2+1)*2+0)*3+2 = 8
        let mut t = TensorBuffer::zeros(Shape::new(1, 2, 2, 3), Layout::Hwc);
        t.set(0, 1, 0, 2, 7.5);
        assert_eq!(t.as_slice()[8], 7.5);
        assert_eq!(t.get(0, 1, 0, 2), 7.5);
    }

    #[test]
    fn test_chw_flat_index() {
        // (1, 2, 2, 3) planar: index of (0, 1, 0, 2) is ((0*3+2)*2+1)*2+0 = 10
        let mut t = TensorBuffer::zeros(Shape::new(1, 2, 2, 3), Layout::Chw);
        t.set(0, 1, 0, 2, 7.5);
        assert_eq!(t.as_slice()[10], 7.5);
        assert_eq!(t.get(0, 1, 0, 2), 7.5);
    }

    #[test]
    fn test_layout_changes_storage_not_shape() {
        let hwc = TensorBuffer::zeros(Shape::new(1, 4, 6, 3), Layout::Hwc);
        let chw = TensorBuffer::zeros(Shape::new(1, 4, 6, 3), Layout::Chw);
        assert_eq!(hwc.shape(), chw.shape());
        assert_ne!(hwc, chw);
        assert_eq!(hwc.shape().storage_dims(Layout::Hwc), [1, 4, 6, 3]);
        assert_eq!(chw.shape().storage_dims(Layout::Chw), [1, 3, 4, 6]);
    }

    #[test]
    fn test_random01_in_range() {
        let t = TensorBuffer::random01(Shape::new(1, 8, 8, 3), Layout::Hwc);
        assert!(t.as_slice().iter().all(|&v| (0.0..1.0).contains(&v)));
    }

    #[test]
    fn test_ndarray_roundtrip_hwc() {
        let data: Vec<f32> = (0..24).map(|i| i as f32).collect();
        let t = TensorBuffer::from_vec(&[1, 2, 3, 4], Layout::Hwc, data).unwrap();
        let view = t.as_array4().unwrap();
        assert_eq!(view.dim(), (1, 2, 3, 4));
        assert_eq!(view[[0, 1, 2, 3]], t.get(0, 1, 2, 3));

        let back = TensorBuffer::from_array4(view, Layout::Hwc).unwrap();
        assert_eq!(back, t);
    }

    #[test]
    fn test_ndarray_roundtrip_chw() {
        let data: Vec<f32> = (0..24).map(|i| i as f32).collect();
        let t = TensorBuffer::from_vec(&[1, 4, 2, 3], Layout::Chw, data).unwrap();
        assert_eq!(t.shape(), Shape::new(1, 2, 3, 4));

        let view = t.as_array4().unwrap();
        // Storage order for planar tensors is (B, C, H, W).
        assert_eq!(view.dim(), (1, 4, 2, 3));
        assert_eq!(view[[0, 3, 1, 2]], t.get(0, 1, 2, 3));

        let back = TensorBuffer::from_array4(view, Layout::Chw).unwrap();
        assert_eq!(back, t);
    }

    #[test]
    fn test_display_small_tensor() {
        let t = TensorBuffer::from_vec(&[2, 2], Layout::Hwc, vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let s = t.to_string();
        assert!(s.starts_with("TensorBuffer(1, 1, 2, 2)"));
        assert!(s.contains("[[1, 2], [3, 4]]"));
    }

    #[test]
    #[should_panic(expected = "out of bounds")]
    fn test_get_out_of_bounds_panics() {
        let t = TensorBuffer::zeros(Shape::new(1, 2, 2, 3), Layout::Hwc);
        let _ = t.get(0, 0, 2, 0);
    }

    proptest! {
        #[test]
        fn storage_len_matches_shape(
            b in 1usize..3,
            h in 1usize..8,
            w in 1usize..8,
            c in 1usize..5,
        ) {
            let shape = Shape::new(b, h, w, c);
            let t = TensorBuffer::zeros(shape, Layout::Hwc);
            prop_assert_eq!(t.len(), b * h * w * c);
            prop_assert_eq!(t.len(), shape.len());
        }

        #[test]
        fn get_set_roundtrip_both_layouts(
            h in 1usize..6,
            w in 1usize..6,
            c in 1usize..4,
            value in -100.0f32..100.0,
        ) {
            for layout in [Layout::Hwc, Layout::Chw] {
                let mut t = TensorBuffer::zeros(Shape::new(1, h, w, c), layout);
                t.set(0, h - 1, w - 1, c - 1, value);
                prop_assert_eq!(t.get(0, h - 1, w - 1, c - 1), value);
            }
        }
    }
}
