//! Greedy non-maximum suppression.
//!
//! Candidates are sorted by confidence descending with a stable sort, so
//! ties keep their insertion order and the output is reproducible run to
//! run. The sweep then takes the highest remaining candidate, emits it and
//! suppresses every remaining candidate whose IoU with it exceeds the
//! threshold.

use crate::decode::{Detection, Rect};

/// Intersection-over-union of two center-format rectangles.
///
/// Returns 0 when the rectangles do not overlap or the union is empty.
#[must_use]
pub fn iou(a: &Rect, b: &Rect) -> f32 {
    let (ax1, ay1, ax2, ay2) = a.corners();
    let (bx1, by1, bx2, by2) = b.corners();

    let ix = (ax2.min(bx2) - ax1.max(bx1)).max(0.0);
    let iy = (ay2.min(by2) - ay1.max(by1)).max(0.0);
    let intersection = ix * iy;

    let union = a.area() + b.area() - intersection;
    if union <= 0.0 {
        return 0.0;
    }
    intersection / union
}

/// Greedy IoU suppression over a candidate list.
///
/// Deterministic: the pre-pass sort is stable, so equal confidences keep
/// their original order and the survivor set never depends on memory
/// layout or thread scheduling.
#[must_use]
pub fn non_max_suppression(mut candidates: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    if candidates.is_empty() {
        return candidates;
    }

    // Stable sort keeps tie order; sort_unstable would not.
    candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let n = candidates.len();
    let mut suppressed = vec![false; n];
    let mut kept = Vec::with_capacity(n);

    for i in 0..n {
        if suppressed[i] {
            continue;
        }
        for j in (i + 1)..n {
            if !suppressed[j] && iou(&candidates[i].rect, &candidates[j].rect) > iou_threshold {
                suppressed[j] = true;
            }
        }
        kept.push(i);
    }

    let mut kept_iter = kept.into_iter().peekable();
    candidates
        .into_iter()
        .enumerate()
        .filter_map(|(i, d)| {
            if kept_iter.peek() == Some(&i) {
                kept_iter.next();
                Some(d)
            } else {
                None
            }
        })
        .collect()
}

// ============================================================================
// Tests
// ============================================================================
