//! Scalar helpers for classification heads.

/// Index of the first maximal element; `None` on an empty slice.
#[must_use]
pub fn argmax(scores: &[f32]) -> Option<usize> {
    if scores.is_empty() {
        return None;
    }
    let mut best = 0;
    for (i, &v) in scores.iter().enumerate().skip(1) {
        if v > scores[best] {
            best = i;
        }
    }
    Some(best)
}

/// Numerically stable softmax: shifts by the max before exponentiating.
#[must_use]
pub fn softmax(scores: &[f32]) -> Vec<f32> {
    let Some(&max) = scores.iter().max_by(|a, b| a.total_cmp(b)) else {
        return Vec::new();
    };
    let exps: Vec<f32> = scores.iter().map(|&v| (v - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

/// Logistic sigmoid.
#[must_use]
pub fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}
