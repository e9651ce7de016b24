//! Pure post-processing helpers shared by the skills.
//!
//! Nothing here touches a device, a binding or a frame; every function is
//! deterministic in its arguments.

use std::cmp::Ordering;
use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::types::{BoundingBox, ConceptTagScore, NormalizedRect};

/// Nominal scale applied to detected face boxes before classification.
pub const FACE_BOX_SCALE: f32 = 1.5;

/// Normalise raw scores into probabilities.
///
/// Uses the unshifted form `exp(x_i) / sum(exp(x_j))` with each term and
/// the sum held in `f32`. Terms below the `f32` range flush to zero; when
/// every term does and the sum is exactly zero the divisor becomes 1, so the
/// result is all zeros rather than NaN. When the sum overflows the
/// max-shifted form is used instead, which is mathematically identical.
///
/// An all-zero input is not a zero sum: `exp(0) = 1`, so it yields the
/// uniform distribution.
pub fn softmax(scores: &[f32]) -> Vec<f32> {
    let exps: Vec<f32> = scores.iter().map(|&s| s.exp()).collect();
    let sum: f32 = exps.iter().sum();

    if sum.is_infinite() {
        let max = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let shifted: Vec<f32> = scores.iter().map(|&s| (s - max).exp()).collect();
        let sum: f32 = shifted.iter().sum();
        return shifted.iter().map(|e| e / sum).collect();
    }

    let divisor = if sum == 0.0 { 1.0 } else { sum };
    exps.iter().map(|e| e / divisor).collect()
}

/// Grow a detected face box so the classifier sees some context, then clamp
/// it to the frame.
///
/// The padding is half the box width on every side (the height is padded by
/// the same amount), whatever `scale_factor` says; the factor is only the
/// nominal size the caller asked for. The result always lies inside the
/// `frame_width` x `frame_height` frame.
pub fn expand_and_clamp_face_box(
    face: BoundingBox,
    scale_factor: f32,
    frame_width: u32,
    frame_height: u32,
) -> BoundingBox {
    let offset = face.width / 2;
    let x = face.x.saturating_sub(offset).min(frame_width);
    let y = face.y.saturating_sub(offset).min(frame_height);
    let padding = offset.saturating_mul(2);
    let width = face.width.saturating_add(padding).min(frame_width - x);
    let height = face.height.saturating_add(padding).min(frame_height - y);

    trace!(scale_factor, offset, x, y, width, height, "expanded face box");
    BoundingBox::new(x, y, width, height)
}

/// Express a pixel box as edges normalised to the frame size.
pub fn normalize_bounds(bounds: BoundingBox, frame_width: u32, frame_height: u32) -> NormalizedRect {
    if frame_width == 0 || frame_height == 0 {
        return NormalizedRect::default();
    }
    let (w, h) = (frame_width as f32, frame_height as f32);
    NormalizedRect::new(
        bounds.x as f32 / w,
        bounds.y as f32 / h,
        (bounds.x + bounds.width) as f32 / w,
        (bounds.y + bounds.height) as f32 / h,
    )
}

/// Index of the highest score. The first of several equal maxima wins.
pub fn predominant_index(scores: &[f32]) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (i, &score) in scores.iter().enumerate() {
        match best {
            Some((_, top)) if score <= top => {}
            _ if score.is_nan() => {}
            _ => best = Some((i, score)),
        }
    }
    best.map(|(i, _)| i)
}

/// Ordering applied to tags with equal scores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TieBreak {
    /// Keep input order.
    #[default]
    Stable,
    /// Ascending by name.
    ByName,
}

/// Tags scoring strictly above `threshold`, highest first, at most `k`.
pub fn top_k_above_threshold(
    tags: &[ConceptTagScore],
    k: usize,
    threshold: f32,
) -> Vec<ConceptTagScore> {
    top_k_above_threshold_by(tags, k, threshold, TieBreak::Stable)
}

/// [`top_k_above_threshold`] with an explicit tie-break.
pub fn top_k_above_threshold_by(
    tags: &[ConceptTagScore],
    k: usize,
    threshold: f32,
    tie_break: TieBreak,
) -> Vec<ConceptTagScore> {
    let mut kept: Vec<ConceptTagScore> = tags
        .iter()
        .filter(|t| t.score > threshold)
        .cloned()
        .collect();
    kept.sort_by(|a, b| {
        let by_score = b.score.total_cmp(&a.score);
        match (by_score, tie_break) {
            (Ordering::Equal, TieBreak::ByName) => a.name.cmp(&b.name),
            (ordering, _) => ordering,
        }
    });
    kept.truncate(k);
    kept
}

/// Collapse tags to one entry per name. A later tag replaces an earlier one.
pub fn deduplicate_by_name(
    tags: impl IntoIterator<Item = ConceptTagScore>,
) -> HashSet<ConceptTagScore> {
    let mut set = HashSet::new();
    for tag in tags {
        set.replace(tag);
    }
    set
}

/// Greedy non-maximum suppression.
///
/// Keeps the highest scoring item and discards any remaining item whose
/// rectangle overlaps a kept one by more than `iou_threshold`.
pub fn non_max_suppression<T>(
    mut items: Vec<T>,
    iou_threshold: f32,
    rect: impl Fn(&T) -> NormalizedRect,
    score: impl Fn(&T) -> f32,
) -> Vec<T> {
    items.sort_by(|a, b| score(b).total_cmp(&score(a)));
    let mut kept: Vec<T> = Vec::with_capacity(items.len());
    for item in items {
        let r = rect(&item);
        if kept.iter().all(|k| rect(k).iou(&r) <= iou_threshold) {
            kept.push(item);
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn softmax_sums_to_one() {
        let probs = softmax(&[1.0, 2.0, 3.0]);
        let sum: f32 = probs.iter().sum();
        assert!((sum - 1.0).abs() < 1e-5);
        assert!(probs[2] > probs[1] && probs[1] > probs[0]);
    }

    #[test]
    fn softmax_handles_overflowing_logits() {
        let probs = softmax(&[1000.0, 1000.0]);
        assert!((probs[0] - 0.5).abs() < 1e-6);
        assert!((probs[1] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn predominant_index_prefers_first_maximum() {
        assert_eq!(predominant_index(&[0.1, 0.7, 0.7]), Some(1));
        assert_eq!(predominant_index(&[]), None);
        assert_eq!(predominant_index(&[f32::NAN, 0.2]), Some(1));
    }

    #[test]
    fn normalize_bounds_of_zero_sized_frame() {
        let rect = normalize_bounds(BoundingBox::new(1, 1, 2, 2), 0, 10);
        assert!(rect.is_zero());
    }

    #[test]
    fn nms_drops_overlapping_lower_scores() {
        let items = vec![
            (NormalizedRect::new(0.0, 0.0, 0.5, 0.5), 0.6),
            (NormalizedRect::new(0.01, 0.01, 0.5, 0.5), 0.9),
            (NormalizedRect::new(0.6, 0.6, 1.0, 1.0), 0.4),
        ];
        let kept = non_max_suppression(items, 0.5, |i| i.0, |i| i.1);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].1, 0.9);
        assert_eq!(kept[1].1, 0.4);
    }
}
