//! Tests for the pure post-processing helpers.

use huginn::postprocess::{
    FACE_BOX_SCALE, TieBreak, deduplicate_by_name, expand_and_clamp_face_box, normalize_bounds,
    softmax, top_k_above_threshold, top_k_above_threshold_by,
};
use huginn::{BoundingBox, ConceptTagScore};

fn tags(pairs: &[(&str, f32)]) -> Vec<ConceptTagScore> {
    pairs
        .iter()
        .map(|(name, score)| ConceptTagScore::new(*name, *score))
        .collect()
}

fn names(tags: &[ConceptTagScore]) -> Vec<&str> {
    tags.iter().map(|t| t.name.as_str()).collect()
}

// ============================================================================
// Softmax
// ============================================================================

#[test]
fn softmax_of_equal_scores_is_uniform() {
    // All-zero logits are not a zero sum: each exp(0) is 1.
    let probs = softmax(&[0.0; 8]);
    assert_eq!(probs.len(), 8);
    for p in probs {
        assert!((p - 0.125).abs() < 1e-6);
    }
}

#[test]
fn softmax_preserves_order_and_sums_to_one() {
    let probs = softmax(&[-1.0, 0.5, 3.0, 0.5]);
    let sum: f32 = probs.iter().sum();
    assert!((sum - 1.0).abs() < 1e-5);
    assert!(probs[2] > probs[1]);
    assert_eq!(probs[1], probs[3]);
    assert!(probs[1] > probs[0]);
}

#[test]
fn softmax_with_underflowing_sum_yields_zeros() {
    let probs = softmax(&[-1.0e6, -1.0e6, -1.0e6]);
    assert!(probs.iter().all(|p| *p == 0.0));
    assert!(probs.iter().all(|p| !p.is_nan()));
}

#[test]
fn softmax_terms_below_f32_range_flush_to_zero() {
    // exp(-200) is representable in f64 but not in f32.
    assert_eq!(softmax(&[-200.0, -200.0]), vec![0.0, 0.0]);

    // One representable term still normalises to one.
    assert_eq!(softmax(&[-200.0, 0.0]), vec![0.0, 1.0]);
}

#[test]
fn softmax_survives_overflowing_sum() {
    let probs = softmax(&[100.0, 100.0]);
    assert!(probs.iter().all(|p| (p - 0.5).abs() < 1e-6));
}

#[test]
fn softmax_of_empty_input_is_empty() {
    assert!(softmax(&[]).is_empty());
}

// ============================================================================
// Face box
// ============================================================================

#[test]
fn face_box_is_padded_by_half_its_width() {
    let expanded = expand_and_clamp_face_box(BoundingBox::new(100, 100, 40, 60), FACE_BOX_SCALE, 640, 480);
    assert_eq!(expanded, BoundingBox::new(80, 80, 80, 100));
}

#[test]
fn face_box_near_origin_is_clamped() {
    let expanded = expand_and_clamp_face_box(BoundingBox::new(5, 3, 20, 20), FACE_BOX_SCALE, 100, 100);
    assert_eq!(expanded.x, 0);
    assert_eq!(expanded.y, 0);
    assert_eq!(expanded.width, 40);
    assert_eq!(expanded.height, 40);
}

#[test]
fn face_box_stays_inside_frame() {
    let frames = [(64u32, 48u32), (100, 100), (1920, 1080)];
    let faces = [
        BoundingBox::new(0, 0, 10, 10),
        BoundingBox::new(50, 40, 30, 30),
        BoundingBox::new(90, 90, 200, 200),
        BoundingBox::new(2000, 2000, 10, 10),
    ];
    for (fw, fh) in frames {
        for face in faces {
            let b = expand_and_clamp_face_box(face, FACE_BOX_SCALE, fw, fh);
            assert!(b.x <= fw && b.y <= fh, "{b:?} origin outside {fw}x{fh}");
            assert!(b.x + b.width <= fw, "{b:?} wider than {fw}");
            assert!(b.y + b.height <= fh, "{b:?} taller than {fh}");
        }
    }
}

#[test]
fn face_box_outside_frame_collapses_to_empty() {
    let b = expand_and_clamp_face_box(BoundingBox::new(500, 500, 10, 10), FACE_BOX_SCALE, 100, 100);
    assert!(b.is_empty());
}

#[test]
fn normalized_bounds_are_relative_edges() {
    let rect = normalize_bounds(BoundingBox::new(25, 50, 50, 25), 100, 100);
    assert_eq!(rect.to_array(), [0.25, 0.5, 0.75, 0.75]);
}

// ============================================================================
// Top-K and deduplication
// ============================================================================

#[test]
fn top_k_keeps_highest_scores_above_threshold() {
    let all = tags(&[("beach", 0.95), ("sand", 0.8), ("sky", 0.65), ("water", 0.72)]);
    let top = top_k_above_threshold(&all, 5, 0.7);
    assert_eq!(names(&top), vec!["beach", "sand", "water"]);
}

#[test]
fn top_k_truncates_to_k() {
    let all = tags(&[("beach", 0.95), ("sand", 0.8), ("water", 0.72)]);
    assert_eq!(names(&top_k_above_threshold(&all, 2, 0.0)), vec!["beach", "sand"]);
    assert!(top_k_above_threshold(&all, 0, 0.0).is_empty());
}

#[test]
fn threshold_is_strict() {
    let all = tags(&[("edge", 0.7), ("over", 0.71)]);
    assert_eq!(names(&top_k_above_threshold(&all, 5, 0.7)), vec!["over"]);
}

#[test]
fn equal_scores_keep_input_order_by_default() {
    let all = tags(&[("zebra", 0.9), ("apple", 0.9), ("mango", 0.9)]);
    assert_eq!(
        names(&top_k_above_threshold(&all, 3, 0.5)),
        vec!["zebra", "apple", "mango"]
    );
    assert_eq!(
        names(&top_k_above_threshold_by(&all, 3, 0.5, TieBreak::ByName)),
        vec!["apple", "mango", "zebra"]
    );
}

#[test]
fn deduplicate_keeps_one_tag_per_name() {
    let set = deduplicate_by_name(tags(&[("cat", 0.9), ("cat", 0.8), ("dog", 0.7)]));
    assert_eq!(set.len(), 2);

    let cat = set.get(&ConceptTagScore::new("cat", 0.0)).unwrap();
    assert_eq!(cat.score, 0.8);
}

#[test]
fn tag_identity_ignores_score() {
    assert_eq!(ConceptTagScore::new("cat", 0.1), ConceptTagScore::new("cat", 0.9));
    assert_ne!(ConceptTagScore::new("cat", 0.5), ConceptTagScore::new("dog", 0.5));
}
