//! Property-based tests for the rendering helpers using proptest.

use proptest::prelude::*;

use attnlens_core::render::{
    build_colored_sentence, make_head_heatmap, make_row_bar, normalize_weights,
    summarize_head_pattern, token_opacity,
};
use attnlens_core::view::{Selection, clamp_selection};

fn labels(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("t{i}")).collect()
}

fn square_matrix(max_n: usize) -> impl Strategy<Value = Vec<Vec<f32>>> {
    (1..=max_n).prop_flat_map(|n| prop::collection::vec(prop::collection::vec(0.0f32..1.0, n), n))
}

// --- Normalization ---

proptest! {
    #[test]
    fn normalized_weights_stay_in_unit_range(
        weights in prop::collection::vec(0.0f32..10.0, 1..64),
    ) {
        let out = normalize_weights(&weights).unwrap();
        prop_assert_eq!(out.len(), weights.len());
        for w in &out {
            prop_assert!((0.0..=1.0 + 1e-6).contains(w));
        }
    }

    #[test]
    fn normalized_peak_is_one(
        weights in prop::collection::vec(0.0f32..10.0, 1..64),
    ) {
        let max = weights.iter().copied().fold(0.0f32, f32::max);
        prop_assume!(max > 1e-3);
        let out = normalize_weights(&weights).unwrap();
        let peak = out.iter().copied().fold(0.0f32, f32::max);
        prop_assert!((peak - 1.0).abs() < 1e-5);
    }

    #[test]
    fn normalization_is_idempotent(
        weights in prop::collection::vec(0.01f32..10.0, 1..32),
    ) {
        let once = normalize_weights(&weights).unwrap();
        let twice = normalize_weights(&once).unwrap();
        for (a, b) in once.iter().zip(&twice) {
            prop_assert!((a - b).abs() < 1e-5);
        }
    }
}

// --- Colored sentence ---

proptest! {
    #[test]
    fn one_span_per_token(
        weights in prop::collection::vec(0.0f32..1.0, 1..48),
        dim in any::<bool>(),
    ) {
        let tokens = labels(weights.len());
        let html = build_colored_sentence(&tokens, &weights, dim).unwrap();
        prop_assert_eq!(html.matches("<span").count(), tokens.len());
        prop_assert!(html.starts_with("<div"));
        prop_assert!(html.ends_with("</div>"));
    }

    #[test]
    fn opacity_is_bounded(weight in 0.0f32..=1.0, dim in any::<bool>()) {
        for token in ["[CLS]", "[SEP]", "word"] {
            let alpha = token_opacity(token, weight, dim);
            prop_assert!((0.05..=1.0 + 1e-6).contains(&alpha));
        }
    }

    #[test]
    fn mismatched_lengths_are_rejected(
        n in 1usize..32,
        extra in 1usize..4,
    ) {
        let tokens = labels(n);
        let weights = vec![0.5; n + extra];
        prop_assert!(build_colored_sentence(&tokens, &weights, true).is_err());
        prop_assert!(make_row_bar(&weights, &tokens, "t0").is_err());
    }
}

// --- Charts and summaries ---

proptest! {
    #[test]
    fn heatmap_scale_covers_matrix(matrix in square_matrix(12)) {
        let tokens = labels(matrix.len());
        let spec = make_head_heatmap(&matrix, &tokens, "h").unwrap();
        let max = matrix.iter().flatten().copied().fold(0.0f32, f32::max);
        prop_assert_eq!(spec.zmin, 0.0);
        prop_assert!(spec.zmax >= max);
        prop_assert_eq!(spec.x_labels.len(), tokens.len());
        prop_assert_eq!(spec.y_labels.len(), tokens.len());
    }

    #[test]
    fn summary_is_never_empty(matrix in square_matrix(12)) {
        let summary = summarize_head_pattern(&matrix).unwrap();
        prop_assert!(!summary.is_empty());
    }

    #[test]
    fn clamped_selection_is_in_bounds(
        layer in 0usize..100,
        head in 0usize..100,
        token in 0usize..100,
        layers in 1usize..24,
        heads in 1usize..16,
        seq_len in 1usize..64,
    ) {
        let s = clamp_selection(Selection { layer, head, token }, layers, heads, seq_len);
        prop_assert!(s.layer < layers);
        prop_assert!(s.head < heads);
        prop_assert!(s.token < seq_len);
    }
}
