//! Heatmap and bar chart builders.

use crate::canvas::{BarSpec, HeatmapSpec};
use crate::error::RenderError;

/// Title used for the single-head heatmap when the caller has no better one.
pub const DEFAULT_HEATMAP_TITLE: &str = "Head attention";

/// Heatmap for a single head. `tokens` label both axes.
pub fn make_head_heatmap(
    matrix: &[Vec<f32>],
    tokens: &[String],
    title: &str,
) -> Result<HeatmapSpec, RenderError> {
    check_len("matrix row count", tokens.len(), matrix.len())?;
    for row in matrix {
        check_len("matrix row", tokens.len(), row.len())?;
    }

    let max = matrix.iter().flatten().copied().fold(0.0_f32, f32::max);
    // A degenerate [0, 0] color scale would render blank.
    let zmax = if max > 0.0 { max } else { 1.0 };

    Ok(HeatmapSpec {
        title: title.to_string(),
        x_labels: tokens.to_vec(),
        y_labels: tokens.to_vec(),
        z: matrix.to_vec(),
        zmin: 0.0,
        zmax,
        x_title: "Key tokens".into(),
        y_title: "Query tokens".into(),
        colorbar_title: "Attention".into(),
        tick_angle: 45,
    })
}

/// Bar chart of the attention one query token pays to every token.
pub fn make_row_bar(
    weights: &[f32],
    tokens: &[String],
    query_token: &str,
) -> Result<BarSpec, RenderError> {
    check_len("weight vector", tokens.len(), weights.len())?;
    Ok(BarSpec {
        title: format!("Attention from '{query_token}' to all tokens"),
        labels: tokens.to_vec(),
        values: weights.to_vec(),
        x_title: "Tokens".into(),
        y_title: "Attention weight".into(),
        tick_angle: 45,
        height: None,
        margin: None,
    })
}

pub(crate) fn check_len(
    what: &'static str,
    expected: usize,
    actual: usize,
) -> Result<(), RenderError> {
    if expected != actual {
        return Err(RenderError::DimensionMismatch {
            what,
            expected,
            actual,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(list: &[&str]) -> Vec<String> {
        list.iter().map(|t| t.to_string()).collect()
    }

    #[test]
    fn test_heatmap_scale_uses_matrix_max() {
        let m = vec![vec![0.2, 0.6], vec![0.4, 0.1]];
        let spec = make_head_heatmap(&m, &tokens(&["[CLS]", "[SEP]"]), "L0 H0").unwrap();
        assert_eq!(spec.zmin, 0.0);
        assert_eq!(spec.zmax, 0.6);
        assert_eq!(spec.title, "L0 H0");
        assert_eq!(spec.x_title, "Key tokens");
        assert_eq!(spec.y_title, "Query tokens");
        assert_eq!(spec.x_labels, spec.y_labels);
        assert_eq!(spec.z, m);
    }

    #[test]
    fn test_heatmap_zero_matrix_uses_unit_scale() {
        let m = vec![vec![0.0; 3]; 3];
        let spec = make_head_heatmap(&m, &tokens(&["a", "b", "c"]), DEFAULT_HEATMAP_TITLE).unwrap();
        assert_eq!(spec.zmax, 1.0);
        assert_eq!(spec.title, "Head attention");
    }

    #[test]
    fn test_heatmap_label_mismatch() {
        let m = vec![vec![0.5, 0.5], vec![0.5, 0.5]];
        let err = make_head_heatmap(&m, &tokens(&["a", "b", "c"]), "t").unwrap_err();
        assert_eq!(
            err,
            RenderError::DimensionMismatch {
                what: "matrix row count",
                expected: 3,
                actual: 2
            }
        );
    }

    #[test]
    fn test_heatmap_ragged_row() {
        let m = vec![vec![0.5, 0.5], vec![1.0]];
        let err = make_head_heatmap(&m, &tokens(&["a", "b"]), "t").unwrap_err();
        assert!(matches!(
            err,
            RenderError::DimensionMismatch {
                what: "matrix row",
                actual: 1,
                ..
            }
        ));
    }

    #[test]
    fn test_row_bar() {
        let spec = make_row_bar(&[0.1, 0.9], &tokens(&["love", "it"]), "love").unwrap();
        assert_eq!(spec.title, "Attention from 'love' to all tokens");
        assert_eq!(spec.labels, tokens(&["love", "it"]));
        assert_eq!(spec.values, vec![0.1, 0.9]);
        assert_eq!(spec.x_title, "Tokens");
        assert_eq!(spec.y_title, "Attention weight");
        assert!(spec.height.is_none());
    }

    #[test]
    fn test_row_bar_length_mismatch() {
        let err = make_row_bar(&[0.1], &tokens(&["a", "b"]), "a").unwrap_err();
        assert_eq!(
            err,
            RenderError::DimensionMismatch {
                what: "weight vector",
                expected: 2,
                actual: 1
            }
        );
    }
}
