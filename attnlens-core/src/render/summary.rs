//! Heuristic one-line description of an attention head.

use crate::error::RenderError;

const SELF_ATTENTION_THRESHOLD: f32 = 0.3;
const DIRECTION_RATIO: f32 = 1.2;
const BOUNDARY_THRESHOLD: f32 = 0.3;

/// Describe the dominant behaviour of one head's N×N matrix.
///
/// Column 0 is taken to be the `[CLS]` position.
pub fn summarize_head_pattern(matrix: &[Vec<f32>]) -> Result<String, RenderError> {
    let n = matrix.len();
    for (row, values) in matrix.iter().enumerate() {
        if values.len() != n {
            return Err(RenderError::NotSquare {
                row,
                len: values.len(),
                expected: n,
            });
        }
    }

    let diag_mean = mean((0..n).map(|i| matrix[i][i]));
    let forward_mean = mean((0..n).flat_map(|q| (q + 1..n).map(move |k| matrix[q][k])));
    let backward_mean = mean((0..n).flat_map(|q| (0..q).map(move |k| matrix[q][k])));
    let boundary_mean = mean(matrix.iter().map(|row| row[0]));

    let mut parts = Vec::new();
    if diag_mean > SELF_ATTENTION_THRESHOLD {
        parts.push("strong self-attention");
    }
    if backward_mean > forward_mean * DIRECTION_RATIO {
        parts.push("looks more at previous tokens");
    } else if forward_mean > backward_mean * DIRECTION_RATIO {
        parts.push("looks more at next tokens");
    }
    if boundary_mean > BOUNDARY_THRESHOLD {
        parts.push("pays a lot of attention to [CLS]");
    }

    if parts.is_empty() {
        return Ok("balanced attention pattern".to_string());
    }
    Ok(parts.join(", "))
}

/// Mean of an iterator, 0 when it is empty.
fn mean(values: impl Iterator<Item = f32>) -> f32 {
    let (sum, count) = values.fold((0.0_f32, 0_usize), |(s, c), v| (s + v, c + 1));
    if count == 0 { 0.0 } else { sum / count as f32 }
}
