//! Max-normalization of attention weights.

use crate::error::RenderError;

/// Scale weights into `[0, 1]` by dividing by their maximum.
///
/// An all-zero vector stays all-zero. Empty input is a caller error.
pub fn normalize_weights(weights: &[f32]) -> Result<Vec<f32>, RenderError> {
    let max = weights
        .iter()
        .copied()
        .reduce(f32::max)
        .ok_or(RenderError::EmptyWeights)?;
    if max == 0.0 {
        return Ok(vec![0.0; weights.len()]);
    }
    Ok(weights.iter().map(|w| w / max).collect())
}
