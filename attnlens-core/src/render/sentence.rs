//! Token-by-token colored rendering of one attention row.

use super::charts::check_len;
use super::normalize::normalize_weights;
use crate::canvas::renderer::escape_html;
use crate::error::RenderError;

/// Boundary markers inserted by the tokenizer.
pub const SPECIAL_TOKENS: [&str; 2] = ["[CLS]", "[SEP]"];

/// Opacity given to boundary markers when dimming is enabled.
const DIMMED_OPACITY: f32 = 0.05;
const MIN_OPACITY: f32 = 0.1;

pub fn is_special_token(token: &str) -> bool {
    SPECIAL_TOKENS.contains(&token)
}

/// Background opacity for a token with normalized weight `weight`.
pub fn token_opacity(token: &str, weight: f32, dim_special: bool) -> f32 {
    if dim_special && is_special_token(token) {
        DIMMED_OPACITY
    } else {
        MIN_OPACITY + (1.0 - MIN_OPACITY) * weight
    }
}

/// Render tokens as inline spans whose red background tracks their weight.
///
/// `weights` may be raw; they are max-normalized first. With `dim_special`
/// set, `[CLS]` and `[SEP]` are drawn faint regardless of weight.
pub fn build_colored_sentence(
    tokens: &[String],
    weights: &[f32],
    dim_special: bool,
) -> Result<String, RenderError> {
    check_len("weight vector", tokens.len(), weights.len())?;
    if tokens.is_empty() {
        return Ok(wrap(String::new()));
    }
    let normalized = normalize_weights(weights)?;

    let spans: Vec<String> = tokens
        .iter()
        .zip(&normalized)
        .map(|(tok, &w)| {
            let alpha = token_opacity(tok, w, dim_special);
            format!(
                "<span style='background-color: rgba(255, 0, 0, {alpha:.3}); \
                 padding: 3px 5px; margin: 2px; border-radius: 4px; \
                 display: inline-block; font-family: monospace;'>{}</span>",
                escape_html(tok)
            )
        })
        .collect();

    Ok(wrap(spans.join(" ")))
}

fn wrap(inner: String) -> String {
    format!("<div style='line-height: 2.0;'>{inner}</div>")
}
