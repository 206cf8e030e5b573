//! Attention rendering utilities.
//!
//! Pure, stateless helpers that turn an attention matrix or a single
//! attention row, together with token labels, into normalized weights,
//! chart specifications, colored HTML and a short textual summary.

pub mod charts;
pub mod normalize;
pub mod sentence;
pub mod summary;

pub use charts::{DEFAULT_HEATMAP_TITLE, make_head_heatmap, make_row_bar};
pub use normalize::normalize_weights;
pub use sentence::{SPECIAL_TOKENS, build_colored_sentence, is_special_token, token_opacity};
pub use summary::summarize_head_pattern;
