//! Error types for the attnlens core library.
//!
//! Uses `thiserror` for public API error types, split by the layer that raises
//! them: rendering helpers, the inference adapter, and view composition.

/// Top-level error type for the attnlens core library.
#[derive(Debug, thiserror::Error)]
pub enum AttnLensError {
    #[error("Render error: {0}")]
    Render(#[from] RenderError),

    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    #[error("View error: {0}")]
    View(#[from] ViewError),

    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Caller errors from the attention rendering helpers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RenderError {
    #[error("Cannot normalize an empty weight vector")]
    EmptyWeights,

    #[error("{what} has length {actual}, expected {expected} to match the token labels")]
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Attention matrix must be square: row {row} has {len} entries, expected {expected}")]
    NotSquare {
        row: usize,
        len: usize,
        expected: usize,
    },
}

/// Errors raised by an inference adapter while loading or running a model.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("Failed to load model '{model}': {message}")]
    Load { model: String, message: String },

    #[error("Tokenization failed: {0}")]
    Tokenize(String),

    #[error("Inference failed: {0}")]
    Inference(String),

    #[error("Attention tensor has {actual} values, expected {expected} for shape {shape:?}")]
    TensorShape {
        shape: [usize; 4],
        expected: usize,
        actual: usize,
    },

    #[error("Ragged attention tensor: {at} has {actual} entries, expected {expected}")]
    Ragged {
        at: String,
        expected: usize,
        actual: usize,
    },

    #[error("Attention covers {seq_len} positions but {tokens} tokens were produced")]
    TokenCount { seq_len: usize, tokens: usize },
}

impl ModelError {
    pub fn load(model: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Load {
            model: model.into(),
            message: message.into(),
        }
    }

    pub fn tokenize(msg: impl Into<String>) -> Self {
        Self::Tokenize(msg.into())
    }

    pub fn inference(msg: impl Into<String>) -> Self {
        Self::Inference(msg.into())
    }
}

/// Errors from composing a view out of a user selection.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ViewError {
    #[error("Unknown model '{name}', expected one of: {}", .available.join(", "))]
    UnknownModel {
        name: String,
        available: Vec<String>,
    },

    #[error("{axis} index {index} out of range (0..{bound})")]
    SelectionOutOfRange {
        axis: &'static str,
        index: usize,
        bound: usize,
    },

    #[error("Max token count {value} outside {min}..={max}")]
    MaxTokensOutOfRange { value: usize, min: usize, max: usize },

    #[error("Invalid viewer settings: {0}")]
    InvalidSettings(String),
}

/// Convenience type alias for attnlens results.
pub type Result<T> = std::result::Result<T, AttnLensError>;
