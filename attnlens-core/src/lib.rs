//! # AttnLens Core
//!
//! Core library for the attnlens attention viewer.
//! Provides the attention tensor types, pure rendering helpers, the inference
//! adapter traits with their model cache, view composition, configuration,
//! and the HTTP gateway that serves the interactive page.

pub mod adapter;
pub mod canvas;
pub mod config;
pub mod error;
pub mod gateway;
pub mod render;
pub mod tensor;
pub mod view;

// Re-export commonly used types at the crate root.
pub use adapter::{AttentionModel, CachedModel, ModelCache, ModelLoader};
pub use config::{AppConfig, ViewerConfig, load_config};
pub use error::{AttnLensError, ModelError, RenderError, Result, ViewError};
pub use gateway::{GatewayConfig, GatewayServer, SharedGateway};
pub use render::{
    build_colored_sentence, make_head_heatmap, make_row_bar, normalize_weights,
    summarize_head_pattern,
};
pub use tensor::{Attention, AttentionTensor};
pub use view::{
    HeadPanel, PendingView, RenderOutcome, Selection, ViewModel, ViewRequest, Viewer, build_view,
};
