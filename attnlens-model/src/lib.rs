//! # AttnLens Model
//!
//! BERT-family inference adapter for attnlens, built on `candle`.
//! Checkpoints and tokenizers come from the Hugging Face hub or a local
//! directory with the same layout.

pub mod bert;
pub mod loader;

pub use bert::{BertConfig, BertEncoder};
pub use loader::{BertAttentionModel, HubModelLoader};
