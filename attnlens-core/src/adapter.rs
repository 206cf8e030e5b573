//! Inference adapter traits and the process-wide model cache.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::ModelError;
use crate::tensor::Attention;

/// A loaded encoder that can tokenize a sentence and report its attention.
pub trait AttentionModel: Send + Sync {
    fn name(&self) -> &str;

    /// Tokenize `sentence` (truncated to `max_length` tokens, boundary markers
    /// included) and run one forward pass.
    fn tokenize_and_attend(
        &self,
        sentence: &str,
        max_length: usize,
    ) -> Result<Attention, ModelError>;
}

/// Loads models by name. Loading is expected to be slow.
pub trait ModelLoader: Send + Sync {
    fn load(&self, model_name: &str) -> Result<Arc<dyn AttentionModel>, ModelError>;
}

/// Memoizes loaded models by name for the lifetime of the process.
///
/// Weights are immutable once loaded, so entries are never invalidated.
pub struct ModelCache {
    loader: Arc<dyn ModelLoader>,
    models: HashMap<String, Arc<dyn AttentionModel>>,
}

impl std::fmt::Debug for ModelCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelCache")
            .field("loaded", &self.loaded_names())
            .finish()
    }
}

/// Result of a cache lookup. A miss carries the loader so the load can run
/// after the cache borrow has ended.
#[derive(Clone)]
pub enum CachedModel {
    Hit(Arc<dyn AttentionModel>),
    Miss(Arc<dyn ModelLoader>),
}

impl std::fmt::Debug for CachedModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Hit(model) => f.debug_tuple("Hit").field(&model.name()).finish(),
            Self::Miss(_) => f.write_str("Miss"),
        }
    }
}

impl ModelCache {
    pub fn new(loader: Box<dyn ModelLoader>) -> Self {
        Self {
            loader: Arc::from(loader),
            models: HashMap::new(),
        }
    }

    /// Return the cached model, loading it on first use.
    pub fn get_or_load(&mut self, model_name: &str) -> Result<Arc<dyn AttentionModel>, ModelError> {
        match self.lookup(model_name) {
            CachedModel::Hit(model) => Ok(model),
            CachedModel::Miss(loader) => {
                tracing::info!(model = model_name, "Loading model");
                let model = loader.load(model_name)?;
                Ok(self.insert(model_name, model))
            }
        }
    }

    pub fn lookup(&self, model_name: &str) -> CachedModel {
        match self.models.get(model_name) {
            Some(model) => {
                tracing::debug!(model = model_name, "Model cache hit");
                CachedModel::Hit(Arc::clone(model))
            }
            None => CachedModel::Miss(Arc::clone(&self.loader)),
        }
    }

    /// Cache a model loaded after a [`CachedModel::Miss`]. If another load of
    /// the same name finished first, that entry is kept and returned.
    pub fn insert(
        &mut self,
        model_name: &str,
        model: Arc<dyn AttentionModel>,
    ) -> Arc<dyn AttentionModel> {
        let entry = self.models.entry(model_name.to_string()).or_insert_with(|| {
            tracing::info!(model = model_name, "Model loaded and cached");
            model
        });
        Arc::clone(entry)
    }

    pub fn is_loaded(&self, model_name: &str) -> bool {
        self.models.contains_key(model_name)
    }

    /// Names of every cached model, sorted.
    pub fn loaded_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.models.keys().cloned().collect();
        names.sort();
        names
    }
}
