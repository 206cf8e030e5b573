//! View composition.
//!
//! One call turns a sentence, a model choice and a (layer, head, token)
//! selection into everything the display surface shows. Nothing is retained
//! between calls except the loaded models held by [`ModelCache`].

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::adapter::{AttentionModel, CachedModel, ModelCache, ModelLoader};
use crate::canvas::{BarSpec, HeatmapSpec};
use crate::config::ViewerConfig;
use crate::error::Result;
use crate::render::{
    build_colored_sentence, make_head_heatmap, make_row_bar, summarize_head_pattern,
};
use crate::tensor::Attention;

/// Everything the user can set in the view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewRequest {
    pub sentence: String,
    pub model: String,
    pub max_tokens: usize,
    pub layer: usize,
    pub head: usize,
    pub token: usize,
}

impl ViewRequest {
    /// The request a fresh view starts from.
    pub fn from_config(config: &ViewerConfig) -> Self {
        Self {
            sentence: config.default_sentence.clone(),
            model: config.default_model().to_string(),
            max_tokens: config.default_tokens,
            layer: 0,
            head: 0,
            token: config.default_token_index,
        }
    }
}

/// Which (layer, head, token) the view is focused on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    pub layer: usize,
    pub head: usize,
    pub token: usize,
}

/// One cell of the per-head comparison grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeadPanel {
    pub head: usize,
    pub bar: BarSpec,
    pub summary: String,
}

/// Rendered output for a single interaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewModel {
    pub tokens: Vec<String>,
    pub num_layers: usize,
    pub num_heads: usize,
    pub seq_len: usize,
    pub selection: Selection,
    pub query_token: String,
    pub colored_sentence: String,
    pub row_bar: BarSpec,
    pub heatmap: HeatmapSpec,
    pub head_summary: String,
    pub head_grid: Vec<HeadPanel>,
}

/// Compose the view for one selection over an already-computed attention.
pub fn build_view(
    attention: &Attention,
    selection: Selection,
    dim_special: bool,
) -> Result<ViewModel> {
    let tokens = attention.tokens();
    let tensor = attention.tensor();

    let head_matrix = tensor.head(selection.layer, selection.head)?;
    let row = tensor.row(selection.layer, selection.head, selection.token)?;
    let query_token = tokens[selection.token].clone();

    let colored_sentence = build_colored_sentence(tokens, &row, dim_special)?;
    let row_bar = make_row_bar(&row, tokens, &query_token)?;
    let heatmap = make_head_heatmap(
        &head_matrix,
        tokens,
        &format!("Layer {} · Head {}", selection.layer, selection.head),
    )?;
    let head_summary = summarize_head_pattern(&head_matrix)?;

    let head_grid = (0..tensor.num_heads())
        .map(|head| -> Result<HeadPanel> {
            let matrix = tensor.head(selection.layer, head)?;
            let weights = &matrix[selection.token];
            Ok(HeadPanel {
                head,
                bar: make_row_bar(weights, tokens, &query_token)?.compact(),
                summary: summarize_head_pattern(&matrix)?,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    tracing::debug!(
        layer = selection.layer,
        head = selection.head,
        token = selection.token,
        seq_len = tensor.seq_len(),
        "Built attention view"
    );

    Ok(ViewModel {
        tokens: tokens.to_vec(),
        num_layers: tensor.num_layers(),
        num_heads: tensor.num_heads(),
        seq_len: tensor.seq_len(),
        selection,
        query_token,
        colored_sentence,
        row_bar,
        heatmap,
        head_summary,
        head_grid,
    })
}

/// Session state behind the interactive view: configuration plus the model cache.
#[derive(Debug)]
pub struct Viewer {
    config: ViewerConfig,
    models: ModelCache,
}

impl Viewer {
    pub fn new(config: ViewerConfig, loader: Box<dyn ModelLoader>) -> Self {
        Self {
            config,
            models: ModelCache::new(loader),
        }
    }

    pub fn config(&self) -> &ViewerConfig {
        &self.config
    }

    pub fn models(&self) -> &ModelCache {
        &self.models
    }

    /// Tokenize, infer and render. A blank sentence renders nothing.
    ///
    /// The selection is clamped to the dimensions of the new attention.
    pub fn render(&mut self, request: &ViewRequest) -> Result<Option<ViewModel>> {
        let Some(pending) = self.prepare(request)? else {
            return Ok(None);
        };
        self.complete(pending.run()).map(Some)
    }

    /// Validate a request and look up its model without loading anything.
    pub fn prepare(&self, request: &ViewRequest) -> Result<Option<PendingView>> {
        if request.sentence.trim().is_empty() {
            return Ok(None);
        }
        self.config.check_model(&request.model)?;
        let max_tokens = self.config.quantize_max_tokens(request.max_tokens)?;

        Ok(Some(PendingView {
            model_name: request.model.clone(),
            model: self.models.lookup(&request.model),
            sentence: request.sentence.clone(),
            max_tokens,
            selection: Selection {
                layer: request.layer,
                head: request.head,
                token: request.token,
            },
            dim_special: self.config.dim_special_tokens,
        }))
    }

    /// Cache any model loaded by [`PendingView::run`] and hand back its view.
    pub fn complete(&mut self, outcome: RenderOutcome) -> Result<ViewModel> {
        if let Some(model) = outcome.loaded {
            self.models.insert(&outcome.model_name, model);
        }
        outcome.result
    }
}

/// A validated request that no longer borrows the [`Viewer`].
#[derive(Debug)]
pub struct PendingView {
    model_name: String,
    model: CachedModel,
    sentence: String,
    max_tokens: usize,
    selection: Selection,
    dim_special: bool,
}

/// What [`PendingView::run`] produced, including a freshly loaded model.
pub struct RenderOutcome {
    model_name: String,
    loaded: Option<Arc<dyn AttentionModel>>,
    result: Result<ViewModel>,
}

impl std::fmt::Debug for RenderOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderOutcome")
            .field("model_name", &self.model_name)
            .field("loaded", &self.loaded.is_some())
            .field("result", &self.result)
            .finish()
    }
}

impl PendingView {
    /// Load the model on a cache miss, run the forward pass and compose the
    /// view. Blocks for as long as loading and inference take.
    pub fn run(self) -> RenderOutcome {
        let PendingView {
            model_name,
            model,
            sentence,
            max_tokens,
            selection,
            dim_special,
        } = self;

        let (model, fresh) = match model {
            CachedModel::Hit(model) => (model, false),
            CachedModel::Miss(loader) => {
                tracing::info!(model = %model_name, "Loading model");
                match loader.load(&model_name) {
                    Ok(model) => (model, true),
                    Err(e) => {
                        return RenderOutcome {
                            model_name,
                            loaded: None,
                            result: Err(e.into()),
                        };
                    }
                }
            }
        };

        let result = attend(model.as_ref(), &sentence, max_tokens, selection, dim_special);
        RenderOutcome {
            model_name,
            loaded: fresh.then_some(model),
            result,
        }
    }
}

fn attend(
    model: &dyn AttentionModel,
    sentence: &str,
    max_tokens: usize,
    selection: Selection,
    dim_special: bool,
) -> Result<ViewModel> {
    let attention = model.tokenize_and_attend(sentence, max_tokens)?;
    let tensor = attention.tensor();
    tracing::info!(
        model = model.name(),
        tokens = attention.tokens().len(),
        layers = tensor.num_layers(),
        heads = tensor.num_heads(),
        "Computed attention"
    );

    let selection = clamp_selection(
        selection,
        tensor.num_layers(),
        tensor.num_heads(),
        tensor.seq_len(),
    );
    build_view(&attention, selection, dim_special)
}

/// Clamp a selection into the bounds of the attention it will be applied to.
///
/// Widgets keep their old value when a new sentence is shorter than the last.
pub fn clamp_selection(
    selection: Selection,
    layers: usize,
    heads: usize,
    seq_len: usize,
) -> Selection {
    fn clamp(value: usize, bound: usize) -> usize {
        value.min(bound.saturating_sub(1))
    }
    Selection {
        layer: clamp(selection.layer, layers),
        head: clamp(selection.head, heads),
        token: clamp(selection.token, seq_len),
    }
}
