//! Hugging Face hub loading and the [`AttentionModel`] implementation.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use attnlens_core::adapter::{AttentionModel, ModelLoader};
use attnlens_core::error::ModelError;
use attnlens_core::tensor::{Attention, AttentionTensor};
use candle_core::{DType, Device};
use candle_nn::VarBuilder;
use hf_hub::{Repo, RepoType, api::sync::Api};
use tokenizers::Tokenizer;
use tracing::info;

use crate::bert::{BertConfig, BertEncoder};

const CLS_TOKEN: &str = "[CLS]";
const SEP_TOKEN: &str = "[SEP]";

/// A BERT checkpoint paired with its tokenizer.
#[derive(Debug)]
pub struct BertAttentionModel {
    name: String,
    encoder: BertEncoder,
    tokenizer: Tokenizer,
    cls_id: u32,
    sep_id: u32,
}

impl BertAttentionModel {
    pub fn new(name: impl Into<String>, encoder: BertEncoder, tokenizer: Tokenizer) -> Result<Self> {
        let cls_id = tokenizer
            .token_to_id(CLS_TOKEN)
            .with_context(|| format!("Tokenizer has no {CLS_TOKEN} token"))?;
        let sep_id = tokenizer
            .token_to_id(SEP_TOKEN)
            .with_context(|| format!("Tokenizer has no {SEP_TOKEN} token"))?;
        Ok(Self {
            name: name.into(),
            encoder,
            tokenizer,
            cls_id,
            sep_id,
        })
    }

    /// Download (or reuse the local hub cache of) `model_id` and load it on `device`.
    pub fn from_hub(model_id: &str, device: &Device) -> Result<Self> {
        info!("Loading BERT checkpoint from: {}", model_id);

        let api = Api::new()?;
        let repo = api.repo(Repo::new(model_id.to_string(), RepoType::Model));
        let files = ModelFiles {
            config: repo
                .get("config.json")
                .context("Failed to download config.json")?,
            tokenizer: repo
                .get("tokenizer.json")
                .context("Failed to download tokenizer.json")?,
            weights: repo
                .get("model.safetensors")
                .context("Failed to download model.safetensors")?,
        };
        Self::from_files(model_id, &files, device)
    }

    /// Load from a local directory laid out like a hub repo.
    pub fn from_dir(name: &str, dir: &Path, device: &Device) -> Result<Self> {
        let files = ModelFiles {
            config: dir.join("config.json"),
            tokenizer: dir.join("tokenizer.json"),
            weights: dir.join("model.safetensors"),
        };
        Self::from_files(name, &files, device)
    }

    fn from_files(name: &str, files: &ModelFiles, device: &Device) -> Result<Self> {
        let config_str =
            std::fs::read_to_string(&files.config).context("Failed to read config.json")?;
        let config: BertConfig = serde_json::from_str(&config_str)?;
        info!(
            "BERT config: {} layers, hidden={}, heads={}, vocab={}",
            config.num_hidden_layers,
            config.hidden_size,
            config.num_attention_heads,
            config.vocab_size
        );

        let tokenizer = Tokenizer::from_file(&files.tokenizer)
            .map_err(|e| anyhow::anyhow!("Cannot load tokenizer: {e}"))?;

        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&[&files.weights], DType::F32, device)?
        };
        let encoder = BertEncoder::load(vb, &config)?;
        Self::new(name, encoder, tokenizer)
    }

    /// Token ids and labels for `[CLS] sentence [SEP]`, at most `max_length` long.
    ///
    /// Both markers are always kept, so a `max_length` below 2 still yields two
    /// tokens. The viewer never asks for fewer than `MIN_SEQUENCE_TOKENS`.
    pub fn encode(&self, sentence: &str, max_length: usize) -> Result<(Vec<u32>, Vec<String>)> {
        let encoding = self
            .tokenizer
            .encode(sentence, false)
            .map_err(|e| anyhow::anyhow!("Cannot tokenize: {e}"))?;

        let limit = max_length
            .min(self.encoder.config().max_position_embeddings)
            .saturating_sub(2);
        let body = encoding.get_ids().len().min(limit);

        let mut ids = Vec::with_capacity(body + 2);
        let mut tokens = Vec::with_capacity(body + 2);
        ids.push(self.cls_id);
        tokens.push(CLS_TOKEN.to_string());
        ids.extend_from_slice(&encoding.get_ids()[..body]);
        tokens.extend_from_slice(&encoding.get_tokens()[..body]);
        ids.push(self.sep_id);
        tokens.push(SEP_TOKEN.to_string());
        Ok((ids, tokens))
    }
}

impl AttentionModel for BertAttentionModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn tokenize_and_attend(
        &self,
        sentence: &str,
        max_length: usize,
    ) -> std::result::Result<Attention, ModelError> {
        let (ids, tokens) = self
            .encode(sentence, max_length)
            .map_err(|e| ModelError::tokenize(format!("{e:#}")))?;

        let probs = self
            .encoder
            .attention(&ids)
            .map_err(|e| ModelError::inference(e.to_string()))?;
        let (layers, heads, seq_len, _) = probs
            .dims4()
            .map_err(|e| ModelError::inference(e.to_string()))?;
        let data = probs
            .flatten_all()
            .and_then(|t| t.to_vec1::<f32>())
            .map_err(|e| ModelError::inference(e.to_string()))?;

        Attention::new(tokens, AttentionTensor::new(layers, heads, seq_len, data)?)
    }
}

struct ModelFiles {
    config: PathBuf,
    tokenizer: PathBuf,
    weights: PathBuf,
}

/// Loads hub checkpoints by model id, optionally from a local directory first.
#[derive(Debug, Clone)]
pub struct HubModelLoader {
    device: Device,
    local_dir: Option<PathBuf>,
}

impl Default for HubModelLoader {
    fn default() -> Self {
        Self {
            device: Device::Cpu,
            local_dir: None,
        }
    }
}

impl HubModelLoader {
    pub fn new(device: Device) -> Self {
        Self {
            device,
            local_dir: None,
        }
    }

    /// Look for `<dir>/<model name>/` before going to the hub.
    pub fn with_local_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.local_dir = Some(dir.into());
        self
    }

    fn local_path(&self, model_name: &str) -> Option<PathBuf> {
        let dir = self.local_dir.as_ref()?.join(model_name);
        dir.join("config.json").exists().then_some(dir)
    }
}

impl ModelLoader for HubModelLoader {
    fn load(&self, model_name: &str) -> std::result::Result<Arc<dyn AttentionModel>, ModelError> {
        let loaded = match self.local_path(model_name) {
            Some(dir) => {
                info!(model = model_name, dir = %dir.display(), "Loading model from local directory");
                BertAttentionModel::from_dir(model_name, &dir, &self.device)
            }
            None => BertAttentionModel::from_hub(model_name, &self.device),
        };
        let model = loaded.map_err(|e| ModelError::load(model_name, format!("{e:#}")))?;
        Ok(Arc::new(model))
    }
}
