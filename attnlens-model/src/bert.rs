//! BERT encoder forward pass with per-layer attention capture.
//!
//! Only the pieces needed to reproduce the post-softmax attention
//! probabilities are built: embeddings and the encoder stack. The pooler and
//! the pretraining heads present in hub checkpoints are ignored.

use candle_core::{DType, Device, Module, Result, Tensor};
use candle_nn::ops::softmax_last_dim;
use candle_nn::{Embedding, LayerNorm, Linear, VarBuilder, embedding, linear};
use serde::Deserialize;

/// Encoder configuration (matches HuggingFace `config.json`).
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BertConfig {
    pub vocab_size: usize,
    pub hidden_size: usize,
    pub num_hidden_layers: usize,
    pub num_attention_heads: usize,
    pub intermediate_size: usize,
    #[serde(default = "default_max_position_embeddings")]
    pub max_position_embeddings: usize,
    #[serde(default = "default_type_vocab_size")]
    pub type_vocab_size: usize,
    #[serde(default = "default_layer_norm_eps")]
    pub layer_norm_eps: f64,
}

fn default_max_position_embeddings() -> usize {
    512
}
fn default_type_vocab_size() -> usize {
    2
}
fn default_layer_norm_eps() -> f64 {
    1e-12
}

impl BertConfig {
    pub fn head_dim(&self) -> usize {
        self.hidden_size / self.num_attention_heads
    }
}

// Older checkpoints name layer norm parameters gamma/beta.
fn load_layer_norm(size: usize, eps: f64, vb: VarBuilder) -> Result<LayerNorm> {
    let (weight, bias) = if vb.contains_tensor("weight") {
        (vb.get(size, "weight")?, vb.get(size, "bias")?)
    } else {
        (vb.get(size, "gamma")?, vb.get(size, "beta")?)
    };
    Ok(LayerNorm::new(weight, bias, eps))
}

struct Embeddings {
    word: Embedding,
    position: Embedding,
    token_type: Embedding,
    norm: LayerNorm,
}

impl Embeddings {
    fn load(vb: VarBuilder, config: &BertConfig) -> Result<Self> {
        Ok(Self {
            word: embedding(config.vocab_size, config.hidden_size, vb.pp("word_embeddings"))?,
            position: embedding(
                config.max_position_embeddings,
                config.hidden_size,
                vb.pp("position_embeddings"),
            )?,
            token_type: embedding(
                config.type_vocab_size,
                config.hidden_size,
                vb.pp("token_type_embeddings"),
            )?,
            norm: load_layer_norm(config.hidden_size, config.layer_norm_eps, vb.pp("LayerNorm"))?,
        })
    }

    /// `input_ids`: `[batch, seq]` u32 → `[batch, seq, hidden]`.
    fn forward(&self, input_ids: &Tensor) -> Result<Tensor> {
        let (_, seq_len) = input_ids.dims2()?;
        let positions = Tensor::arange(0u32, seq_len as u32, input_ids.device())?.unsqueeze(0)?;
        let token_types = input_ids.zeros_like()?;

        let words = self.word.forward(input_ids)?;
        let positions = self.position.forward(&positions)?;
        let types = self.token_type.forward(&token_types)?;
        let summed = words.broadcast_add(&positions)?.add(&types)?;
        self.norm.forward(&summed)
    }
}

struct SelfAttention {
    query: Linear,
    key: Linear,
    value: Linear,
    num_heads: usize,
    head_dim: usize,
    scale: f64,
}

impl SelfAttention {
    fn load(vb: VarBuilder, config: &BertConfig) -> Result<Self> {
        let hidden = config.hidden_size;
        let head_dim = config.head_dim();
        Ok(Self {
            query: linear(hidden, hidden, vb.pp("query"))?,
            key: linear(hidden, hidden, vb.pp("key"))?,
            value: linear(hidden, hidden, vb.pp("value"))?,
            num_heads: config.num_attention_heads,
            head_dim,
            scale: (head_dim as f64).sqrt(),
        })
    }

    /// Returns the context vectors and the `[batch, heads, seq, seq]` probabilities.
    fn forward(&self, hidden: &Tensor) -> Result<(Tensor, Tensor)> {
        let (batch, seq_len, _) = hidden.dims3()?;
        let split_heads = |t: Tensor| -> Result<Tensor> {
            t.reshape((batch, seq_len, self.num_heads, self.head_dim))?
                .transpose(1, 2)?
                .contiguous()
        };

        let q = split_heads(self.query.forward(hidden)?)?;
        let k = split_heads(self.key.forward(hidden)?)?;
        let v = split_heads(self.value.forward(hidden)?)?;

        let scores = (q.matmul(&k.t()?)? / self.scale)?;
        let probs = softmax_last_dim(&scores)?;

        let context = probs
            .matmul(&v)?
            .transpose(1, 2)?
            .reshape((batch, seq_len, self.num_heads * self.head_dim))?;
        Ok((context, probs))
    }
}

struct EncoderLayer {
    attention: SelfAttention,
    attention_out: Linear,
    attention_norm: LayerNorm,
    intermediate: Linear,
    output: Linear,
    output_norm: LayerNorm,
}

impl EncoderLayer {
    fn load(vb: VarBuilder, config: &BertConfig) -> Result<Self> {
        let hidden = config.hidden_size;
        let eps = config.layer_norm_eps;
        let attn = vb.pp("attention");
        Ok(Self {
            attention: SelfAttention::load(attn.pp("self"), config)?,
            attention_out: linear(hidden, hidden, attn.pp("output").pp("dense"))?,
            attention_norm: load_layer_norm(hidden, eps, attn.pp("output").pp("LayerNorm"))?,
            intermediate: linear(
                hidden,
                config.intermediate_size,
                vb.pp("intermediate").pp("dense"),
            )?,
            output: linear(config.intermediate_size, hidden, vb.pp("output").pp("dense"))?,
            output_norm: load_layer_norm(hidden, eps, vb.pp("output").pp("LayerNorm"))?,
        })
    }

    fn forward(&self, hidden: &Tensor) -> Result<(Tensor, Tensor)> {
        let (context, probs) = self.attention.forward(hidden)?;
        let attended = self
            .attention_norm
            .forward(&(self.attention_out.forward(&context)? + hidden)?)?;

        let inner = self.intermediate.forward(&attended)?.gelu_erf()?;
        let out = self
            .output_norm
            .forward(&(self.output.forward(&inner)? + &attended)?)?;
        Ok((out, probs))
    }
}

/// Embeddings plus the encoder stack of a BERT checkpoint.
pub struct BertEncoder {
    embeddings: Embeddings,
    layers: Vec<EncoderLayer>,
    config: BertConfig,
    device: Device,
}

impl std::fmt::Debug for BertEncoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BertEncoder")
            .field("config", &self.config)
            .field("device", &self.device)
            .finish()
    }
}

impl BertEncoder {
    /// Build the encoder from a var builder rooted at the checkpoint.
    ///
    /// Checkpoints saved with a task head nest the encoder under `bert.`.
    pub fn load(vb: VarBuilder, config: &BertConfig) -> Result<Self> {
        let vb = if vb.contains_tensor("embeddings.word_embeddings.weight") {
            vb
        } else {
            vb.pp("bert")
        };

        let embeddings = Embeddings::load(vb.pp("embeddings"), config)?;
        let encoder = vb.pp("encoder").pp("layer");
        let layers = (0..config.num_hidden_layers)
            .map(|i| EncoderLayer::load(encoder.pp(i.to_string()), config))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            embeddings,
            layers,
            config: config.clone(),
            device: vb.device().clone(),
        })
    }

    pub fn config(&self) -> &BertConfig {
        &self.config
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Run the encoder over one sequence of token ids.
    ///
    /// Returns the attention probabilities stacked as
    /// `[layers, heads, seq, seq]` in f32.
    pub fn attention(&self, input_ids: &[u32]) -> Result<Tensor> {
        let ids = Tensor::new(input_ids, &self.device)?.unsqueeze(0)?;
        let mut hidden = self.embeddings.forward(&ids)?;

        let mut per_layer = Vec::with_capacity(self.layers.len());
        for layer in &self.layers {
            let (next, probs) = layer.forward(&hidden)?;
            per_layer.push(probs.squeeze(0)?);
            hidden = next;
        }

        Tensor::stack(&per_layer, 0)?.to_dtype(DType::F32)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use candle_core::D;
    use std::collections::HashMap;

    pub(crate) fn tiny_config() -> BertConfig {
        BertConfig {
            vocab_size: 32,
            hidden_size: 8,
            num_hidden_layers: 2,
            num_attention_heads: 2,
            intermediate_size: 16,
            max_position_embeddings: 64,
            type_vocab_size: 2,
            layer_norm_eps: 1e-12,
        }
    }

    fn norm_tensors(
        map: &mut HashMap<String, Tensor>,
        prefix: &str,
        size: usize,
        legacy: bool,
    ) -> Result<()> {
        let (w, b) = if legacy {
            ("gamma", "beta")
        } else {
            ("weight", "bias")
        };
        map.insert(
            format!("{prefix}.{w}"),
            Tensor::ones(size, DType::F32, &Device::Cpu)?,
        );
        map.insert(
            format!("{prefix}.{b}"),
            Tensor::zeros(size, DType::F32, &Device::Cpu)?,
        );
        Ok(())
    }

    fn linear_tensors(
        map: &mut HashMap<String, Tensor>,
        prefix: &str,
        input: usize,
        output: usize,
    ) -> Result<()> {
        let dev = Device::Cpu;
        map.insert(
            format!("{prefix}.weight"),
            Tensor::randn(0f32, 0.5, (output, input), &dev)?,
        );
        map.insert(
            format!("{prefix}.bias"),
            Tensor::zeros(output, DType::F32, &dev)?,
        );
        Ok(())
    }

    /// Randomly initialized weights for `config`, keyed under `root`.
    pub(crate) fn random_weights(
        config: &BertConfig,
        root: &str,
        legacy_norm: bool,
    ) -> Result<HashMap<String, Tensor>> {
        let dev = Device::Cpu;
        let h = config.hidden_size;
        let mut map = HashMap::new();
        let emb = format!("{root}embeddings");
        map.insert(
            format!("{emb}.word_embeddings.weight"),
            Tensor::randn(0f32, 1.0, (config.vocab_size, h), &dev)?,
        );
        map.insert(
            format!("{emb}.position_embeddings.weight"),
            Tensor::randn(0f32, 1.0, (config.max_position_embeddings, h), &dev)?,
        );
        map.insert(
            format!("{emb}.token_type_embeddings.weight"),
            Tensor::randn(0f32, 1.0, (config.type_vocab_size, h), &dev)?,
        );
        norm_tensors(&mut map, &format!("{emb}.LayerNorm"), h, legacy_norm)?;

        for i in 0..config.num_hidden_layers {
            let p = format!("{root}encoder.layer.{i}");
            for name in ["query", "key", "value"] {
                linear_tensors(&mut map, &format!("{p}.attention.self.{name}"), h, h)?;
            }
            linear_tensors(&mut map, &format!("{p}.attention.output.dense"), h, h)?;
            norm_tensors(
                &mut map,
                &format!("{p}.attention.output.LayerNorm"),
                h,
                legacy_norm,
            )?;
            linear_tensors(
                &mut map,
                &format!("{p}.intermediate.dense"),
                h,
                config.intermediate_size,
            )?;
            linear_tensors(
                &mut map,
                &format!("{p}.output.dense"),
                config.intermediate_size,
                h,
            )?;
            norm_tensors(&mut map, &format!("{p}.output.LayerNorm"), h, legacy_norm)?;
        }
        Ok(map)
    }

    pub(crate) fn tiny_encoder() -> BertEncoder {
        let config = tiny_config();
        let weights = random_weights(&config, "", false).unwrap();
        let vb = VarBuilder::from_tensors(weights, DType::F32, &Device::Cpu);
        BertEncoder::load(vb, &config).unwrap()
    }

    #[test]
    fn test_config_parses_hub_json() {
        let json = r#"{
            "architectures": ["BertForMaskedLM"],
            "hidden_act": "gelu",
            "hidden_size": 768,
            "intermediate_size": 3072,
            "max_position_embeddings": 512,
            "num_attention_heads": 12,
            "num_hidden_layers": 12,
            "type_vocab_size": 2,
            "vocab_size": 30522
        }"#;
        let config: BertConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.num_hidden_layers, 12);
        assert_eq!(config.head_dim(), 64);
        assert_eq!(config.layer_norm_eps, 1e-12);
    }

    #[test]
    fn test_attention_shape() {
        let encoder = tiny_encoder();
        let probs = encoder.attention(&[1, 5, 7, 9, 2]).unwrap();
        assert_eq!(probs.dims(), &[2, 2, 5, 5]);
    }

    #[test]
    fn test_attention_rows_sum_to_one() {
        let encoder = tiny_encoder();
        let probs = encoder.attention(&[1, 3, 4, 2]).unwrap();
        let sums: Vec<f32> = probs
            .sum(D::Minus1)
            .unwrap()
            .flatten_all()
            .unwrap()
            .to_vec1()
            .unwrap();
        assert_eq!(sums.len(), 2 * 2 * 4);
        for s in sums {
            assert!((s - 1.0).abs() < 1e-4, "row sum {s}");
        }
    }

    #[test]
    fn test_loads_prefixed_legacy_checkpoint() {
        let config = tiny_config();
        let weights = random_weights(&config, "bert.", true).unwrap();
        let vb = VarBuilder::from_tensors(weights, DType::F32, &Device::Cpu);
        let encoder = BertEncoder::load(vb, &config).unwrap();
        let probs = encoder.attention(&[1, 2]).unwrap();
        assert_eq!(probs.dims(), &[2, 2, 2, 2]);
    }

    #[test]
    fn test_missing_weights_fail_to_load() {
        let config = tiny_config();
        let mut weights = random_weights(&config, "", false).unwrap();
        weights.remove("encoder.layer.1.attention.self.key.weight");
        let vb = VarBuilder::from_tensors(weights, DType::F32, &Device::Cpu);
        assert!(BertEncoder::load(vb, &config).is_err());
    }
}
