//! Attention tensor produced by one forward pass.

use serde::{Deserialize, Serialize};

use crate::error::{ModelError, ViewError};

/// Per-layer, per-head attention for a single sentence.
///
/// Values are stored flat in `[layer][head][query][key]` order. The batch
/// axis of the upstream model is dropped since the viewer always runs a
/// batch of one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawTensor")]
pub struct AttentionTensor {
    layers: usize,
    heads: usize,
    seq_len: usize,
    data: Vec<f32>,
}

impl AttentionTensor {
    /// Wrap a flat buffer, checking that it matches the declared shape.
    pub fn new(
        layers: usize,
        heads: usize,
        seq_len: usize,
        data: Vec<f32>,
    ) -> Result<Self, ModelError> {
        let expected = layers * heads * seq_len * seq_len;
        if data.len() != expected {
            return Err(ModelError::TensorShape {
                shape: [layers, heads, seq_len, seq_len],
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            layers,
            heads,
            seq_len,
            data,
        })
    }

    /// Build from nested `[layer][head][query][key]` vectors.
    ///
    /// Every layer must hold the same number of heads and every head must be
    /// square with the side length of the first one.
    pub fn from_nested(nested: Vec<Vec<Vec<Vec<f32>>>>) -> Result<Self, ModelError> {
        let layers = nested.len();
        let heads = nested.first().map(Vec::len).unwrap_or(0);
        let seq_len = nested
            .first()
            .and_then(|l| l.first())
            .map(Vec::len)
            .unwrap_or(0);

        for (l, layer) in nested.iter().enumerate() {
            check_extent(|| format!("layer {l}"), heads, layer.len())?;
            for (h, head) in layer.iter().enumerate() {
                check_extent(|| format!("layer {l} head {h}"), seq_len, head.len())?;
                for (q, row) in head.iter().enumerate() {
                    check_extent(|| format!("layer {l} head {h} row {q}"), seq_len, row.len())?;
                }
            }
        }

        let data: Vec<f32> = nested.into_iter().flatten().flatten().flatten().collect();
        Self::new(layers, heads, seq_len, data)
    }

    pub fn num_layers(&self) -> usize {
        self.layers
    }

    pub fn num_heads(&self) -> usize {
        self.heads
    }

    pub fn seq_len(&self) -> usize {
        self.seq_len
    }

    /// The N×N matrix for one (layer, head) pair, rows indexed by query.
    pub fn head(&self, layer: usize, head: usize) -> Result<Vec<Vec<f32>>, ViewError> {
        let start = self.head_offset(layer, head)?;
        let n = self.seq_len;
        Ok((0..n)
            .map(|q| self.data[start + q * n..start + (q + 1) * n].to_vec())
            .collect())
    }

    /// Attention from one query position to every key position.
    pub fn row(&self, layer: usize, head: usize, query: usize) -> Result<Vec<f32>, ViewError> {
        let start = self.head_offset(layer, head)?;
        check_index("token", query, self.seq_len)?;
        let n = self.seq_len;
        Ok(self.data[start + query * n..start + (query + 1) * n].to_vec())
    }

    fn head_offset(&self, layer: usize, head: usize) -> Result<usize, ViewError> {
        check_index("layer", layer, self.layers)?;
        check_index("head", head, self.heads)?;
        let block = self.seq_len * self.seq_len;
        Ok((layer * self.heads + head) * block)
    }
}

fn check_extent(
    at: impl FnOnce() -> String,
    expected: usize,
    actual: usize,
) -> Result<(), ModelError> {
    if actual != expected {
        return Err(ModelError::Ragged {
            at: at(),
            expected,
            actual,
        });
    }
    Ok(())
}

#[derive(Deserialize)]
struct RawTensor {
    layers: usize,
    heads: usize,
    seq_len: usize,
    data: Vec<f32>,
}

impl TryFrom<RawTensor> for AttentionTensor {
    type Error = ModelError;

    fn try_from(raw: RawTensor) -> Result<Self, Self::Error> {
        Self::new(raw.layers, raw.heads, raw.seq_len, raw.data)
    }
}

fn check_index(axis: &'static str, index: usize, bound: usize) -> Result<(), ViewError> {
    if index >= bound {
        return Err(ViewError::SelectionOutOfRange { axis, index, bound });
    }
    Ok(())
}

/// Tokens and the attention computed over them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawAttention")]
pub struct Attention {
    tokens: Vec<String>,
    tensor: AttentionTensor,
}

impl Attention {
    /// Pair tokens with a tensor whose query and key axes match the token count.
    pub fn new(tokens: Vec<String>, tensor: AttentionTensor) -> Result<Self, ModelError> {
        if tensor.seq_len() != tokens.len() {
            return Err(ModelError::TokenCount {
                seq_len: tensor.seq_len(),
                tokens: tokens.len(),
            });
        }
        Ok(Self { tokens, tensor })
    }

    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    pub fn tensor(&self) -> &AttentionTensor {
        &self.tensor
    }
}

#[derive(Deserialize)]
struct RawAttention {
    tokens: Vec<String>,
    tensor: AttentionTensor,
}

impl TryFrom<RawAttention> for Attention {
    type Error = ModelError;

    fn try_from(raw: RawAttention) -> Result<Self, Self::Error> {
        Self::new(raw.tokens, raw.tensor)
    }
}
