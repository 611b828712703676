//! Per-layer attention weights collected by the decoder stack.

use std::fmt;

use candle_core::Tensor;

/// Which of a decoder layer's two attention sub-blocks produced a tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AttentionBlock {
    /// Masked self-attention over the target sequence.
    SelfAttention,
    /// Attention from the target sequence over the encoder output.
    CrossAttention,
}

impl AttentionBlock {
    /// 1-based position of the block inside its layer.
    pub fn ordinal(self) -> usize {
        match self {
            AttentionBlock::SelfAttention => 1,
            AttentionBlock::CrossAttention => 2,
        }
    }
}

/// Identifies one weight tensor: zero-based decoder layer plus block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AttentionKey {
    pub layer: usize,
    pub block: AttentionBlock,
}

impl AttentionKey {
    pub fn new(layer: usize, block: AttentionBlock) -> Self {
        Self { layer, block }
    }
}

impl fmt::Display for AttentionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "decoder_layer{}_block{}",
            self.layer + 1,
            self.block.ordinal()
        )
    }
}

/// Ordered `(key, weights)` pairs; each tensor is `(batch, heads, tar_len, k_len)`.
///
/// Entries appear in layer order with the self-attention block before the
/// cross-attention block of the same layer.
#[derive(Debug, Clone, Default)]
pub struct AttentionWeights {
    entries: Vec<(AttentionKey, Tensor)>,
}

impl AttentionWeights {
    pub fn with_capacity(layers: usize) -> Self {
        Self {
            entries: Vec::with_capacity(layers * 2),
        }
    }

    pub(crate) fn push(&mut self, key: AttentionKey, weights: Tensor) {
        self.entries.push((key, weights));
    }

    pub fn get(&self, key: &AttentionKey) -> Option<&Tensor> {
        self.entries
            .iter()
            .find(|(candidate, _)| candidate == key)
            .map(|(_, weights)| weights)
    }

    /// Looks up an entry by its rendered name, e.g. `decoder_layer1_block2`.
    pub fn get_by_label(&self, label: &str) -> Option<&Tensor> {
        self.entries
            .iter()
            .find(|(key, _)| key.to_string() == label)
            .map(|(_, weights)| weights)
    }

    pub fn keys(&self) -> impl Iterator<Item = &AttentionKey> {
        self.entries.iter().map(|(key, _)| key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&AttentionKey, &Tensor)> {
        self.entries.iter().map(|(key, weights)| (key, weights))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn into_inner(self) -> Vec<(AttentionKey, Tensor)> {
        self.entries
    }
}

impl IntoIterator for AttentionWeights {
    type Item = (AttentionKey, Tensor);
    type IntoIter = std::vec::IntoIter<(AttentionKey, Tensor)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}
