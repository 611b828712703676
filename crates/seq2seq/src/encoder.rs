//! Encoder layer and the embedding-plus-layers encoder stack.

use attention::MultiHeadAttention;
use candle_core::{Device, Tensor};
use embedding::{PositionalEncoding, TokenEmbedding, TokenEmbeddingConfig};
use layers::{
    Dropout, FeedForward, FeedForwardLayer, ForwardMode, NormalizationLayer, PostNormResidual,
    PrecisionPolicy,
};

use crate::{
    block::{build_attention, build_feed_forward, build_residual, expect_hidden, expect_match},
    config::TransformerConfig,
    error::ModelError,
};

/// Self-attention followed by a feed-forward block, each wrapped in a
/// post-norm residual.
#[derive(Debug)]
pub struct EncoderLayer {
    mha: MultiHeadAttention,
    ffn: FeedForward,
    attention_residual: PostNormResidual,
    ffn_residual: PostNormResidual,
    policy: PrecisionPolicy,
}

impl EncoderLayer {
    /// Assembles a layer from already-built parts.
    pub fn from_parts(
        mha: MultiHeadAttention,
        ffn: FeedForward,
        attention_residual: PostNormResidual,
        ffn_residual: PostNormResidual,
        policy: PrecisionPolicy,
    ) -> Result<Self, ModelError> {
        let d_model = mha.d_model();
        let widths = [
            ("feed-forward", ffn.config().hidden_size),
            ("attention residual", attention_residual.norm().config().hidden_size),
            ("feed-forward residual", ffn_residual.norm().config().hidden_size),
        ];
        for (name, width) in widths {
            if width != d_model {
                return Err(ModelError::InvalidInput(format!(
                    "encoder {name} width {width} does not match d_model {d_model}"
                )));
            }
        }
        Ok(Self {
            mha,
            ffn,
            attention_residual,
            ffn_residual,
            policy,
        })
    }

    pub fn with_init(config: &TransformerConfig, device: &Device) -> Result<Self, ModelError> {
        Self::from_parts(
            build_attention(config, device)?,
            build_feed_forward(config, device)?,
            build_residual(config, device)?,
            build_residual(config, device)?,
            PrecisionPolicy::from_parameter_dtype(config.dtype()),
        )
    }

    pub fn d_model(&self) -> usize {
        self.mha.d_model()
    }

    pub fn num_parameters(&self) -> usize {
        self.mha.num_parameters()
            + self.ffn.num_parameters()
            + self.attention_residual.num_parameters()
            + self.ffn_residual.num_parameters()
    }

    /// Maps `(batch, seq, d_model)` to a tensor of the same shape.
    pub fn forward(
        &self,
        hidden: &Tensor,
        mode: ForwardMode,
        mask: Option<&Tensor>,
    ) -> Result<Tensor, ModelError> {
        expect_hidden("encoder_layer.input", hidden, self.mha.d_model())?;

        let attended = self.mha.forward(hidden, hidden, hidden, mask, &self.policy)?;
        let out1 = self
            .attention_residual
            .forward(&attended.output, hidden, mode, &self.policy)?;

        let ffn_out = self.ffn.forward(&out1, &self.policy)?;
        let out2 = self
            .ffn_residual
            .forward(&ffn_out, &out1, mode, &self.policy)?;
        Ok(out2)
    }
}

/// Token embedding, positional encoding and `num_layers` encoder layers.
#[derive(Debug)]
pub struct Encoder {
    d_model: usize,
    embedding: TokenEmbedding,
    positional: PositionalEncoding,
    dropout: Dropout,
    layers: Vec<EncoderLayer>,
    policy: PrecisionPolicy,
}

impl Encoder {
    /// Samples a fresh encoder. Cross-field checks are left to
    /// [`TransformerConfig::validate`]; each part still rejects bad sizes.
    pub fn new(config: &TransformerConfig, device: &Device) -> Result<Self, ModelError> {
        let dtype = config.dtype();
        let embedding = TokenEmbedding::new(TokenEmbeddingConfig {
            vocab_size: config.input_vocab_size,
            hidden_dim: config.d_model,
            dtype,
            device: device.clone(),
        })?;
        let positional =
            PositionalEncoding::with_dtype(config.max_position_input, config.d_model, dtype, device)?;

        let mut layers = Vec::with_capacity(config.num_layers);
        for _ in 0..config.num_layers {
            layers.push(EncoderLayer::with_init(config, device)?);
        }

        Self::from_parts(embedding, positional, layers, Dropout::new(config.dropout_rate)?)
    }

    /// Assembles an encoder from explicit parts, e.g. externally trained weights.
    ///
    /// The storage dtype of the embedding table sets the precision policy.
    pub fn from_parts(
        embedding: TokenEmbedding,
        positional: PositionalEncoding,
        layers: Vec<EncoderLayer>,
        dropout: Dropout,
    ) -> Result<Self, ModelError> {
        let d_model = embedding.config().hidden_dim;
        expect_match("encoder positional width", positional.d_model(), d_model)?;
        for (idx, layer) in layers.iter().enumerate() {
            expect_match(&format!("encoder layer {} width", idx + 1), layer.d_model(), d_model)?;
        }
        let policy = PrecisionPolicy::from_parameter_dtype(embedding.config().dtype);
        Ok(Self {
            d_model,
            embedding,
            positional,
            dropout,
            layers,
            policy,
        })
    }

    pub fn d_model(&self) -> usize {
        self.d_model
    }

    pub fn embedding(&self) -> &TokenEmbedding {
        &self.embedding
    }

    pub fn positional(&self) -> &PositionalEncoding {
        &self.positional
    }

    pub fn layers(&self) -> &[EncoderLayer] {
        &self.layers
    }

    pub fn num_parameters(&self) -> usize {
        self.embedding.num_parameters()
            + self
                .layers
                .iter()
                .map(EncoderLayer::num_parameters)
                .sum::<usize>()
    }

    /// Encodes `(batch, inp_len)` token ids into `(batch, inp_len, d_model)`.
    pub fn forward(
        &self,
        input_ids: &Tensor,
        mode: ForwardMode,
        mask: Option<&Tensor>,
    ) -> Result<Tensor, ModelError> {
        let hidden = embed(
            &self.embedding,
            &self.positional,
            &self.dropout,
            self.d_model,
            input_ids,
            mode,
            &self.policy,
        )?;
        log::debug!(
            "encoder forward shape={:?} layers={} mode={:?}",
            hidden.dims(),
            self.layers.len(),
            mode
        );

        let mut hidden = hidden;
        for layer in &self.layers {
            hidden = layer.forward(&hidden, mode, mask)?;
        }
        Ok(hidden)
    }
}

/// Lookup, scale by `sqrt(d_model)`, add positions, then dropout.
pub(crate) fn embed(
    embedding: &TokenEmbedding,
    positional: &PositionalEncoding,
    dropout: &Dropout,
    d_model: usize,
    token_ids: &Tensor,
    mode: ForwardMode,
    policy: &PrecisionPolicy,
) -> Result<Tensor, ModelError> {
    let (_, seq_len) = token_ids.dims2()?;
    if seq_len > positional.max_positions() {
        return Err(ModelError::InvalidInput(format!(
            "sequence length {seq_len} exceeds the positional table size {}",
            positional.max_positions()
        )));
    }
    let scaled = embedding
        .forward(token_ids)?
        .affine((d_model as f64).sqrt(), 0.0)?;
    let hidden = positional.add_to(&scaled)?;
    Ok(dropout.forward(&hidden, mode, policy)?)
}
