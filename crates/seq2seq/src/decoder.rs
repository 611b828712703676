//! Decoder layer and the decoder stack that gathers attention weights.

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
    encoder::embed,
    error::ModelError,
    weights::{AttentionBlock, AttentionKey, AttentionWeights},
};

/// Result of one decoder layer.
#[derive(Debug, Clone)]
pub struct DecoderLayerOutput {
    /// `(batch, tar_len, d_model)`.
    pub hidden: Tensor,
    /// Masked self-attention weights, `(batch, heads, tar_len, tar_len)`.
    pub self_attention: Tensor,
    /// Cross-attention weights, `(batch, heads, tar_len, inp_len)`.
    pub cross_attention: Tensor,
}

/// Masked self-attention, cross-attention over the encoder output and a
/// feed-forward block, each followed by a post-norm residual.
#[derive(Debug)]
pub struct DecoderLayer {
    self_attention: MultiHeadAttention,
    cross_attention: MultiHeadAttention,
    ffn: FeedForward,
    residuals: [PostNormResidual; 3],
    policy: PrecisionPolicy,
}

impl DecoderLayer {
    pub fn from_parts(
        self_attention: MultiHeadAttention,
        cross_attention: MultiHeadAttention,
        ffn: FeedForward,
        residuals: [PostNormResidual; 3],
        policy: PrecisionPolicy,
    ) -> Result<Self, ModelError> {
        let d_model = self_attention.d_model();
        if cross_attention.d_model() != d_model {
            return Err(ModelError::InvalidInput(format!(
                "decoder cross-attention width {} does not match d_model {d_model}",
                cross_attention.d_model()
            )));
        }
        if ffn.config().hidden_size != d_model {
            return Err(ModelError::InvalidInput(format!(
                "decoder feed-forward width {} does not match d_model {d_model}",
                ffn.config().hidden_size
            )));
        }
        if let Some(residual) = residuals
            .iter()
            .find(|residual| residual.norm().config().hidden_size != d_model)
        {
            return Err(ModelError::InvalidInput(format!(
                "decoder residual width {} does not match d_model {d_model}",
                residual.norm().config().hidden_size
            )));
        }
        Ok(Self {
            self_attention,
            cross_attention,
            ffn,
            residuals,
            policy,
        })
    }

    pub fn with_init(config: &TransformerConfig, device: &Device) -> Result<Self, ModelError> {
        Self::from_parts(
            build_attention(config, device)?,
            build_attention(config, device)?,
            build_feed_forward(config, device)?,
            [
                build_residual(config, device)?,
                build_residual(config, device)?,
                build_residual(config, device)?,
            ],
            PrecisionPolicy::from_parameter_dtype(config.dtype()),
        )
    }

    pub fn d_model(&self) -> usize {
        self.self_attention.d_model()
    }

    pub fn num_parameters(&self) -> usize {
        self.self_attention.num_parameters()
            + self.cross_attention.num_parameters()
            + self.ffn.num_parameters()
            + self
                .residuals
                .iter()
                .map(PostNormResidual::num_parameters)
                .sum::<usize>()
    }

    /// Decodes `hidden` (`(batch, tar_len, d_model)`) against `enc_output`
    /// (`(batch, inp_len, d_model)`).
    pub fn forward(
        &self,
        hidden: &Tensor,
        enc_output: &Tensor,
        mode: ForwardMode,
        look_ahead_mask: Option<&Tensor>,
        padding_mask: Option<&Tensor>,
    ) -> Result<DecoderLayerOutput, ModelError> {
        let d_model = self.self_attention.d_model();
        expect_hidden("decoder_layer.input", hidden, d_model)?;
        expect_hidden("decoder_layer.enc_output", enc_output, d_model)?;
        let [first, second, third] = &self.residuals;

        let block1 = self
            .self_attention
            .forward(hidden, hidden, hidden, look_ahead_mask, &self.policy)?;
        let out1 = first.forward(&block1.output, hidden, mode, &self.policy)?;

        let block2 = self.cross_attention.forward(
            &out1,
            enc_output,
            enc_output,
            padding_mask,
            &self.policy,
        )?;
        let out2 = second.forward(&block2.output, &out1, mode, &self.policy)?;

        let ffn_out = self.ffn.forward(&out2, &self.policy)?;
        let out3 = third.forward(&ffn_out, &out2, mode, &self.policy)?;

        Ok(DecoderLayerOutput {
            hidden: out3,
            self_attention: block1.weights,
            cross_attention: block2.weights,
        })
    }
}

/// Token embedding, positional encoding and `num_layers` decoder layers.
#[derive(Debug)]
pub struct Decoder {
    d_model: usize,
    embedding: TokenEmbedding,
    positional: PositionalEncoding,
    dropout: Dropout,
    layers: Vec<DecoderLayer>,
    policy: PrecisionPolicy,
}

impl Decoder {
    /// Samples a fresh decoder. Like [`Encoder::new`](crate::Encoder::new), it
    /// leaves cross-field checks to [`TransformerConfig::validate`].
    pub fn new(config: &TransformerConfig, device: &Device) -> Result<Self, ModelError> {
        let dtype = config.dtype();
        let embedding = TokenEmbedding::new(TokenEmbeddingConfig {
            vocab_size: config.target_vocab_size,
            hidden_dim: config.d_model,
            dtype,
            device: device.clone(),
        })?;
        let positional = PositionalEncoding::with_dtype(
            config.max_position_target,
            config.d_model,
            dtype,
            device,
        )?;

        let mut layers = Vec::with_capacity(config.num_layers);
        for _ in 0..config.num_layers {
            layers.push(DecoderLayer::with_init(config, device)?);
        }

        Self::from_parts(embedding, positional, layers, Dropout::new(config.dropout_rate)?)
    }

    /// Assembles a decoder from explicit parts. The embedding dtype sets the
    /// precision policy.
    pub fn from_parts(
        embedding: TokenEmbedding,
        positional: PositionalEncoding,
        layers: Vec<DecoderLayer>,
        dropout: Dropout,
    ) -> Result<Self, ModelError> {
        let d_model = embedding.config().hidden_dim;
        expect_match("decoder positional width", positional.d_model(), d_model)?;
        for (idx, layer) in layers.iter().enumerate() {
            expect_match(&format!("decoder layer {} width", idx + 1), layer.d_model(), d_model)?;
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

    pub fn layers(&self) -> &[DecoderLayer] {
        &self.layers
    }

    pub fn num_parameters(&self) -> usize {
        self.embedding.num_parameters()
            + self
                .layers
                .iter()
                .map(DecoderLayer::num_parameters)
                .sum::<usize>()
    }

    /// Decodes `(batch, tar_len)` target ids against the encoder output.
    ///
    /// Returns the final hidden states and, per layer, the self-attention
    /// (`block1`) and cross-attention (`block2`) weights.
    pub fn forward(
        &self,
        target_ids: &Tensor,
        enc_output: &Tensor,
        mode: ForwardMode,
        look_ahead_mask: Option<&Tensor>,
        padding_mask: Option<&Tensor>,
    ) -> Result<(Tensor, AttentionWeights), ModelError> {
        let mut hidden = embed(
            &self.embedding,
            &self.positional,
            &self.dropout,
            self.d_model,
            target_ids,
            mode,
            &self.policy,
        )?;
        log::debug!(
            "decoder forward shape={:?} enc_output={:?} layers={} mode={:?}",
            hidden.dims(),
            enc_output.dims(),
            self.layers.len(),
            mode
        );

        let mut weights = AttentionWeights::with_capacity(self.layers.len());
        for (index, layer) in self.layers.iter().enumerate() {
            let out = layer.forward(&hidden, enc_output, mode, look_ahead_mask, padding_mask)?;
            weights.push(
                AttentionKey::new(index, AttentionBlock::SelfAttention),
                out.self_attention,
            );
            weights.push(
                AttentionKey::new(index, AttentionBlock::CrossAttention),
                out.cross_attention,
            );
            hidden = out.hidden;
        }
        Ok((hidden, weights))
    }
}
