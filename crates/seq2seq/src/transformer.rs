//! Full encoder-decoder model producing per-position target distributions.

use attention::masks::TransformerMasks;
use candle_core::{Device, Tensor};
use candle_nn::ops::softmax_last_dim;
use layers::{ForwardMode, Linear, LinearConfig, LinearInit, LinearLayer, PrecisionPolicy};

use crate::{
    block::expect_match, config::TransformerConfig, decoder::Decoder, encoder::Encoder,
    error::ModelError, weights::AttentionWeights,
};

/// Output of a full forward pass.
#[derive(Debug, Clone)]
pub struct TransformerOutput {
    /// `(batch, tar_len, target_vocab_size)`; each position sums to one.
    pub logits: Tensor,
    pub attention_weights: AttentionWeights,
}

#[derive(Debug)]
pub struct Transformer {
    config: TransformerConfig,
    encoder: Encoder,
    decoder: Decoder,
    final_layer: Linear,
    policy: PrecisionPolicy,
}

impl Transformer {
    /// Validates `config` and samples every parameter on `device`.
    pub fn new(config: &TransformerConfig, device: &Device) -> Result<Self, ModelError> {
        config.validate()?;
        let encoder = Encoder::new(config, device)?;
        let decoder = Decoder::new(config, device)?;
        let final_layer = Linear::with_init(
            LinearConfig::new(config.d_model, config.target_vocab_size),
            &LinearInit::XavierUniform,
            device,
            config.dtype(),
        )?;
        Self::assemble(config.clone(), encoder, decoder, final_layer)
    }

    /// Wraps explicitly built parts, e.g. weights loaded from a checkpoint.
    ///
    /// `config` is validated and every part must agree with it on widths,
    /// vocabulary sizes, position limits and layer counts.
    pub fn from_parts(
        config: TransformerConfig,
        encoder: Encoder,
        decoder: Decoder,
        final_layer: Linear,
    ) -> Result<Self, ModelError> {
        config.validate()?;
        Self::assemble(config, encoder, decoder, final_layer)
    }

    fn assemble(
        config: TransformerConfig,
        encoder: Encoder,
        decoder: Decoder,
        final_layer: Linear,
    ) -> Result<Self, ModelError> {
        let d_model = config.d_model;
        expect_match("encoder width", encoder.d_model(), d_model)?;
        expect_match("decoder width", decoder.d_model(), d_model)?;
        expect_match("encoder layer count", encoder.layers().len(), config.num_layers)?;
        expect_match("decoder layer count", decoder.layers().len(), config.num_layers)?;
        expect_match(
            "encoder vocabulary",
            encoder.embedding().config().vocab_size,
            config.input_vocab_size,
        )?;
        expect_match(
            "decoder vocabulary",
            decoder.embedding().config().vocab_size,
            config.target_vocab_size,
        )?;
        expect_match(
            "encoder positions",
            encoder.positional().max_positions(),
            config.max_position_input,
        )?;
        expect_match(
            "decoder positions",
            decoder.positional().max_positions(),
            config.max_position_target,
        )?;
        expect_match("final layer input", final_layer.config().input_dim, d_model)?;
        expect_match(
            "final layer output",
            final_layer.config().output_dim,
            config.target_vocab_size,
        )?;

        let policy = PrecisionPolicy::from_parameter_dtype(config.dtype());
        let model = Self {
            config,
            encoder,
            decoder,
            final_layer,
            policy,
        };
        let config = &model.config;
        log::info!(
            "transformer init layers={} d_model={} heads={} dff={} vocab={}->{} precision={:?} parameters={}",
            config.num_layers,
            config.d_model,
            config.num_heads,
            config.dff,
            config.input_vocab_size,
            config.target_vocab_size,
            config.precision,
            model.num_parameters()
        );
        Ok(model)
    }

    pub fn config(&self) -> &TransformerConfig {
        &self.config
    }

    pub fn encoder(&self) -> &Encoder {
        &self.encoder
    }

    pub fn decoder(&self) -> &Decoder {
        &self.decoder
    }

    pub fn num_parameters(&self) -> usize {
        self.encoder.num_parameters()
            + self.decoder.num_parameters()
            + self.final_layer.config().num_parameters()
    }

    /// Runs the encoder over `inp` and the decoder over `tar` with caller-supplied masks.
    ///
    /// `enc_padding_mask` masks source keys in encoder self-attention,
    /// `look_ahead_mask` masks decoder self-attention and `dec_padding_mask`
    /// masks source keys in the decoder's cross-attention.
    pub fn forward(
        &self,
        inp: &Tensor,
        tar: &Tensor,
        mode: ForwardMode,
        enc_padding_mask: Option<&Tensor>,
        look_ahead_mask: Option<&Tensor>,
        dec_padding_mask: Option<&Tensor>,
    ) -> Result<TransformerOutput, ModelError> {
        let (inp_batch, _) = inp.dims2()?;
        let (tar_batch, _) = tar.dims2()?;
        if inp_batch != tar_batch {
            return Err(ModelError::InvalidInput(format!(
                "input batch {inp_batch} does not match target batch {tar_batch}"
            )));
        }

        let enc_output = self.encoder.forward(inp, mode, enc_padding_mask)?;
        let (dec_output, attention_weights) =
            self.decoder
                .forward(tar, &enc_output, mode, look_ahead_mask, dec_padding_mask)?;

        let projected = self.final_layer.forward(&dec_output, &self.policy)?;
        let probabilities =
            softmax_last_dim(&self.policy.cast_for_reduction(&projected)?.contiguous()?)?;
        let logits = self.policy.cast_to_storage(&probabilities)?;

        Ok(TransformerOutput {
            logits,
            attention_weights,
        })
    }

    /// Builds padding and look-ahead masks from the token ids, then calls [`Self::forward`].
    pub fn forward_with_masks(
        &self,
        inp: &Tensor,
        tar: &Tensor,
        mode: ForwardMode,
    ) -> Result<TransformerOutput, ModelError> {
        let masks = TransformerMasks::build(inp, tar)?;
        self.forward(
            inp,
            tar,
            mode,
            Some(&masks.encoder_padding),
            Some(&masks.look_ahead),
            Some(&masks.decoder_padding),
        )
    }
}
