//! Builders shared by encoder and decoder layers.

use attention::MultiHeadAttention;
use candle_core::Device;
use layers::{
    ActivationKind, Dropout, FeedForward, FeedForwardConfig, LayerNorm, LinearInit, NormConfig,
    PostNormResidual,
};

use crate::{config::TransformerConfig, error::ModelError};

pub(crate) fn build_attention(
    config: &TransformerConfig,
    device: &Device,
) -> Result<MultiHeadAttention, ModelError> {
    Ok(MultiHeadAttention::with_init(
        config.d_model,
        config.num_heads,
        config.attention_config(),
        device,
        config.dtype(),
    )?)
}

pub(crate) fn build_feed_forward(
    config: &TransformerConfig,
    device: &Device,
) -> Result<FeedForward, ModelError> {
    let ffn_config = FeedForwardConfig::new(config.d_model, config.dff, ActivationKind::Relu);
    Ok(FeedForward::with_init(
        ffn_config,
        &LinearInit::XavierUniform,
        &LinearInit::XavierUniform,
        device,
        config.dtype(),
    )?)
}

pub(crate) fn build_residual(
    config: &TransformerConfig,
    device: &Device,
) -> Result<PostNormResidual, ModelError> {
    let norm = LayerNorm::with_init(
        NormConfig::new(config.d_model, config.norm_epsilon),
        device,
        config.dtype(),
    )?;
    Ok(PostNormResidual::new(norm, Dropout::new(config.dropout_rate)?))
}

/// Rejects hidden states whose width differs from `d_model`.
pub(crate) fn expect_hidden(
    context: &str,
    hidden: &candle_core::Tensor,
    d_model: usize,
) -> Result<(), ModelError> {
    layers::checks::expect_batch_seq_hidden(context, hidden, d_model)
        .map_err(|err| ModelError::InvalidInput(err.to_string()))
}

/// Rejects a part whose size disagrees with the rest of the model.
pub(crate) fn expect_match(what: &str, actual: usize, expected: usize) -> Result<(), ModelError> {
    if actual == expected {
        Ok(())
    } else {
        Err(ModelError::InvalidInput(format!(
            "{what} is {actual} but {expected} was expected"
        )))
    }
}
