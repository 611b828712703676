//! Mask composition and the mask triple consumed by the full model.

use candle_core::{bail, Result, Tensor};

use super::{causal_mask, padding_mask, MASK_DTYPE};

/// Element-wise maximum of two broadcast-compatible masks: a position is
/// hidden when either mask hides it.
pub fn combine_masks(lhs: &Tensor, rhs: &Tensor) -> Result<Tensor> {
    if lhs.dtype() != MASK_DTYPE || rhs.dtype() != MASK_DTYPE {
        bail!(
            "masks must use dtype {MASK_DTYPE:?}, got {:?} and {:?}",
            lhs.dtype(),
            rhs.dtype()
        );
    }
    lhs.broadcast_maximum(rhs)
}

/// The three masks used by one encoder-decoder forward pass.
#[derive(Debug, Clone)]
pub struct TransformerMasks {
    /// Padding of the source tokens, `[batch, 1, 1, inp_len]`.
    pub encoder_padding: Tensor,
    /// Causal mask merged with target padding, `[batch, 1, tar_len, tar_len]`.
    pub look_ahead: Tensor,
    /// Source padding applied to the decoder's cross-attention, `[batch, 1, 1, inp_len]`.
    pub decoder_padding: Tensor,
}

impl TransformerMasks {
    /// Derives all three masks from the raw source and target token ids.
    pub fn build(input_ids: &Tensor, target_ids: &Tensor) -> Result<Self> {
        let (_, tar_len) = target_ids.dims2()?;
        let encoder_padding = padding_mask(input_ids)?;
        let decoder_padding = encoder_padding.clone();
        let look_ahead = combine_masks(
            &causal_mask(target_ids.device(), tar_len)?,
            &padding_mask(target_ids)?,
        )?;
        Ok(Self {
            encoder_padding,
            look_ahead,
            decoder_padding,
        })
    }
}
