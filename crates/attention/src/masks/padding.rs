//! Builders for padding masks used to drop padded keys.
//!
//! Padding masks are shaped `[batch, 1, 1, seq_len]` so that they broadcast
//! over heads and query positions.

use candle_core::{bail, DType, Device, Result, Tensor};

use super::{MASK_DTYPE, PAD_TOKEN_ID};

/// Marks every position of `token_ids` (`[batch, seq_len]`, integer dtype)
/// that holds [`PAD_TOKEN_ID`].
pub fn padding_mask(token_ids: &Tensor) -> Result<Tensor> {
    let (batch, seq_len) = token_ids.dims2()?;
    if !token_ids.dtype().is_int() {
        bail!(
            "padding mask expects integer token ids, got {:?}",
            token_ids.dtype()
        );
    }
    token_ids
        .to_dtype(DType::I64)?
        .eq(PAD_TOKEN_ID)?
        .to_dtype(MASK_DTYPE)?
        .reshape((batch, 1, 1, seq_len))
}

/// Construct padding masks from per-batch valid key lengths.
///
/// Lengths larger than `seq_len` are clamped, leaving that row unmasked.
pub fn padding_mask_from_lengths(
    device: &Device,
    key_lengths: &[usize],
    seq_len: usize,
) -> Result<Tensor> {
    let batch = key_lengths.len();
    let mut data = vec![0f32; batch * seq_len];

    for (b, &valid) in key_lengths.iter().enumerate() {
        let valid = valid.min(seq_len);
        let row_start = b * seq_len;
        for k in valid..seq_len {
            data[row_start + k] = 1.0;
        }
    }

    Tensor::from_vec(data, (batch, 1, 1, seq_len), device)
}
