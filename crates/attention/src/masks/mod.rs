//! Mask utilities shared by attention implementations.
//!
//! Masks are indicator tensors with dtype `f32`: `1.0` marks a key position
//! that must not be attended and `0.0` a position that may be. Kernels turn
//! them into additive logit offsets by multiplying with [`MASK_FILL`]. Every
//! mask broadcasts against attention logits shaped
//! `[batch, num_heads, q_len, k_len]`.

pub mod causal;
pub mod combine;
pub mod padding;

use candle_core::DType;

/// Dtype shared by all masks.
pub const MASK_DTYPE: DType = DType::F32;

/// Token id reserved for padding.
pub const PAD_TOKEN_ID: i64 = 0;

/// Additive logit offset for masked positions.
pub const MASK_FILL: f64 = -1e9;

pub use causal::causal_mask;
pub use combine::{combine_masks, TransformerMasks};
pub use padding::{padding_mask, padding_mask_from_lengths};
