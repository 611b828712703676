//! Attention primitives for the encoder-decoder transformer.
//!
//! The crate provides the masks used to hide padding and future positions,
//! a reference scaled dot-product kernel over tensors laid out as
//! `[batch, n_heads, seq_len, depth]`, and [`MultiHeadAttention`], which wraps
//! the kernel with learned projections over `(batch, seq, d_model)` inputs.
//!
//! Masks hold `1.0` where attention is forbidden. The kernel scales them by
//! [`masks::MASK_FILL`] and adds the result to the logits before the softmax,
//! so masked positions receive (numerically) zero weight.

pub mod core;
pub mod masks;
pub mod multi_head;
pub mod reference;

pub use crate::core::{Attention, AttentionError, AttentionOutput, Config, FullyMaskedRows};
pub use multi_head::MultiHeadAttention;
pub use reference::ScaledDotProductAttention;
