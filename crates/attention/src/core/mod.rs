//! Core traits and types shared across attention implementations.
//!
//! Implementations operate on tensors with layout
//! `[batch, n_heads, seq_len, depth]`. Reductions accumulate in `f32`
//! regardless of the incoming dtype (`bf16`, `f16`, or `f32`) and results are
//! returned in the dtype of `q`.

pub mod config;
pub mod errors;

use candle_core::Tensor;

pub use config::{Config, FullyMaskedRows};
pub use errors::AttentionError;

/// Attended values together with the normalised weights that produced them.
#[derive(Debug, Clone)]
pub struct AttentionOutput {
    /// `[batch, n_heads, q_len, depth_v]`.
    pub output: Tensor,
    /// `[batch, n_heads, q_len, k_len]`; each row sums to one.
    pub weights: Tensor,
}

/// Unified interface for attention kernels.
///
/// * `q` is `[batch, n_heads, q_len, depth]`, `k` is `[batch, n_heads, k_len, depth]`
///   and `v` is `[batch, n_heads, k_len, depth_v]`.
/// * Masks, when present, hold `1.0` at positions to hide and `0.0` elsewhere,
///   and must broadcast to `[batch, n_heads, q_len, k_len]`.
pub trait Attention {
    fn attend(
        &self,
        q: &Tensor,
        k: &Tensor,
        v: &Tensor,
        mask: Option<&Tensor>,
        config: &Config,
    ) -> Result<AttentionOutput, AttentionError>;
}
