//! Building blocks for the encoder-decoder transformer.
//!
//! The crate hosts the dense projections, layer normalisation, dropout,
//! residual wiring and position-wise feed-forward stacks that the attention
//! and model crates compose. Every component consumes Candle tensors shaped
//! `(batch, seq, hidden)` and follows the [`PrecisionPolicy`] rules for mixed
//! precision.

pub mod activations;
pub mod checks;
pub mod dropout;
pub mod dtypes;
pub mod linear;
pub mod mlp;
pub mod norm;
pub mod residual;

pub use activations::{Activation, ActivationKind};
pub use dropout::{Dropout, ForwardMode};
pub use dtypes::PrecisionPolicy;
pub use linear::{Linear, LinearConfig, LinearInit, LinearLayer};
pub use mlp::{FeedForward, FeedForwardConfig, FeedForwardLayer};
pub use norm::{LayerNorm, NormConfig, NormalizationLayer};
pub use residual::PostNormResidual;
