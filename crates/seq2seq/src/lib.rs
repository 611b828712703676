//! Encoder-decoder transformer forward pass.
//!
//! [`Transformer`] wires an [`Encoder`] and a [`Decoder`] stack, built from
//! the `layers`, `embedding` and `attention` crates, to a final projection
//! whose softmax gives a distribution over the target vocabulary at every
//! target position. The decoder also returns the attention weights of each
//! of its layers as an [`AttentionWeights`] collection.
//!
//! ```no_run
//! use candle_core::{Device, Tensor};
//! use seq2seq::{ForwardMode, Transformer, TransformerConfig};
//!
//! # fn main() -> Result<(), seq2seq::ModelError> {
//! let config = TransformerConfig::new(2, 64, 4, 128, 1000, 1200, 64, 64);
//! let model = Transformer::new(&config, &Device::Cpu)?;
//! let inp = Tensor::new(&[[12u32, 7, 3, 0]], &Device::Cpu)?;
//! let tar = Tensor::new(&[[1u32, 9, 4]], &Device::Cpu)?;
//! let out = model.forward_with_masks(&inp, &tar, ForwardMode::Inference)?;
//! assert_eq!(out.logits.dims(), &[1, 3, 1200]);
//! # Ok(())
//! # }
//! ```

mod block;
pub mod config;
pub mod decoder;
pub mod encoder;
pub mod error;
pub mod transformer;
pub mod weights;

pub use config::{ConfigError, Precision, TransformerConfig};
pub use decoder::{Decoder, DecoderLayer, DecoderLayerOutput};
pub use encoder::{Encoder, EncoderLayer};
pub use error::ModelError;
pub use layers::ForwardMode;
pub use transformer::{Transformer, TransformerOutput};
pub use weights::{AttentionBlock, AttentionKey, AttentionWeights};
