//! Embedding crate
//!
//! `token` looks up learned vectors for integer ids; `positional` builds the
//! fixed sinusoidal table that injects order information.

pub mod positional;
pub mod token;

pub use positional::sinusoidal::PositionalEncoding;
pub use token::{TokenEmbedding, TokenEmbeddingConfig};
