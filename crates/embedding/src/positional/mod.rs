//! Positional encodings added to token embeddings.

pub mod sinusoidal;
