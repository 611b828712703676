//! Configuration options shared by all attention implementations.
//!
//! The [`Config`] struct captures run-time knobs that callers can tune without
//! swapping implementations.

use serde::Deserialize;

use crate::masks::MASK_FILL;

/// Behaviour for query rows whose every key position is masked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FullyMaskedRows {
    /// Spread the row evenly over all key positions and log a warning.
    #[default]
    Uniform,
    /// Reject the call with [`AttentionError::FullyMaskedRow`](crate::AttentionError::FullyMaskedRow).
    Error,
}

/// Configuration driving attention behaviour.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Policy applied when a mask hides every key for some query.
    pub fully_masked_rows: FullyMaskedRows,
    /// Value multiplied into mask entries before they are added to the logits.
    pub mask_fill: f64,
}

impl Config {
    pub fn with_fully_masked_rows(mut self, policy: FullyMaskedRows) -> Self {
        self.fully_masked_rows = policy;
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            fully_masked_rows: FullyMaskedRows::default(),
            mask_fill: MASK_FILL,
        }
    }
}
