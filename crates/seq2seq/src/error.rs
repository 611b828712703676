use attention::AttentionError;
use thiserror::Error;

use crate::config::ConfigError;

/// Failure raised while building or running the model.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("attention failed: {0}")]
    Attention(#[from] AttentionError),
    #[error("tensor operation failed: {0}")]
    Tensor(#[from] candle_core::Error),
    #[error("invalid model input: {0}")]
    InvalidInput(String),
}
