//! Hyperparameters for the encoder-decoder model.
//!
//! Configurations are plain serde structs so they can be loaded from TOML or
//! JSON files. Every structural invariant is checked in
//! [`TransformerConfig::validate`], which reports all violations at once.

use std::{fs, path::Path};

use attention::{Config as AttentionConfig, FullyMaskedRows};
use candle_core::DType;
use serde::Deserialize;
use thiserror::Error;

/// Storage dtype for model parameters and activations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Precision {
    #[default]
    F32,
    F16,
    Bf16,
}

impl Precision {
    pub fn dtype(self) -> DType {
        match self {
            Precision::F32 => DType::F32,
            Precision::F16 => DType::F16,
            Precision::Bf16 => DType::BF16,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse TOML config: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("failed to parse JSON config: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported configuration extension '{0}'")]
    UnsupportedFormat(String),
    #[error("invalid configuration: {}", .0.join("; "))]
    Validation(Vec<String>),
}

fn default_dropout_rate() -> f32 {
    0.1
}

fn default_norm_epsilon() -> f64 {
    1e-6
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TransformerConfig {
    /// Number of layers in each of the encoder and decoder stacks.
    pub num_layers: usize,
    pub d_model: usize,
    pub num_heads: usize,
    /// Inner width of the position-wise feed-forward blocks.
    pub dff: usize,
    pub input_vocab_size: usize,
    pub target_vocab_size: usize,
    /// Longest source sequence the encoder's positional table covers.
    pub max_position_input: usize,
    /// Longest target sequence the decoder's positional table covers.
    pub max_position_target: usize,
    #[serde(default = "default_dropout_rate")]
    pub dropout_rate: f32,
    #[serde(default = "default_norm_epsilon")]
    pub norm_epsilon: f64,
    #[serde(default)]
    pub precision: Precision,
    #[serde(default)]
    pub fully_masked_rows: FullyMaskedRows,
}

impl TransformerConfig {
    /// Builds a configuration with default dropout, epsilon and precision.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        num_layers: usize,
        d_model: usize,
        num_heads: usize,
        dff: usize,
        input_vocab_size: usize,
        target_vocab_size: usize,
        max_position_input: usize,
        max_position_target: usize,
    ) -> Self {
        Self {
            num_layers,
            d_model,
            num_heads,
            dff,
            input_vocab_size,
            target_vocab_size,
            max_position_input,
            max_position_target,
            dropout_rate: default_dropout_rate(),
            norm_epsilon: default_norm_epsilon(),
            precision: Precision::default(),
            fully_masked_rows: FullyMaskedRows::default(),
        }
    }

    /// Loads a configuration from `.toml` (or extension-less) and `.json` files.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)?;
        let config: TransformerConfig = match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => serde_json::from_str(&contents)?,
            Some("toml") | None => toml::from_str(&contents)?,
            Some(other) => return Err(ConfigError::UnsupportedFormat(other.to_string())),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        let sizes = [
            ("num_layers", self.num_layers),
            ("d_model", self.d_model),
            ("num_heads", self.num_heads),
            ("dff", self.dff),
            ("input_vocab_size", self.input_vocab_size),
            ("target_vocab_size", self.target_vocab_size),
            ("max_position_input", self.max_position_input),
            ("max_position_target", self.max_position_target),
        ];
        for (name, value) in sizes {
            if value == 0 {
                errors.push(format!("{name} must be greater than 0"));
            }
        }

        if self.num_heads > 0 && self.d_model % self.num_heads != 0 {
            errors.push(format!(
                "d_model ({}) must be divisible by num_heads ({})",
                self.d_model, self.num_heads
            ));
        }

        if !(0.0..1.0).contains(&self.dropout_rate) {
            errors.push(format!(
                "dropout_rate must be in [0, 1), got {}",
                self.dropout_rate
            ));
        }

        if self.norm_epsilon <= 0.0 || !self.norm_epsilon.is_finite() {
            errors.push(format!(
                "norm_epsilon must be a positive finite number, got {}",
                self.norm_epsilon
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    pub fn dtype(&self) -> DType {
        self.precision.dtype()
    }

    pub fn attention_config(&self) -> AttentionConfig {
        AttentionConfig::default().with_fully_masked_rows(self.fully_masked_rows)
    }
}
