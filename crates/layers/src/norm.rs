//! Layer normalisation over the feature axis.
//!
//! Inputs follow the `(batch, seq, hidden)` convention. Statistics (mean,
//! variance) are computed in [`PrecisionPolicy::reduction`] per position and
//! the output is cast back to storage, preserving the input layout.

use candle_core::{DType, Device, Error, Result, Tensor, D};

use crate::{checks, dtypes::PrecisionPolicy};

/// Configuration shared by normalisation layers.
#[derive(Debug, Clone, PartialEq)]
pub struct NormConfig {
    /// Size of the hidden dimension being normalised.
    pub hidden_size: usize,
    /// Numeric stabiliser added to the variance.
    pub epsilon: f64,
}

impl NormConfig {
    pub fn new(hidden_size: usize, epsilon: f64) -> Self {
        Self {
            hidden_size,
            epsilon,
        }
    }
}

/// Shared interface for normalisation layers used inside transformer layers.
pub trait NormalizationLayer: Send + Sync {
    /// Returns the configuration so callers can check shape compatibility.
    fn config(&self) -> &NormConfig;

    /// Applies the normalisation to a hidden state tensor.
    fn forward(&self, hidden: &Tensor, policy: &PrecisionPolicy) -> Result<Tensor>;
}

/// Standard LayerNorm with learnable scale and bias.
#[derive(Debug, Clone)]
pub struct LayerNorm {
    config: NormConfig,
    weight: Tensor,
    bias: Tensor,
}

impl LayerNorm {
    /// Constructs a LayerNorm with learnable scale and bias parameters.
    pub fn new(weight: Tensor, bias: Tensor, config: NormConfig) -> Result<Self> {
        Self::validate_config(&config)?;
        for (name, tensor) in [("norm.weight", &weight), ("norm.bias", &bias)] {
            checks::expect_shape(name, tensor, &[config.hidden_size])?;
            checks::expect_dtype_in(name, tensor, &checks::FLOAT_DTYPES)?;
            checks::expect_contiguous(name, tensor)?;
        }
        Ok(Self {
            config,
            weight,
            bias,
        })
    }

    /// Unit scale and zero bias, the usual starting point before training.
    pub fn with_init(config: NormConfig, device: &Device, dtype: DType) -> Result<Self> {
        let weight = Tensor::ones(config.hidden_size, dtype, device)?;
        let bias = Tensor::zeros(config.hidden_size, dtype, device)?;
        Self::new(weight, bias, config)
    }

    pub fn num_parameters(&self) -> usize {
        self.weight.elem_count() + self.bias.elem_count()
    }

    fn validate_config(config: &NormConfig) -> Result<()> {
        if config.hidden_size == 0 {
            return Err(Error::Msg("norm hidden_size must be non-zero".into()));
        }
        if !(config.epsilon > 0.0) {
            return Err(Error::Msg(format!(
                "norm epsilon must be positive, got {}",
                config.epsilon
            )));
        }
        Ok(())
    }
}

impl NormalizationLayer for LayerNorm {
    fn config(&self) -> &NormConfig {
        &self.config
    }

    fn forward(&self, hidden: &Tensor, policy: &PrecisionPolicy) -> Result<Tensor> {
        checks::expect_batch_seq_hidden("norm.input", hidden, self.config.hidden_size)?;

        let hidden_size = self.config.hidden_size as f64;
        let compute = policy.cast_for_reduction(hidden)?;

        let mean = (compute.sum_keepdim(D::Minus1)? / hidden_size)?;
        let centered = compute.broadcast_sub(&mean)?;
        let variance = (centered.sqr()?.sum_keepdim(D::Minus1)? / hidden_size)?;
        let denom = (variance + self.config.epsilon)?.sqrt()?;
        let mut normalized = centered.broadcast_div(&denom)?;

        if normalized.dtype() != policy.compute() {
            normalized = normalized.to_dtype(policy.compute())?;
        }
        let scaled = normalized
            .broadcast_mul(&self.weight.to_dtype(normalized.dtype())?)?
            .broadcast_add(&self.bias.to_dtype(normalized.dtype())?)?;

        policy.cast_to_storage(&scaled)
    }
}
