//! Position-wise feed-forward blocks built on top of projections and activations.
//!
//! MLPs operate on hidden states shaped `(batch, seq, hidden)` and return the
//! same layout. The first projection expands to `intermediate_size`, the
//! activation runs elementwise, and the second projection contracts back to
//! `hidden_size`. Every position is transformed independently; no information
//! crosses the sequence axis.

use std::{fmt, sync::Arc};

use candle_core::{DType, Device, Error, Result, Tensor};

use crate::{
    activations::{self, Activation, ActivationKind},
    checks,
    dtypes::PrecisionPolicy,
    linear::{Linear, LinearConfig, LinearInit, LinearLayer},
};

/// Configuration shared by feed-forward networks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedForwardConfig {
    /// Model hidden size.
    pub hidden_size: usize,
    /// Width of the activation space.
    pub intermediate_size: usize,
    /// Activation applied between projections.
    pub activation: ActivationKind,
}

impl FeedForwardConfig {
    /// Creates a standard two-projection MLP configuration.
    pub fn new(hidden_size: usize, intermediate_size: usize, activation: ActivationKind) -> Self {
        Self {
            hidden_size,
            intermediate_size,
            activation,
        }
    }
}

/// Shared interface for feed-forward stacks.
pub trait FeedForwardLayer: Send + Sync {
    /// Configuration metadata used during layer assembly.
    fn config(&self) -> &FeedForwardConfig;

    /// Performs the forward pass through the MLP.
    fn forward(&self, hidden: &Tensor, policy: &PrecisionPolicy) -> Result<Tensor>;
}

/// Two dense projections with an activation in between.
#[derive(Clone)]
pub struct FeedForward {
    config: FeedForwardConfig,
    up: Linear,
    down: Linear,
    activation: Arc<dyn Activation>,
}

impl fmt::Debug for FeedForward {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeedForward")
            .field("config", &self.config)
            .field("activation", &self.activation.kind())
            .finish()
    }
}

impl FeedForward {
    /// Assembles an MLP from existing projections.
    pub fn new(config: FeedForwardConfig, up: Linear, down: Linear) -> Result<Self> {
        let up_cfg = up.config();
        let down_cfg = down.config();
        if up_cfg.input_dim != config.hidden_size || up_cfg.output_dim != config.intermediate_size
        {
            return Err(Error::Msg(format!(
                "mlp.up expected {} -> {}, got {} -> {}",
                config.hidden_size, config.intermediate_size, up_cfg.input_dim, up_cfg.output_dim
            )));
        }
        if down_cfg.input_dim != config.intermediate_size
            || down_cfg.output_dim != config.hidden_size
        {
            return Err(Error::Msg(format!(
                "mlp.down expected {} -> {}, got {} -> {}",
                config.intermediate_size,
                config.hidden_size,
                down_cfg.input_dim,
                down_cfg.output_dim
            )));
        }
        let activation = activations::builtin(config.activation);
        Ok(Self {
            config,
            up,
            down,
            activation,
        })
    }

    /// Samples both projections with the supplied initialisers.
    pub fn with_init(
        config: FeedForwardConfig,
        up_init: &LinearInit,
        down_init: &LinearInit,
        device: &Device,
        dtype: DType,
    ) -> Result<Self> {
        let up = Linear::with_init(
            LinearConfig::new(config.hidden_size, config.intermediate_size),
            up_init,
            device,
            dtype,
        )?;
        let down = Linear::with_init(
            LinearConfig::new(config.intermediate_size, config.hidden_size),
            down_init,
            device,
            dtype,
        )?;
        Self::new(config, up, down)
    }

    pub fn num_parameters(&self) -> usize {
        self.up.config().num_parameters() + self.down.config().num_parameters()
    }
}

impl FeedForwardLayer for FeedForward {
    fn config(&self) -> &FeedForwardConfig {
        &self.config
    }

    fn forward(&self, hidden: &Tensor, policy: &PrecisionPolicy) -> Result<Tensor> {
        checks::expect_batch_seq_hidden("mlp.input", hidden, self.config.hidden_size)?;
        let expanded = self.up.forward(hidden, policy)?;
        let activated = self.activation.forward(&expanded, policy)?;
        self.down.forward(&activated, policy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn relu_mlp(device: &Device) -> Result<FeedForward> {
        FeedForward::with_init(
            FeedForwardConfig::new(4, 16, ActivationKind::Relu),
            &LinearInit::XavierUniform,
            &LinearInit::XavierUniform,
            device,
            DType::F32,
        )
    }

    #[test]
    fn forward_preserves_shape() -> Result<()> {
        let device = Device::Cpu;
        let mlp = relu_mlp(&device)?;
        let input = Tensor::randn(0f32, 1.0, (2, 7, 4), &device)?;
        let policy = PrecisionPolicy::from_parameter_dtype(DType::F32);
        let output = mlp.forward(&input, &policy)?;
        assert_eq!(output.dims(), &[2, 7, 4]);
        assert_eq!(mlp.num_parameters(), 4 * 16 + 16 + 16 * 4 + 4);
        Ok(())
    }

    #[test]
    fn positions_are_transformed_independently() -> Result<()> {
        let device = Device::Cpu;
        let mlp = relu_mlp(&device)?;
        let policy = PrecisionPolicy::from_parameter_dtype(DType::F32);
        let input = Tensor::randn(0f32, 1.0, (1, 5, 4), &device)?;
        let full = mlp.forward(&input, &policy)?;

        for pos in 0..5 {
            let single = mlp.forward(&input.narrow(1, pos, 1)?, &policy)?;
            let diff = full
                .narrow(1, pos, 1)?
                .sub(&single)?
                .abs()?
                .max_all()?
                .to_vec0::<f32>()?;
            assert!(diff < 1e-5, "position {pos} leaked context: {diff}");
        }
        Ok(())
    }

    #[test]
    fn zero_weights_yield_bias_only_output() -> Result<()> {
        let device = Device::Cpu;
        let config = FeedForwardConfig::new(2, 3, ActivationKind::Relu);
        let up = Linear::new(
            LinearConfig::new(2, 3),
            Tensor::zeros((3, 2), DType::F32, &device)?,
            Some(Tensor::from_vec(vec![1.0f32, -1.0, 2.0], 3, &device)?),
        )?;
        let down = Linear::new(
            LinearConfig::new(3, 2),
            Tensor::ones((2, 3), DType::F32, &device)?,
            Some(Tensor::zeros(2, DType::F32, &device)?),
        )?;
        let mlp = FeedForward::new(config, up, down)?;
        let input = Tensor::randn(0f32, 1.0, (1, 2, 2), &device)?;
        let policy = PrecisionPolicy::from_parameter_dtype(DType::F32);
        let values = mlp.forward(&input, &policy)?.flatten_all()?.to_vec1::<f32>()?;
        // relu([1, -1, 2]) summed by the all-ones down projection.
        assert!(values.iter().all(|v| (*v - 3.0).abs() < 1e-6));
        Ok(())
    }

    #[test]
    fn rejects_mismatched_projections() -> Result<()> {
        let device = Device::Cpu;
        let config = FeedForwardConfig::new(4, 8, ActivationKind::Relu);
        let up = Linear::with_init(
            LinearConfig::new(4, 6),
            &LinearInit::XavierUniform,
            &device,
            DType::F32,
        )?;
        let down = Linear::with_init(
            LinearConfig::new(8, 4),
            &LinearInit::XavierUniform,
            &device,
            DType::F32,
        )?;
        assert!(FeedForward::new(config, up, down).is_err());
        Ok(())
    }
}
