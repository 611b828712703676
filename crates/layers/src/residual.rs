//! Residual add-then-normalise wiring used after every attention and
//! feed-forward sub-block.
//!
//! The post-norm step computes `norm(residual + dropout(branch))`. Both inputs
//! must share the `(batch, seq, hidden)` shape and dtype; the output keeps that
//! shape. Addition happens in [`PrecisionPolicy::compute`].

use candle_core::{Result, Tensor};

use crate::{
    checks,
    dropout::{Dropout, ForwardMode},
    dtypes::PrecisionPolicy,
    norm::{LayerNorm, NormalizationLayer},
};

/// Post-norm residual connection owning its dropout and layer norm.
#[derive(Debug, Clone)]
pub struct PostNormResidual {
    dropout: Dropout,
    norm: LayerNorm,
}

impl PostNormResidual {
    pub fn new(norm: LayerNorm, dropout: Dropout) -> Self {
        Self { dropout, norm }
    }

    pub fn norm(&self) -> &LayerNorm {
        &self.norm
    }

    pub fn num_parameters(&self) -> usize {
        self.norm.num_parameters()
    }

    /// Adds `branch` to `residual` without dropout or normalisation.
    pub fn add(&self, branch: &Tensor, residual: &Tensor, policy: &PrecisionPolicy) -> Result<Tensor> {
        let hidden = self.norm.config().hidden_size;
        checks::expect_batch_seq_hidden("residual.input", residual, hidden)?;
        checks::expect_shape("residual.branch", branch, residual.dims())?;
        checks::expect_same_dtype("residual.branch", branch, "residual.input", residual)?;

        let branch = policy.cast_for_matmul(branch)?;
        let residual = policy.cast_for_matmul(residual)?;
        policy.cast_to_storage(&branch.add(&residual)?)
    }

    /// Post-norm step (branch -> dropout -> add -> norm).
    pub fn forward(
        &self,
        branch: &Tensor,
        residual: &Tensor,
        mode: ForwardMode,
        policy: &PrecisionPolicy,
    ) -> Result<Tensor> {
        let after_dropout = self.dropout.forward(branch, mode, policy)?;
        let summed = self.add(&after_dropout, residual, policy)?;
        self.norm.forward(&summed, policy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::norm::NormConfig;
    use candle_core::{DType, Device};

    fn policy(dtype: DType) -> PrecisionPolicy {
        PrecisionPolicy::from_parameter_dtype(dtype)
    }

    fn residual(hidden: usize, p: f32) -> Result<PostNormResidual> {
        let norm = LayerNorm::with_init(NormConfig::new(hidden, 1e-6), &Device::Cpu, DType::F32)?;
        Ok(PostNormResidual::new(norm, Dropout::new(p)?))
    }

    #[test]
    fn add_preserves_shape_and_dtype() -> Result<()> {
        let device = Device::Cpu;
        let dtype = DType::F16;
        let norm = LayerNorm::with_init(NormConfig::new(8, 1e-6), &device, dtype)?;
        let residual = PostNormResidual::new(norm, Dropout::disabled());
        let left = Tensor::randn(0f32, 1.0, (2, 4, 8), &device)?.to_dtype(dtype)?;
        let right = Tensor::randn(0f32, 1.0, (2, 4, 8), &device)?.to_dtype(dtype)?;
        let out = residual.add(&left, &right, &policy(dtype))?;
        assert_eq!(out.dims(), &[2, 4, 8]);
        assert_eq!(out.dtype(), dtype);
        Ok(())
    }

    #[test]
    fn forward_normalises_the_sum() -> Result<()> {
        let device = Device::Cpu;
        let block = residual(4, 0.0)?;
        let branch = Tensor::from_vec(vec![1.0f32, 2.0, 3.0, 4.0], (1, 1, 4), &device)?;
        let parent = Tensor::from_vec(vec![1.0f32, 0.0, -1.0, 2.0], (1, 1, 4), &device)?;
        let out = block.forward(&branch, &parent, ForwardMode::Inference, &policy(DType::F32))?;

        let expected = block
            .norm()
            .forward(&branch.add(&parent)?, &policy(DType::F32))?;
        let diff = out.sub(&expected)?.abs()?.max_all()?.to_vec0::<f32>()?;
        assert!(diff < 1e-6);
        Ok(())
    }

    #[test]
    fn inference_ignores_dropout_probability() -> Result<()> {
        let device = Device::Cpu;
        let noisy = residual(4, 0.9)?;
        let clean = residual(4, 0.0)?;
        let branch = Tensor::randn(0f32, 1.0, (2, 3, 4), &device)?;
        let parent = Tensor::randn(0f32, 1.0, (2, 3, 4), &device)?;
        let p = policy(DType::F32);
        let a = noisy.forward(&branch, &parent, ForwardMode::Inference, &p)?;
        let b = clean.forward(&branch, &parent, ForwardMode::Inference, &p)?;
        assert_eq!(a.sub(&b)?.abs()?.max_all()?.to_vec0::<f32>()?, 0.0);
        Ok(())
    }

    #[test]
    fn shape_mismatch_is_rejected() -> Result<()> {
        let device = Device::Cpu;
        let block = residual(4, 0.0)?;
        let branch = Tensor::zeros((1, 2, 4), DType::F32, &device)?;
        let parent = Tensor::zeros((1, 3, 4), DType::F32, &device)?;
        assert!(block
            .forward(&branch, &parent, ForwardMode::Inference, &policy(DType::F32))
            .is_err());
        Ok(())
    }
}
