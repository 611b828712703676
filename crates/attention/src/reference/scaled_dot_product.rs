//! Reference scaled dot-product attention kernel.
//!
//! Computes `softmax(Q Kᵀ / sqrt(depth) + mask * fill) V` with every
//! reduction performed in `f32`. Outputs and weights are returned in the
//! dtype of `q`.

use std::sync::OnceLock;

use candle_core::{DType, Tensor, D};
use candle_nn::ops::softmax_last_dim;
use layers::PrecisionPolicy;

use crate::core::{Attention, AttentionError, AttentionOutput, Config, FullyMaskedRows};

/// Numerically stable, portable attention kernel.
#[derive(Debug, Default)]
pub struct ScaledDotProductAttention {
    first_call: OnceLock<()>,
}

impl ScaledDotProductAttention {
    pub fn new() -> Self {
        Self::default()
    }
}

struct Dims {
    batch: usize,
    heads: usize,
    q_len: usize,
    k_len: usize,
    depth: usize,
    depth_v: usize,
}

fn validate_inputs(q: &Tensor, k: &Tensor, v: &Tensor) -> Result<Dims, AttentionError> {
    let device = q.device();
    if !device.same_device(k.device()) || !device.same_device(v.device()) {
        return Err(AttentionError::InvalidShape {
            context: "q, k, v must reside on the same device".to_string(),
        });
    }

    let dtype = q.dtype();
    if dtype != k.dtype() || dtype != v.dtype() {
        return Err(AttentionError::InvalidShape {
            context: "q, k, v must share the same dtype".to_string(),
        });
    }
    if !matches!(dtype, DType::F32 | DType::F16 | DType::BF16) {
        return Err(AttentionError::UnsupportedDType {
            requested: format!("{dtype:?}"),
        });
    }

    let (batch, heads, q_len, depth) = q.dims4().map_err(|_| AttentionError::InvalidShape {
        context: format!("q must have shape [batch, heads, q_len, depth], got {:?}", q.dims()),
    })?;
    let (kb, kh, k_len, kd) = k.dims4().map_err(|_| AttentionError::InvalidShape {
        context: format!("k must have shape [batch, heads, k_len, depth], got {:?}", k.dims()),
    })?;
    let (vb, vh, vk, depth_v) = v.dims4().map_err(|_| AttentionError::InvalidShape {
        context: format!("v must have shape [batch, heads, k_len, depth_v], got {:?}", v.dims()),
    })?;

    if kb != batch || kh != heads || kd != depth {
        return Err(AttentionError::InvalidShape {
            context: format!(
                "k shape mismatch: expected [{batch}, {heads}, ?, {depth}] got [{kb}, {kh}, {k_len}, {kd}]"
            ),
        });
    }
    if vb != batch || vh != heads || vk != k_len {
        return Err(AttentionError::InvalidShape {
            context: format!(
                "v shape mismatch: expected [{batch}, {heads}, {k_len}, ?] got [{vb}, {vh}, {vk}, {depth_v}]"
            ),
        });
    }
    if q_len == 0 || k_len == 0 {
        return Err(AttentionError::InvalidShape {
            context: "q_len and k_len must be non-zero".to_string(),
        });
    }

    Ok(Dims {
        batch,
        heads,
        q_len,
        k_len,
        depth,
        depth_v,
    })
}

/// Broadcasts `mask` to the logits layout, rejecting shapes that cannot align.
fn broadcast_mask(mask: &Tensor, q: &Tensor, dims: &Dims) -> Result<Tensor, AttentionError> {
    if !q.device().same_device(mask.device()) {
        return Err(AttentionError::InvalidShape {
            context: "mask must reside on the same device as q".to_string(),
        });
    }
    let target = [dims.batch, dims.heads, dims.q_len, dims.k_len];
    let mask_dims = mask.dims();
    let aligned = mask_dims.len() <= target.len()
        && mask_dims
            .iter()
            .rev()
            .zip(target.iter().rev())
            .all(|(&m, &t)| m == t || m == 1);
    if !aligned {
        return Err(AttentionError::InvalidShape {
            context: format!("mask shape {mask_dims:?} does not broadcast to {target:?}"),
        });
    }
    Ok(mask
        .to_dtype(DType::F32)?
        .broadcast_as(&target)?
        .contiguous()?)
}

impl Attention for ScaledDotProductAttention {
    fn attend(
        &self,
        q: &Tensor,
        k: &Tensor,
        v: &Tensor,
        mask: Option<&Tensor>,
        config: &Config,
    ) -> Result<AttentionOutput, AttentionError> {
        if self.first_call.set(()).is_ok() {
            log::info!(
                "attention::reference init fully_masked_rows={:?} mask_fill={}",
                config.fully_masked_rows,
                config.mask_fill
            );
        }

        let dims = validate_inputs(q, k, v)?;
        let policy = PrecisionPolicy::from_parameter_dtype(q.dtype());
        let Dims {
            batch,
            heads,
            q_len,
            k_len,
            depth,
            depth_v,
        } = dims;

        let merged = batch * heads;
        let q_view = policy
            .cast_for_reduction(q)?
            .reshape((merged, q_len, depth))?;
        let k_view = policy
            .cast_for_reduction(k)?
            .reshape((merged, k_len, depth))?;
        let v_view = policy
            .cast_for_reduction(v)?
            .reshape((merged, k_len, depth_v))?;

        let scale = 1.0 / (depth as f64).sqrt();
        let scores = q_view
            .matmul(&k_view.transpose(1, 2)?.contiguous()?)?
            .affine(scale, 0.0)?
            .reshape((batch, heads, q_len, k_len))?;

        let mask = mask.map(|m| broadcast_mask(m, q, &dims)).transpose()?;
        let scores = match &mask {
            Some(mask) => scores.add(&mask.affine(config.mask_fill, 0.0)?)?,
            None => scores,
        };

        let mut weights = softmax_last_dim(&scores.contiguous()?)?;

        if let Some(mask) = &mask {
            let fully_masked = mask.min_keepdim(D::Minus1)?.ge(0.5f32)?;
            let rows = fully_masked
                .to_dtype(DType::F32)?
                .sum_all()?
                .to_vec0::<f32>()? as usize;
            if rows > 0 {
                match config.fully_masked_rows {
                    FullyMaskedRows::Error => {
                        return Err(AttentionError::FullyMaskedRow { rows });
                    }
                    FullyMaskedRows::Uniform => {
                        log::warn!(
                            "{rows} attention row(s) fully masked; using uniform weights over {k_len} keys"
                        );
                        let uniform = Tensor::full(
                            1.0f32 / k_len as f32,
                            (batch, heads, q_len, k_len),
                            q.device(),
                        )?;
                        let condition = fully_masked
                            .broadcast_as((batch, heads, q_len, k_len))?
                            .contiguous()?;
                        weights = condition.where_cond(&uniform, &weights)?;
                    }
                }
            }
        }

        let output = weights
            .reshape((merged, q_len, k_len))?
            .matmul(&v_view)?
            .reshape((batch, heads, q_len, depth_v))?;

        Ok(AttentionOutput {
            output: policy.cast_to_storage(&output)?,
            weights: policy.cast_to_storage(&weights)?,
        })
    }
}
