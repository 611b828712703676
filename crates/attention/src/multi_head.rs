//! Multi-head attention: project, split into heads, attend, merge, project.
//!
//! Inputs are `(batch, seq, d_model)`. `d_model` must divide evenly by the
//! head count; each head works on `depth = d_model / num_heads` features.

use candle_core::{DType, Device, Tensor};
use layers::{checks, Linear, LinearConfig, LinearInit, LinearLayer, PrecisionPolicy};

use crate::core::{Attention, AttentionError, AttentionOutput, Config};
use crate::reference::ScaledDotProductAttention;

/// Multi-head attention layer owning its four `d_model x d_model` projections.
#[derive(Debug)]
pub struct MultiHeadAttention {
    d_model: usize,
    num_heads: usize,
    depth: usize,
    wq: Linear,
    wk: Linear,
    wv: Linear,
    dense: Linear,
    kernel: ScaledDotProductAttention,
    config: Config,
}

impl MultiHeadAttention {
    /// Assembles the layer from existing projections.
    pub fn new(
        d_model: usize,
        num_heads: usize,
        projections: [Linear; 4],
        config: Config,
    ) -> Result<Self, AttentionError> {
        let depth = head_depth(d_model, num_heads)?;
        let [wq, wk, wv, dense] = projections;
        for (name, proj) in [("wq", &wq), ("wk", &wk), ("wv", &wv), ("dense", &dense)] {
            let cfg = proj.config();
            if cfg.input_dim != d_model || cfg.output_dim != d_model {
                return Err(AttentionError::InvalidConfig {
                    context: format!(
                        "{name} expected {d_model} -> {d_model}, got {} -> {}",
                        cfg.input_dim, cfg.output_dim
                    ),
                });
            }
        }
        Ok(Self {
            d_model,
            num_heads,
            depth,
            wq,
            wk,
            wv,
            dense,
            kernel: ScaledDotProductAttention::new(),
            config,
        })
    }

    /// Samples all projections with Xavier-uniform weights and zero biases.
    pub fn with_init(
        d_model: usize,
        num_heads: usize,
        config: Config,
        device: &Device,
        dtype: DType,
    ) -> Result<Self, AttentionError> {
        head_depth(d_model, num_heads)?;
        let sample = || {
            Linear::with_init(
                LinearConfig::new(d_model, d_model),
                &LinearInit::XavierUniform,
                device,
                dtype,
            )
        };
        let projections = [sample()?, sample()?, sample()?, sample()?];
        Self::new(d_model, num_heads, projections, config)
    }

    pub fn d_model(&self) -> usize {
        self.d_model
    }

    pub fn num_heads(&self) -> usize {
        self.num_heads
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn num_parameters(&self) -> usize {
        [&self.wq, &self.wk, &self.wv, &self.dense]
            .iter()
            .map(|proj| proj.config().num_parameters())
            .sum()
    }

    /// `(batch, seq, d_model)` -> `(batch, num_heads, seq, depth)`.
    pub fn split_heads(&self, x: &Tensor) -> Result<Tensor, AttentionError> {
        let (batch, seq, d_model) = x.dims3().map_err(|_| AttentionError::InvalidShape {
            context: format!("split_heads expects [batch, seq, d_model], got {:?}", x.dims()),
        })?;
        if d_model != self.d_model {
            return Err(AttentionError::InvalidShape {
                context: format!("split_heads expected width {}, got {d_model}", self.d_model),
            });
        }
        Ok(x.reshape((batch, seq, self.num_heads, self.depth))?
            .permute((0, 2, 1, 3))?
            .contiguous()?)
    }

    /// `(batch, num_heads, seq, depth)` -> `(batch, seq, d_model)`.
    pub fn merge_heads(&self, x: &Tensor) -> Result<Tensor, AttentionError> {
        let (batch, heads, seq, depth) = x.dims4()?;
        if heads != self.num_heads || depth != self.depth {
            return Err(AttentionError::InvalidShape {
                context: format!(
                    "merge_heads expected [_, {}, _, {}], got {:?}",
                    self.num_heads,
                    self.depth,
                    x.dims()
                ),
            });
        }
        Ok(x.permute((0, 2, 1, 3))?
            .contiguous()?
            .reshape((batch, seq, self.d_model))?)
    }

    /// Attends from `query` over `key`/`value`.
    ///
    /// `key` and `value` must share their sequence length; `query` may differ.
    /// The output is `(batch, q_len, d_model)` and the weights are
    /// `(batch, num_heads, q_len, k_len)`.
    pub fn forward(
        &self,
        query: &Tensor,
        key: &Tensor,
        value: &Tensor,
        mask: Option<&Tensor>,
        policy: &PrecisionPolicy,
    ) -> Result<AttentionOutput, AttentionError> {
        for (name, tensor) in [("query", query), ("key", key), ("value", value)] {
            checks::expect_batch_seq_hidden(name, tensor, self.d_model).map_err(|err| {
                AttentionError::InvalidShape {
                    context: err.to_string(),
                }
            })?;
        }
        let (q_batch, _, _) = query.dims3()?;
        let (k_batch, k_len, _) = key.dims3()?;
        let (v_batch, v_len, _) = value.dims3()?;
        if k_len != v_len || k_batch != v_batch || q_batch != k_batch {
            return Err(AttentionError::InvalidShape {
                context: format!(
                    "key/value mismatch: query {:?}, key {:?}, value {:?}",
                    query.dims(),
                    key.dims(),
                    value.dims()
                ),
            });
        }

        let q = self.split_heads(&self.wq.forward(query, policy)?)?;
        let k = self.split_heads(&self.wk.forward(key, policy)?)?;
        let v = self.split_heads(&self.wv.forward(value, policy)?)?;

        let attended = self.kernel.attend(&q, &k, &v, mask, &self.config)?;
        let merged = self.merge_heads(&attended.output)?;
        let output = self.dense.forward(&merged, policy)?;

        Ok(AttentionOutput {
            output,
            weights: attended.weights,
        })
    }
}

fn head_depth(d_model: usize, num_heads: usize) -> Result<usize, AttentionError> {
    if d_model == 0 || num_heads == 0 {
        return Err(AttentionError::InvalidConfig {
            context: format!("d_model ({d_model}) and num_heads ({num_heads}) must be non-zero"),
        });
    }
    if d_model % num_heads != 0 {
        return Err(AttentionError::InvalidConfig {
            context: format!("d_model ({d_model}) is not divisible by num_heads ({num_heads})"),
        });
    }
    Ok(d_model / num_heads)
}
