//! Train-only dropout and the forward mode switch threaded through every block.
//!
//! Whether a pass is training or inference is an explicit argument to each
//! forward call rather than state stored on the module, so a single model
//! instance can serve both kinds of pass concurrently.

use candle_core::{Error, Result, Tensor};
use candle_nn::ops;

use crate::dtypes::PrecisionPolicy;

/// Selects train-time behaviour (dropout active) or deterministic inference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ForwardMode {
    Training,
    #[default]
    Inference,
}

impl ForwardMode {
    pub fn is_training(self) -> bool {
        matches!(self, ForwardMode::Training)
    }
}

impl From<bool> for ForwardMode {
    fn from(training: bool) -> Self {
        if training {
            ForwardMode::Training
        } else {
            ForwardMode::Inference
        }
    }
}

/// Inverted dropout: kept activations are scaled by `1 / (1 - p)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Dropout {
    probability: f32,
}

impl Dropout {
    /// Builds a dropout layer; `probability` must lie in `[0, 1)`.
    pub fn new(probability: f32) -> Result<Self> {
        if !(0.0..1.0).contains(&probability) {
            return Err(Error::Msg(format!(
                "dropout probability must be in [0, 1), got {probability}"
            )));
        }
        Ok(Self { probability })
    }

    pub fn disabled() -> Self {
        Self { probability: 0.0 }
    }

    pub fn probability(&self) -> f32 {
        self.probability
    }

    /// Applies dropout when `mode` is training; otherwise returns the input unchanged.
    pub fn forward(
        &self,
        input: &Tensor,
        mode: ForwardMode,
        policy: &PrecisionPolicy,
    ) -> Result<Tensor> {
        if !mode.is_training() || self.probability == 0.0 {
            return Ok(input.clone());
        }
        let compute = policy.cast_for_matmul(input)?;
        let dropped = ops::dropout(&compute, self.probability)?;
        policy.cast_to_storage(&dropped)
    }
}
