//! Token embedding lookup table.

use candle_core::{bail, DType, Device, Error, Result, Tensor};
use layers::checks;

/// Half-width of the uniform range used to sample fresh embedding tables.
pub const EMBEDDING_INIT_RANGE: f32 = 0.05;

/// Configuration for building a token embedding table.
#[derive(Debug, Clone)]
pub struct TokenEmbeddingConfig {
    /// Size of the vocabulary (number of distinct tokens).
    pub vocab_size: usize,
    /// Dimensionality of each embedding vector.
    pub hidden_dim: usize,
    /// Storage dtype used for the underlying parameters and outputs.
    pub dtype: DType,
    /// Device hosting the parameters.
    pub device: Device,
}

/// Learnable `(vocab_size, hidden_dim)` embedding table.
#[derive(Debug, Clone)]
pub struct TokenEmbedding {
    config: TokenEmbeddingConfig,
    weight: Tensor,
}

impl TokenEmbedding {
    /// Builds a new table sampled from `U(-0.05, 0.05)`.
    ///
    /// The small range keeps fresh embeddings well below the unit-magnitude
    /// positional codes until the `sqrt(d_model)` scale in the encoder and
    /// decoder stacks is applied.
    pub fn new(config: TokenEmbeddingConfig) -> Result<Self> {
        Self::validate_config(&config)?;
        let weight = Tensor::rand(
            -EMBEDDING_INIT_RANGE,
            EMBEDDING_INIT_RANGE,
            (config.vocab_size, config.hidden_dim),
            &config.device,
        )?
        .to_dtype(config.dtype)?;
        Ok(Self { config, weight })
    }

    /// Wraps an existing table (e.g. weights produced by an external trainer).
    pub fn from_weight(config: TokenEmbeddingConfig, weight: Tensor) -> Result<Self> {
        Self::validate_config(&config)?;
        checks::expect_shape(
            "embedding.weight",
            &weight,
            &[config.vocab_size, config.hidden_dim],
        )?;
        checks::expect_dtype_in("embedding.weight", &weight, &checks::FLOAT_DTYPES)?;
        let weight = weight.to_dtype(config.dtype)?;
        Ok(Self { config, weight })
    }

    pub fn config(&self) -> &TokenEmbeddingConfig {
        &self.config
    }

    pub fn weight(&self) -> &Tensor {
        &self.weight
    }

    pub fn num_parameters(&self) -> usize {
        self.config.vocab_size * self.config.hidden_dim
    }

    /// Looks up embeddings for the provided token ids.
    ///
    /// Inputs must be shaped `(batch, seq)` with an integer dtype. Outputs follow the
    /// `(batch, seq, hidden)` layout using the configured storage dtype.
    pub fn forward(&self, token_ids: &Tensor) -> Result<Tensor> {
        let (batch, seq) = self.validate_token_ids(token_ids)?;

        let flat = token_ids.to_dtype(DType::I64)?.flatten_all()?;
        self.ensure_id_range(&flat)?;

        let gathered = self.weight.index_select(&flat, 0)?;
        gathered.reshape((batch, seq, self.config.hidden_dim))
    }

    fn validate_config(config: &TokenEmbeddingConfig) -> Result<()> {
        if config.vocab_size == 0 {
            bail!("token embedding requires vocab_size > 0");
        }
        if config.hidden_dim == 0 {
            bail!("token embedding requires hidden_dim > 0");
        }
        Ok(())
    }

    fn validate_token_ids(&self, token_ids: &Tensor) -> Result<(usize, usize)> {
        let (batch, seq) = match token_ids.dims() {
            [batch, seq] if *batch > 0 && *seq > 0 => (*batch, *seq),
            [_, _] => {
                return Err(Error::Msg(
                    "token_ids must have non-zero batch and seq dimensions".into(),
                ))
            }
            _ => return Err(Error::Msg("token_ids must be shaped [batch, seq]".into())),
        };

        if !token_ids.dtype().is_int() {
            return Err(Error::Msg(format!(
                "token_ids expected integer dtype but received {:?}",
                token_ids.dtype()
            )));
        }
        Ok((batch, seq))
    }

    fn ensure_id_range(&self, flat_ids: &Tensor) -> Result<()> {
        let min_id = flat_ids.min(0)?.to_scalar::<i64>()?;
        if min_id < 0 {
            bail!("encountered negative token id {}", min_id);
        }
        let max_id = flat_ids.max(0)?.to_scalar::<i64>()?;
        let vocab = self.config.vocab_size as i64;
        if max_id >= vocab {
            bail!("token id {} exceeds vocab size {}", max_id, vocab);
        }
        Ok(())
    }
}
