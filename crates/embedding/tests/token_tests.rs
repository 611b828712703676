use anyhow::Result;
use candle_core::{DType, Device, Tensor};
use embedding::token::{TokenEmbedding, TokenEmbeddingConfig, EMBEDDING_INIT_RANGE};

fn make_ids(data: &[i64], shape: (usize, usize)) -> Result<Tensor> {
    Ok(Tensor::from_slice(data, shape, &Device::Cpu)?)
}

fn config(vocab_size: usize, hidden_dim: usize, dtype: DType) -> TokenEmbeddingConfig {
    TokenEmbeddingConfig {
        vocab_size,
        hidden_dim,
        dtype,
        device: Device::Cpu,
    }
}

#[test]
fn forward_shape_and_dtype_match_config() -> Result<()> {
    let config = config(8, 4, DType::F16);
    let embedding = TokenEmbedding::new(config.clone())?;
    let token_ids = make_ids(&[0, 1, 2, 3], (2, 2))?;

    let output = embedding.forward(&token_ids)?;

    assert_eq!(output.dims(), &[2, 2, config.hidden_dim]);
    assert_eq!(output.dtype(), config.dtype);
    Ok(())
}

#[test]
fn fresh_tables_stay_within_init_range() -> Result<()> {
    let embedding = TokenEmbedding::new(config(64, 16, DType::F32))?;
    let max = embedding.weight().abs()?.max_all()?.to_vec0::<f32>()?;
    assert!(max <= EMBEDDING_INIT_RANGE);
    assert_eq!(embedding.num_parameters(), 64 * 16);
    Ok(())
}

#[test]
fn lookup_returns_table_rows() -> Result<()> {
    let weight = Tensor::arange(0f32, 12.0, &Device::Cpu)?.reshape((4, 3))?;
    let embedding = TokenEmbedding::from_weight(config(4, 3, DType::F32), weight)?;
    let ids = Tensor::from_slice(&[3u32, 0], (1, 2), &Device::Cpu)?;

    let rows = embedding.forward(&ids)?.squeeze(0)?.to_vec2::<f32>()?;
    assert_eq!(rows, vec![vec![9.0, 10.0, 11.0], vec![0.0, 1.0, 2.0]]);
    Ok(())
}

#[test]
fn forward_rejects_out_of_range_ids() -> Result<()> {
    let embedding = TokenEmbedding::new(config(4, 3, DType::F32))?;
    let token_ids = make_ids(&[0, 4], (1, 2))?;

    let err = embedding.forward(&token_ids).unwrap_err();
    assert!(err.to_string().contains("token id 4 exceeds vocab size"));

    let negative = make_ids(&[-1, 2], (1, 2))?;
    assert!(embedding.forward(&negative).is_err());
    Ok(())
}

#[test]
fn forward_rejects_float_ids_and_wrong_rank() -> Result<()> {
    let embedding = TokenEmbedding::new(config(4, 3, DType::F32))?;
    let floats = Tensor::zeros((1, 2), DType::F32, &Device::Cpu)?;
    assert!(embedding.forward(&floats).is_err());

    let flat = Tensor::from_slice(&[1i64, 2], 2, &Device::Cpu)?;
    assert!(embedding.forward(&flat).is_err());
    Ok(())
}
