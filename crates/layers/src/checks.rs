//! Lightweight validation helpers shared across layer components.
//!
//! Every helper takes a `context` label naming the tensor under inspection so
//! error messages point at the offending parameter or activation. They return
//! `candle_core::Result<()>` so call sites propagate with `?`.

use candle_core::{DType, Error, Result, Tensor};

/// Ensures a tensor matches the expected dimensions exactly.
pub fn expect_shape(context: &str, tensor: &Tensor, expected: &[usize]) -> Result<()> {
    let actual = tensor.dims();
    if actual == expected {
        Ok(())
    } else {
        Err(Error::Msg(format!(
            "{context}: expected shape {:?}, got {:?}",
            expected, actual
        )))
    }
}

/// Ensures a tensor has the expected number of dimensions.
pub fn expect_rank(context: &str, tensor: &Tensor, rank: usize) -> Result<()> {
    let dims = tensor.dims();
    if dims.len() == rank {
        Ok(())
    } else {
        Err(Error::Msg(format!(
            "{context}: expected rank {rank}, got shape {:?}",
            dims
        )))
    }
}

/// Validates the `(batch, seq, hidden)` convention with a known hidden size.
pub fn expect_batch_seq_hidden(context: &str, tensor: &Tensor, hidden: usize) -> Result<()> {
    match tensor.dims() {
        [_, _, actual_hidden] if *actual_hidden == hidden => Ok(()),
        dims => Err(Error::Msg(format!(
            "{context}: expected (batch, seq, {hidden}) layout, got {:?}",
            dims
        ))),
    }
}

/// Checks the tensor dtype is one of the allowed values.
pub fn expect_dtype_in(context: &str, tensor: &Tensor, allowed: &[DType]) -> Result<()> {
    let dtype = tensor.dtype();
    if allowed.contains(&dtype) {
        Ok(())
    } else {
        Err(Error::Msg(format!(
            "{context}: expected dtype in {:?}, got {:?}",
            allowed, dtype
        )))
    }
}

/// Parameters are stored contiguously so matmuls never see strided weights.
pub fn expect_contiguous(context: &str, tensor: &Tensor) -> Result<()> {
    if tensor.is_contiguous() {
        Ok(())
    } else {
        Err(Error::Msg(format!("{context}: tensor must be contiguous")))
    }
}

/// Ensures two tensors share a dtype.
pub fn expect_same_dtype(
    left_context: &str,
    left: &Tensor,
    right_context: &str,
    right: &Tensor,
) -> Result<()> {
    if left.dtype() == right.dtype() {
        Ok(())
    } else {
        Err(Error::Msg(format!(
            "{left_context} has dtype {:?} but {right_context} has dtype {:?}",
            left.dtype(),
            right.dtype()
        )))
    }
}

/// Floating dtypes accepted for parameters and activations.
pub const FLOAT_DTYPES: [DType; 3] = [DType::F16, DType::BF16, DType::F32];

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;

    #[test]
    fn shape_mismatch_names_the_context() -> Result<()> {
        let tensor = Tensor::zeros((2, 3, 4), DType::F32, &Device::Cpu)?;
        expect_shape("hidden", &tensor, &[2, 3, 4])?;
        let err = expect_shape("hidden", &tensor, &[2, 3, 5]).unwrap_err();
        assert!(err.to_string().contains("hidden"));
        Ok(())
    }

    #[test]
    fn batch_seq_hidden_rejects_wrong_rank() -> Result<()> {
        let tensor = Tensor::zeros((3, 4), DType::F32, &Device::Cpu)?;
        assert!(expect_batch_seq_hidden("input", &tensor, 4).is_err());
        assert!(expect_rank("input", &tensor, 2).is_ok());
        Ok(())
    }

    #[test]
    fn dtype_checks() -> Result<()> {
        let device = Device::Cpu;
        let f32_tensor = Tensor::zeros(4, DType::F32, &device)?;
        let ids = Tensor::zeros(4, DType::U32, &device)?;
        assert!(expect_dtype_in("weight", &f32_tensor, &FLOAT_DTYPES).is_ok());
        assert!(expect_dtype_in("weight", &ids, &FLOAT_DTYPES).is_err());
        assert!(expect_same_dtype("a", &f32_tensor, "b", &ids).is_err());
        Ok(())
    }
}
