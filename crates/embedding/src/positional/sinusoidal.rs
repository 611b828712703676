//! Fixed sine/cosine positional encodings.
//!
//! For position `p` and feature index `i` the table holds
//! `sin(p / 10000^(2*floor(i/2)/d_model))` on even `i` and the cosine of the
//! same angle on odd `i`. The table depends only on its shape, is built once
//! when the owning encoder or decoder is constructed, and is sliced (never
//! rebuilt) for each sequence.

use candle_core::{bail, DType, Device, Result, Tensor};

/// Base of the geometric frequency progression.
pub const POSITIONAL_BASE: f64 = 10_000.0;

/// Angle used for `position` at feature `index` of a `d_model`-wide table.
pub fn angle(position: usize, index: usize, d_model: usize) -> f64 {
    let exponent = (2 * (index / 2)) as f64 / d_model as f64;
    position as f64 / POSITIONAL_BASE.powf(exponent)
}

/// Read-only `(max_positions, d_model)` table of sinusoidal codes.
#[derive(Debug, Clone)]
pub struct PositionalEncoding {
    table: Tensor,
    max_positions: usize,
    d_model: usize,
}

impl PositionalEncoding {
    /// Builds the `f32` table on `device`.
    pub fn new(max_positions: usize, d_model: usize, device: &Device) -> Result<Self> {
        Self::with_dtype(max_positions, d_model, DType::F32, device)
    }

    /// Builds the table and stores it in `dtype`; values are computed in `f64`.
    pub fn with_dtype(
        max_positions: usize,
        d_model: usize,
        dtype: DType,
        device: &Device,
    ) -> Result<Self> {
        if max_positions == 0 {
            bail!("positional encoding requires max_positions > 0");
        }
        if d_model == 0 {
            bail!("positional encoding requires d_model > 0");
        }

        let mut data = Vec::with_capacity(max_positions * d_model);
        for pos in 0..max_positions {
            for idx in 0..d_model {
                let theta = angle(pos, idx, d_model);
                let value = if idx % 2 == 0 { theta.sin() } else { theta.cos() };
                data.push(value as f32);
            }
        }

        log::debug!("built positional table max_positions={max_positions} d_model={d_model}");
        let table = Tensor::from_vec(data, (max_positions, d_model), device)?.to_dtype(dtype)?;
        Ok(Self {
            table,
            max_positions,
            d_model,
        })
    }

    pub fn table(&self) -> &Tensor {
        &self.table
    }

    pub fn max_positions(&self) -> usize {
        self.max_positions
    }

    pub fn d_model(&self) -> usize {
        self.d_model
    }

    /// Leading `seq_len` rows, shaped `(seq_len, d_model)`.
    pub fn slice(&self, seq_len: usize) -> Result<Tensor> {
        if seq_len > self.max_positions {
            bail!(
                "sequence length {} exceeds positional table size {}",
                seq_len,
                self.max_positions
            );
        }
        self.table.narrow(0, 0, seq_len)
    }

    /// Adds the positional codes to `hidden` shaped `(batch, seq, d_model)`.
    pub fn add_to(&self, hidden: &Tensor) -> Result<Tensor> {
        let (_, seq_len, d_model) = hidden.dims3()?;
        if d_model != self.d_model {
            bail!(
                "positional encoding width {} does not match hidden width {}",
                self.d_model,
                d_model
            );
        }
        let codes = self.slice(seq_len)?.to_dtype(hidden.dtype())?;
        hidden.broadcast_add(&codes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_position_alternates_zero_and_one() -> Result<()> {
        let pe = PositionalEncoding::new(4, 6, &Device::Cpu)?;
        let row = pe.table().get(0)?.to_vec1::<f32>()?;
        assert_eq!(row, vec![0.0, 1.0, 0.0, 1.0, 0.0, 1.0]);
        Ok(())
    }

    #[test]
    fn even_columns_share_frequency_with_next_odd_column() -> Result<()> {
        let d_model = 8;
        for index in (0..d_model).step_by(2) {
            assert_eq!(angle(7, index, d_model), angle(7, index + 1, d_model));
        }
        assert!(angle(7, 0, d_model) > angle(7, 2, d_model));
        Ok(())
    }

    #[test]
    fn table_entries_use_shared_angle() -> Result<()> {
        let pe = PositionalEncoding::new(4, 8, &Device::Cpu)?;
        let row = pe.table().get(3)?.to_vec1::<f32>()?;
        // 3 / 10000^(4/8) = 0.03
        assert!((angle(3, 4, 8) - 0.03).abs() < 1e-12);
        assert!((row[4] - 0.03f64.sin() as f32).abs() < 1e-6);
        assert!((row[5] - 0.03f64.cos() as f32).abs() < 1e-6);
        assert!((row[0] - 3.0f64.sin() as f32).abs() < 1e-6);
        Ok(())
    }

    #[test]
    fn slice_is_a_prefix_and_bounds_are_checked() -> Result<()> {
        let pe = PositionalEncoding::new(10, 4, &Device::Cpu)?;
        let slice = pe.slice(3)?;
        assert_eq!(slice.dims(), &[3, 4]);
        assert_eq!(
            slice.to_vec2::<f32>()?,
            pe.table().narrow(0, 0, 3)?.to_vec2::<f32>()?
        );
        assert!(pe.slice(11).is_err());
        Ok(())
    }

    #[test]
    fn add_to_broadcasts_over_batch() -> Result<()> {
        let device = Device::Cpu;
        let pe = PositionalEncoding::new(5, 4, &device)?;
        let hidden = Tensor::zeros((2, 5, 4), DType::F32, &device)?;
        let out = pe.add_to(&hidden)?;
        assert_eq!(out.dims(), &[2, 5, 4]);
        assert_eq!(out.get(1)?.to_vec2::<f32>()?, pe.table().to_vec2::<f32>()?);

        let wrong = Tensor::zeros((1, 5, 6), DType::F32, &device)?;
        assert!(pe.add_to(&wrong).is_err());
        Ok(())
    }

    #[test]
    fn rejects_empty_shapes() {
        assert!(PositionalEncoding::new(0, 4, &Device::Cpu).is_err());
        assert!(PositionalEncoding::new(4, 0, &Device::Cpu).is_err());
    }
}
