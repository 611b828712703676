//! Builders for look-ahead (causal) masks.

use candle_core::{Device, Result, Tensor};

/// Strictly upper-triangular `[size, size]` mask: entry `(i, j)` is `1.0`
/// when `j > i`, hiding future positions from query `i`.
pub fn causal_mask(device: &Device, size: usize) -> Result<Tensor> {
    let mut data = vec![0f32; size * size];
    for q in 0..size {
        let row_start = q * size;
        for k in (q + 1)..size {
            data[row_start + k] = 1.0;
        }
    }
    Tensor::from_vec(data, (size, size), device)
}
