use anyhow::Result;
use candle_core::Device;
use embedding::positional::sinusoidal::{angle, PositionalEncoding};

#[test]
fn table_matches_closed_form() -> Result<()> {
    let (max_positions, d_model) = (50, 16);
    let pe = PositionalEncoding::new(max_positions, d_model, &Device::Cpu)?;
    assert_eq!(pe.table().dims(), &[max_positions, d_model]);

    let rows = pe.table().to_vec2::<f32>()?;
    for (pos, row) in rows.iter().enumerate() {
        for (i, value) in row.iter().enumerate() {
            let theta = angle(pos, i, d_model);
            let expected = if i % 2 == 0 { theta.sin() } else { theta.cos() } as f32;
            assert!(
                (value - expected).abs() < 1e-6,
                "pos {pos} dim {i}: {value} vs {expected}"
            );
        }
    }
    Ok(())
}

#[test]
fn construction_is_deterministic() -> Result<()> {
    let device = Device::Cpu;
    let a = PositionalEncoding::new(32, 10, &device)?;
    let b = PositionalEncoding::new(32, 10, &device)?;
    assert_eq!(a.table().to_vec2::<f32>()?, b.table().to_vec2::<f32>()?);
    Ok(())
}

#[test]
fn odd_feature_widths_are_supported() -> Result<()> {
    let pe = PositionalEncoding::new(6, 5, &Device::Cpu)?;
    let last_column = pe.table().narrow(1, 4, 1)?.flatten_all()?.to_vec1::<f32>()?;
    for (pos, value) in last_column.iter().enumerate() {
        assert!((value - (angle(pos, 4, 5).sin() as f32)).abs() < 1e-6);
    }
    Ok(())
}
