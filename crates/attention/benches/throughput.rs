//! Throughput benchmark for the reference kernel and multi-head attention.
//! Run with: `cargo bench -p attention --bench throughput`

use attention::masks::causal_mask;
use attention::{Attention, Config, MultiHeadAttention, ScaledDotProductAttention};
use candle_core::{DType, Device, Tensor};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use layers::PrecisionPolicy;

fn bench_kernel(c: &mut Criterion) {
    let device = Device::Cpu;
    let (batch, heads, depth) = (2usize, 4usize, 64usize);

    for dtype in [DType::F32, DType::BF16] {
        let mut group = c.benchmark_group(format!("sdpa/{dtype:?}"));
        for seq_len in [128usize, 512] {
            let shape = (batch, heads, seq_len, depth);
            let q = Tensor::rand(0.0f32, 1.0, shape, &device)
                .and_then(|t| t.to_dtype(dtype))
                .expect("q");
            let k = Tensor::rand(0.0f32, 1.0, shape, &device)
                .and_then(|t| t.to_dtype(dtype))
                .expect("k");
            let v = Tensor::rand(0.0f32, 1.0, shape, &device)
                .and_then(|t| t.to_dtype(dtype))
                .expect("v");
            let mask = causal_mask(&device, seq_len).expect("mask");
            let kernel = ScaledDotProductAttention::new();
            let config = Config::default();

            group.throughput(Throughput::Elements((batch * heads * seq_len) as u64));
            group.bench_with_input(BenchmarkId::new("causal", seq_len), &seq_len, |b, _| {
                b.iter(|| {
                    let out = kernel
                        .attend(black_box(&q), &k, &v, Some(&mask), &config)
                        .expect("attend");
                    black_box(out);
                });
            });
        }
        group.finish();
    }
}

fn bench_multi_head(c: &mut Criterion) {
    let device = Device::Cpu;
    let (batch, d_model, heads) = (2usize, 512usize, 8usize);
    let mut group = c.benchmark_group("mha/F32");

    for seq_len in [64usize, 256] {
        let mha = MultiHeadAttention::with_init(d_model, heads, Config::default(), &device, DType::F32)
            .expect("mha init");
        let x = Tensor::randn(0f32, 1.0, (batch, seq_len, d_model), &device).expect("input");
        let policy = PrecisionPolicy::from_parameter_dtype(DType::F32);

        group.throughput(Throughput::Elements((batch * seq_len) as u64));
        group.bench_with_input(BenchmarkId::new("self", seq_len), &seq_len, |b, _| {
            b.iter(|| {
                let out = mha
                    .forward(black_box(&x), &x, &x, None, &policy)
                    .expect("forward");
                black_box(out);
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_kernel, bench_multi_head);
criterion_main!(benches);
