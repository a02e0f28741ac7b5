use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use mc_adapter::{apply_adapters, AdapterDelta, Matrix};
use mc_infer::{init_bilinear, W_OUTPUT};

const DIM: usize = 64;

fn delta(vocab: usize, rank: usize) -> AdapterDelta {
    let a = Matrix::new(rank, DIM, vec![0.01; rank * DIM]).unwrap();
    let b = Matrix::new(vocab, rank, vec![0.02; vocab * rank]).unwrap();
    AdapterDelta::new(W_OUTPUT, a, b, rank as f32).unwrap()
}

fn bench_apply(c: &mut Criterion) {
    let mut g = c.benchmark_group("mc_adapter");
    for &vocab in &[512usize, 4096usize] {
        let base = init_bilinear(vocab, DIM, 1);
        let deltas = vec![delta(vocab, 4), delta(vocab, 8)];
        g.bench_with_input(BenchmarkId::new("apply_two_adapters", vocab), &deltas, |b, d| {
            b.iter(|| black_box(apply_adapters(black_box(&base), d).unwrap()))
        });
    }
    g.finish();
}

criterion_group!(benches, bench_apply);
criterion_main!(benches);
