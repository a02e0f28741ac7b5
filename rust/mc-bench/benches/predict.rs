use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use mc_infer::{init_bilinear, BilinearModel, EngineSettings, InferenceEngine, PredictOptions};
use mc_oracle::{LegalMoveOracle, StandardChess};
use mc_vocab::{BuildOptions, Vocabulary};

fn history() -> Vec<String> {
    ["e4", "e5", "Nf3", "Nc6", "Bb5", "a6", "Ba4", "Nf6", "O-O", "Be7", "Re1", "b5", "Bb3", "d6"]
        .iter()
        .map(|m| m.to_string())
        .collect()
}

fn bench_legal_moves(c: &mut Criterion) {
    let h = history();
    c.bench_function("mc_oracle/legal_moves_ruy_lopez", |b| {
        b.iter(|| black_box(StandardChess.legal_moves(black_box(&h)).unwrap()))
    });
}

fn bench_predict_next(c: &mut Criterion) {
    let h = history();
    let vocab = Arc::new(Vocabulary::build(&[h.clone()], &BuildOptions::default()));
    let weights = init_bilinear(vocab.len(), 32, 7);
    let engine = InferenceEngine::new(
        vocab,
        Arc::new(weights),
        Arc::new(BilinearModel::new(8)),
        Arc::new(StandardChess),
        EngineSettings::default(),
    )
    .unwrap();
    let opts = PredictOptions::new(5, 1.0);
    c.bench_function("mc_infer/predict_next_ruy_lopez", |b| {
        b.iter(|| black_box(engine.predict_next(black_box(&h), &opts).unwrap()))
    });
}

criterion_group!(benches, bench_legal_moves, bench_predict_next);
criterion_main!(benches);
