//! Criterion benchmarks for the hot paths; see `benches/`.
