//! Next-move inference constrained to legal chess moves.
//!
//! The engine scores a move history with a pluggable [`ScoringModel`], masks
//! the logits to the oracle's legal set plus `<EOS>`, and returns ranked,
//! renormalized suggestions. LoRA adapters are merged per request from an
//! atomically swapped catalog.

pub mod cancel;
pub mod decode;
pub mod engine;
pub mod eval;
pub mod init;
pub mod metrics;
pub mod rollout;
pub mod scorer;

pub use cancel::CancelToken;
pub use decode::{masked_softmax, renormalize, top_k};
pub use engine::{
    Candidate, EngineSettings, InferenceEngine, PredictError, PredictOptions, Prediction,
};
pub use eval::{perplexity, sequence_nll, EvalReport};
pub use init::InitError;
pub use metrics::{EngineMetrics, MetricsSnapshot};
pub use rollout::{Rollout, RolloutEnd, RolloutOptions};
pub use scorer::{
    init_bilinear, BilinearModel, ScoreError, ScoringModel, UniformModel, W_CONTEXT, W_EMBEDDING,
    W_OUTPUT,
};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_is_nonempty() {
        assert!(!VERSION.is_empty());
    }
}
