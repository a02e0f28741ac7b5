//! Scoring model seam: `TokenizedSequence → logits over the vocabulary`.

use mc_adapter::{AdapterError, Matrix, WeightView};
use mc_vocab::{TokenId, TokenizedSequence};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use thiserror::Error;

pub const W_EMBEDDING: &str = "embedding";
pub const W_CONTEXT: &str = "context";
pub const W_OUTPUT: &str = "output";

#[derive(Debug, Error)]
pub enum ScoreError {
    #[error("weights: {0}")]
    Weights(#[from] AdapterError),
    #[error("tensor {tensor:?} has shape {got:?}, expected {expected:?}")]
    ShapeMismatch {
        tensor: &'static str,
        expected: (usize, usize),
        got: (usize, usize),
    },
    #[error("model produced {got} logits for a vocabulary of {expected}")]
    VocabMismatch { expected: usize, got: usize },
    #[error("token id {0} is outside the embedding table")]
    TokenOutOfRange(TokenId),
    #[error("empty input sequence")]
    EmptyInput,
}

pub trait ScoringModel: Send + Sync {
    /// Logits for the token following `seq`, one per vocabulary id.
    fn logits(&self, weights: &WeightView, seq: &TokenizedSequence) -> Result<Vec<f32>, ScoreError>;

    /// Validate a weight view once at load time.
    fn check_weights(&self, _weights: &WeightView, _vocab_size: usize) -> Result<(), ScoreError> {
        Ok(())
    }
}

/// Constant logits; every allowed move ends up equally likely.
#[derive(Debug, Clone, Copy)]
pub struct UniformModel {
    pub vocab_size: usize,
}

impl ScoringModel for UniformModel {
    fn logits(&self, _weights: &WeightView, seq: &TokenizedSequence) -> Result<Vec<f32>, ScoreError> {
        if seq.is_empty() {
            return Err(ScoreError::EmptyInput);
        }
        Ok(vec![0.0; self.vocab_size])
    }
}

/// Embedding + averaged context + output projection.
///
/// With `E = embedding [V×d]`, `C = context [d×d]`, `O = output [V×d]`:
/// `h = E[last] + C · mean(E[prev_k])` over the `history_window` tokens before
/// the last one, and `logits = O · h`.
#[derive(Debug, Clone, Copy)]
pub struct BilinearModel {
    pub history_window: usize,
}

impl BilinearModel {
    pub fn new(history_window: usize) -> Self {
        Self { history_window }
    }
}

fn check_shape(
    weights: &WeightView,
    tensor: &'static str,
    expected: (usize, usize),
) -> Result<(), ScoreError> {
    let got = weights.matrix(tensor)?.shape();
    if got != expected {
        return Err(ScoreError::ShapeMismatch {
            tensor,
            expected,
            got,
        });
    }
    Ok(())
}

impl ScoringModel for BilinearModel {
    fn logits(&self, weights: &WeightView, seq: &TokenizedSequence) -> Result<Vec<f32>, ScoreError> {
        let emb = weights.matrix(W_EMBEDDING)?;
        let ctx = weights.matrix(W_CONTEXT)?;
        let out = weights.matrix(W_OUTPUT)?;

        let ids = seq.ids();
        let (&last, prev) = ids.split_last().ok_or(ScoreError::EmptyInput)?;
        let row = |id: TokenId| {
            if (id as usize) < emb.rows() {
                Ok(emb.row(id as usize))
            } else {
                Err(ScoreError::TokenOutOfRange(id))
            }
        };

        let mut hidden = row(last)?.to_vec();
        let recent = &prev[prev.len().saturating_sub(self.history_window)..];
        if !recent.is_empty() {
            let mut mean = vec![0.0f32; emb.cols()];
            for &id in recent {
                for (m, v) in mean.iter_mut().zip(row(id)?) {
                    *m += v;
                }
            }
            let inv = 1.0 / recent.len() as f32;
            mean.iter_mut().for_each(|m| *m *= inv);
            for (h, c) in hidden.iter_mut().zip(ctx.matvec(&mean)?) {
                *h += c;
            }
        }
        Ok(out.matvec(&hidden)?)
    }

    fn check_weights(&self, weights: &WeightView, vocab_size: usize) -> Result<(), ScoreError> {
        let d = weights.matrix(W_EMBEDDING)?.cols();
        check_shape(weights, W_EMBEDDING, (vocab_size, d))?;
        check_shape(weights, W_CONTEXT, (d, d))?;
        check_shape(weights, W_OUTPUT, (vocab_size, d))?;
        Ok(())
    }
}

/// Seeded random weights for a [`BilinearModel`] over `vocab_size` tokens.
pub fn init_bilinear(vocab_size: usize, dim: usize, seed: u64) -> WeightView {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let scale = 1.0 / (dim.max(1) as f32).sqrt();
    let mut fill = |rows: usize, cols: usize| {
        let data: Vec<f32> = (0..rows * cols)
            .map(|_| rng.gen_range(-scale..=scale))
            .collect();
        Matrix::new(rows, cols, data).unwrap_or_else(|_| Matrix::zeros(rows, cols))
    };
    let mut view = WeightView::new();
    view.insert(W_EMBEDDING, fill(vocab_size, dim));
    view.insert(W_CONTEXT, fill(dim, dim));
    view.insert(W_OUTPUT, fill(vocab_size, dim));
    view
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny() -> WeightView {
        // V = 5, d = 2
        let mut w = WeightView::new();
        w.insert(
            W_EMBEDDING,
            Matrix::new(5, 2, vec![0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 1.0, 1.0]).unwrap(),
        );
        w.insert(W_CONTEXT, Matrix::new(2, 2, vec![1.0, 0.0, 0.0, 1.0]).unwrap());
        w.insert(
            W_OUTPUT,
            Matrix::new(5, 2, vec![0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 1.0, -1.0]).unwrap(),
        );
        w
    }

    #[test]
    fn bilinear_logits_follow_the_formula() {
        let m = BilinearModel::new(4);
        let w = tiny();
        m.check_weights(&w, 5).unwrap();
        // last = 3 -> e=[0,1]; prev = [2] -> mean=[1,0]; h = [1,1]
        let l = m.logits(&w, &TokenizedSequence::from_ids(vec![2, 3])).unwrap();
        assert_eq!(l, vec![0.0, 0.0, 1.0, 1.0, 0.0]);
        // Only the last token: h = e[3] = [0,1]
        let l = m.logits(&w, &TokenizedSequence::from_ids(vec![3])).unwrap();
        assert_eq!(l, vec![0.0, 0.0, 0.0, 1.0, -1.0]);
    }

    #[test]
    fn history_window_zero_ignores_context() {
        let w = tiny();
        let seq = TokenizedSequence::from_ids(vec![2, 4, 3]);
        let a = BilinearModel::new(0).logits(&w, &seq).unwrap();
        let b = BilinearModel::new(0)
            .logits(&w, &TokenizedSequence::from_ids(vec![3]))
            .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn out_of_range_and_empty_inputs_fail() {
        let m = BilinearModel::new(2);
        let w = tiny();
        assert!(matches!(
            m.logits(&w, &TokenizedSequence::from_ids(vec![9])),
            Err(ScoreError::TokenOutOfRange(9))
        ));
        assert!(matches!(
            m.logits(&w, &TokenizedSequence::from_ids(vec![])),
            Err(ScoreError::EmptyInput)
        ));
    }

    #[test]
    fn check_weights_rejects_wrong_vocab_size() {
        let m = BilinearModel::new(2);
        assert!(matches!(
            m.check_weights(&tiny(), 6),
            Err(ScoreError::ShapeMismatch { tensor: W_EMBEDDING, .. })
        ));
        let full = tiny();
        let mut missing = WeightView::new();
        for n in full.names().filter(|n| *n != W_CONTEXT) {
            missing.insert(n, full.matrix(n).unwrap().clone());
        }
        assert!(matches!(
            m.check_weights(&missing, 5),
            Err(ScoreError::Weights(AdapterError::MissingTensor(_)))
        ));
    }

    #[test]
    fn init_is_seeded() {
        let a = init_bilinear(10, 4, 7);
        let b = init_bilinear(10, 4, 7);
        let c = init_bilinear(10, 4, 8);
        assert!(a.bits_eq(&b));
        assert!(!a.bits_eq(&c));
        BilinearModel::new(3).check_weights(&a, 10).unwrap();
    }
}
