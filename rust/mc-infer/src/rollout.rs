//! Seeded self-play continuation from a move history.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use tracing::debug;

use crate::cancel::CancelToken;
use crate::engine::{check_cancel, InferenceEngine, PredictError};
use mc_oracle::TerminalKind;

#[derive(Debug, Clone)]
pub struct RolloutOptions {
    /// Maximum moves to append.
    pub plies: usize,
    pub temperature: f32,
    pub seed: u64,
    pub adapters: Vec<String>,
    /// Stop when `<EOS>` is sampled instead of a move.
    pub allow_end_of_game: bool,
    pub cancel: Option<CancelToken>,
}

impl Default for RolloutOptions {
    fn default() -> Self {
        Self {
            plies: 40,
            temperature: 1.0,
            seed: 0,
            adapters: Vec::new(),
            allow_end_of_game: true,
            cancel: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RolloutEnd {
    PlyLimit,
    Terminal(TerminalKind),
    EndOfGame,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Rollout {
    /// Moves appended after the input history.
    pub moves: Vec<String>,
    pub end: RolloutEnd,
}

/// Index drawn from unnormalized non-negative `weights`.
fn sample(rng: &mut ChaCha8Rng, weights: &[f32]) -> Option<usize> {
    let total: f32 = weights.iter().sum();
    if weights.is_empty() || !(total.is_finite() && total > 0.0) {
        return None;
    }
    let mut x = rng.gen::<f32>() * total;
    for (i, &w) in weights.iter().enumerate() {
        if x < w {
            return Some(i);
        }
        x -= w;
    }
    // Rounding left a little mass past the end: take the last positive weight.
    weights.iter().rposition(|&w| w > 0.0)
}

impl InferenceEngine {
    /// Extend `history` by sampling from the masked distribution each ply.
    ///
    /// Every appended move is legal; the same seed reproduces the same rollout.
    pub fn rollout(&self, history: &[String], opts: &RolloutOptions) -> Result<Rollout, PredictError> {
        if !opts.temperature.is_finite() || opts.temperature <= 0.0 {
            return Err(PredictError::input(
                "temperature",
                format!("must be finite and > 0, got {}", opts.temperature),
            ));
        }
        let cancel = opts.cancel.as_ref();
        let (weights, _) = self.weights_for(&opts.adapters)?;
        let mut rng = ChaCha8Rng::seed_from_u64(opts.seed);
        let mut line: Vec<String> = history.to_vec();
        let mut moves = Vec::new();

        let end = loop {
            if moves.len() >= opts.plies {
                break RolloutEnd::PlyLimit;
            }
            check_cancel(cancel)?;
            let position = self.position(&line)?;
            if position.legal.is_empty() {
                match position.terminal {
                    Some(kind) => break RolloutEnd::Terminal(kind),
                    None => break RolloutEnd::EndOfGame,
                }
            }
            let scored = self.score(&line, &position, &weights, opts.temperature, cancel)?;
            let choices = scored.weighted_moves();
            let mut ws: Vec<f32> = choices.iter().map(|&(_, w)| w).collect();
            if opts.allow_end_of_game && !scored.is_fallback() {
                ws.push(scored.eos());
            }
            match sample(&mut rng, &ws) {
                Some(i) if i < choices.len() => {
                    let mv = choices[i].0.to_string();
                    line.push(mv.clone());
                    moves.push(mv);
                }
                Some(_) => break RolloutEnd::EndOfGame,
                // No mass on any move: take the first legal one.
                None => {
                    let Some(mv) = position.legal.iter().next().cloned() else {
                        break RolloutEnd::EndOfGame;
                    };
                    line.push(mv.clone());
                    moves.push(mv);
                }
            }
        };
        debug!(start_len = history.len(), appended = moves.len(), ?end, "rollout");
        Ok(Rollout { moves, end })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_respects_zero_weights() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        for _ in 0..200 {
            let i = sample(&mut rng, &[0.0, 1.0, 0.0, 2.0]).unwrap();
            assert!(i == 1 || i == 3);
        }
    }

    #[test]
    fn sample_rejects_empty_or_zero_mass() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        assert_eq!(sample(&mut rng, &[]), None);
        assert_eq!(sample(&mut rng, &[0.0, 0.0]), None);
        assert_eq!(sample(&mut rng, &[f32::NAN]), None);
    }
}
