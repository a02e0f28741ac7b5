//! Offline evaluation: top-1 legal-move accuracy and token perplexity.

use mc_adapter::WeightView;
use mc_oracle::normalize_san;
use mc_vocab::{TokenizedSequence, PAD_ID};
use serde::Serialize;
use tracing::info;

use crate::engine::{InferenceEngine, PredictError, PredictOptions};
use crate::scorer::{ScoreError, ScoringModel};

/// Summed negative log-likelihood (nats) of each next token given its prefix,
/// and the number of tokens scored. PAD targets are skipped.
pub fn sequence_nll(
    model: &dyn ScoringModel,
    weights: &WeightView,
    seq: &TokenizedSequence,
) -> Result<(f64, usize), ScoreError> {
    let ids = seq.ids();
    let mut nll = 0.0f64;
    let mut n = 0usize;
    for i in 1..ids.len() {
        let target = ids[i];
        if target == PAD_ID {
            continue;
        }
        let prefix = TokenizedSequence::from_ids(ids[..i].to_vec());
        let logits = model.logits(weights, &prefix)?;
        let t = target as usize;
        if t >= logits.len() {
            return Err(ScoreError::VocabMismatch {
                expected: t + 1,
                got: logits.len(),
            });
        }
        let max = logits
            .iter()
            .copied()
            .filter(|l| l.is_finite())
            .fold(f32::NEG_INFINITY, f32::max) as f64;
        let lse = max
            + logits
                .iter()
                .filter(|l| l.is_finite())
                .map(|&l| (l as f64 - max).exp())
                .sum::<f64>()
                .ln();
        nll += lse - logits[t] as f64;
        n += 1;
    }
    Ok((nll, n))
}

/// `exp(mean NLL)` over the scored tokens of `seq`.
pub fn perplexity(
    model: &dyn ScoringModel,
    weights: &WeightView,
    seq: &TokenizedSequence,
) -> Result<f64, ScoreError> {
    let (nll, n) = sequence_nll(model, weights, seq)?;
    if n == 0 {
        return Err(ScoreError::EmptyInput);
    }
    Ok((nll / n as f64).exp())
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EvalReport {
    pub games: usize,
    /// Positions where the played move was checked against the top suggestion.
    pub positions: u64,
    pub top1_hits: u64,
    pub accuracy: f64,
    /// Moves after an illegal one in the same game are skipped.
    pub skipped_moves: u64,
    pub tokens: u64,
    pub perplexity: f64,
}

impl InferenceEngine {
    /// Replay each game, asking for the top suggestion before every move.
    pub fn evaluate(
        &self,
        games: &[Vec<String>],
        adapters: &[String],
    ) -> Result<EvalReport, PredictError> {
        let opts = PredictOptions::new(1, 1.0).with_adapters(adapters.iter().cloned());
        let (weights, _) = self.weights_for(adapters)?;
        let mut report = EvalReport {
            games: games.len(),
            ..EvalReport::default()
        };
        let mut nll = 0.0f64;

        for game in games {
            for ply in 0..game.len() {
                let pred = match self.predict_next(&game[..ply], &opts) {
                    Ok(p) => p,
                    Err(e) if e.is_input() => {
                        report.skipped_moves += (game.len() - ply) as u64;
                        break;
                    }
                    Err(e) => return Err(e),
                };
                if pred.terminal {
                    report.skipped_moves += (game.len() - ply) as u64;
                    break;
                }
                report.positions += 1;
                let played = normalize_san(&game[ply]);
                if pred
                    .candidates
                    .first()
                    .is_some_and(|c| normalize_san(&c.mv) == played)
                {
                    report.top1_hits += 1;
                }
            }

            let seq = self.vocab().encode(game.as_slice());
            let (g_nll, g_n) = sequence_nll(self.model(), &weights, &seq)?;
            nll += g_nll;
            report.tokens += g_n as u64;
        }

        if report.positions > 0 {
            report.accuracy = report.top1_hits as f64 / report.positions as f64;
        }
        if report.tokens > 0 {
            report.perplexity = (nll / report.tokens as f64).exp();
        }
        info!(
            games = report.games,
            positions = report.positions,
            accuracy = report.accuracy,
            perplexity = report.perplexity,
            "evaluation finished"
        );
        Ok(report)
    }
}
