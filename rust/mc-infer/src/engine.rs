//! Next-move prediction constrained to legal moves.
//!
//! Per request: validate options, resolve adapters against one catalog
//! snapshot, reconstruct the position, and either signal a terminal position
//! or score the history, mask everything outside `legal ∪ {<EOS>}`, apply
//! temperature and softmax, and return the top candidates renormalized to 1.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use mc_adapter::{
    apply_adapters, validate_adapters, AdapterCatalog, AdapterDelta, AdapterError, AdapterRegistry,
    WeightView,
};
use mc_core::config::InferenceConfig;
use mc_oracle::{normalize_san, LegalMoveOracle, Position, TerminalKind};
use mc_vocab::{is_special, TokenId, TokenizedSequence, Vocabulary, EOS_ID};
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::cancel::CancelToken;
use crate::decode::{masked_softmax, renormalize, top_k};
use crate::metrics::{EngineMetrics, MetricsSnapshot};
use crate::scorer::{ScoreError, ScoringModel};

#[derive(Debug, Error)]
pub enum PredictError {
    /// Caller-correctable; `field` names the offending request field.
    #[error("invalid {field}: {reason}")]
    Input { field: &'static str, reason: String },
    #[error("adapter: {0}")]
    Adapter(#[from] AdapterError),
    #[error("scoring: {0}")]
    Scoring(#[from] ScoreError),
    #[error("prediction cancelled")]
    Cancelled,
}

impl PredictError {
    pub fn input(field: &'static str, reason: impl Into<String>) -> Self {
        PredictError::Input {
            field,
            reason: reason.into(),
        }
    }

    pub fn is_input(&self) -> bool {
        matches!(self, PredictError::Input { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineSettings {
    pub default_temperature: f32,
    pub default_num_suggestions: usize,
    pub max_num_suggestions: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::from(&InferenceConfig::default())
    }
}

impl From<&InferenceConfig> for EngineSettings {
    fn from(c: &InferenceConfig) -> Self {
        Self {
            default_temperature: c.default_temperature,
            default_num_suggestions: c.default_num_suggestions,
            max_num_suggestions: c.max_num_suggestions,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PredictOptions {
    pub num_suggestions: usize,
    pub temperature: f32,
    /// Adapter names, applied in this order.
    pub adapters: Vec<String>,
    pub cancel: Option<CancelToken>,
}

impl PredictOptions {
    pub fn new(num_suggestions: usize, temperature: f32) -> Self {
        Self {
            num_suggestions,
            temperature,
            ..Self::default()
        }
    }

    pub fn with_adapters<S: Into<String>>(mut self, names: impl IntoIterator<Item = S>) -> Self {
        self.adapters = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = Some(cancel);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candidate {
    #[serde(rename = "move")]
    pub mv: String,
    pub probability: f32,
    /// `None` when the move is legal but absent from the vocabulary.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_id: Option<TokenId>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prediction {
    /// Ranked by probability, ties by token id; probabilities sum to 1.
    pub candidates: Vec<Candidate>,
    pub terminal: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub terminal_kind: Option<TerminalKind>,
    /// Softmax mass on `<EOS>` before the candidates were renormalized.
    /// 1.0 for terminal positions.
    pub end_of_game_probability: f32,
    pub adapter_version: u64,
    pub unk_substitutions: u32,
    /// Legal moves with no vocabulary entry (never scored).
    pub unscored_legal: Vec<String>,
}

/// Full masked distribution for one position.
pub(crate) struct Scored {
    /// Length `|V|`; zero outside `legal ∪ {<EOS>}`. Empty when nothing was scorable.
    pub(crate) probs: Vec<f32>,
    pub(crate) scorable: BTreeMap<TokenId, String>,
    pub(crate) unscored: Vec<String>,
    pub(crate) unk_substitutions: u32,
}

impl Scored {
    pub(crate) fn is_fallback(&self) -> bool {
        self.scorable.is_empty()
    }

    pub(crate) fn eos(&self) -> f32 {
        self.probs.get(EOS_ID as usize).copied().unwrap_or(0.0)
    }

    /// Sampling weights over legal moves in id order (SAN order on fallback).
    pub(crate) fn weighted_moves(&self) -> Vec<(&str, f32)> {
        if self.is_fallback() {
            let u = 1.0 / self.unscored.len().max(1) as f32;
            return self.unscored.iter().map(|s| (s.as_str(), u)).collect();
        }
        self.scorable
            .iter()
            .map(|(&id, s)| (s.as_str(), self.probs[id as usize]))
            .collect()
    }
}

fn resolve<'c>(
    catalog: &'c AdapterCatalog,
    names: &[String],
) -> Result<Vec<&'c AdapterDelta>, PredictError> {
    catalog
        .resolve(names)
        .map_err(|e| PredictError::input("adapters", e.to_string()))
}

pub(crate) fn check_cancel(cancel: Option<&CancelToken>) -> Result<(), PredictError> {
    match cancel {
        Some(c) if c.is_cancelled() => Err(PredictError::Cancelled),
        _ => Ok(()),
    }
}

pub struct InferenceEngine {
    vocab: Arc<Vocabulary>,
    base: Arc<WeightView>,
    model: Arc<dyn ScoringModel>,
    oracle: Arc<dyn LegalMoveOracle>,
    adapters: AdapterRegistry,
    settings: EngineSettings,
    metrics: EngineMetrics,
}

impl InferenceEngine {
    /// Checks `base` against `model` and `vocab` before accepting it.
    pub fn new(
        vocab: Arc<Vocabulary>,
        base: Arc<WeightView>,
        model: Arc<dyn ScoringModel>,
        oracle: Arc<dyn LegalMoveOracle>,
        settings: EngineSettings,
    ) -> Result<Self, ScoreError> {
        model.check_weights(&base, vocab.len())?;
        Ok(Self {
            vocab,
            base,
            model,
            oracle,
            adapters: AdapterRegistry::new(),
            settings,
            metrics: EngineMetrics::default(),
        })
    }

    pub fn vocab(&self) -> &Arc<Vocabulary> {
        &self.vocab
    }

    pub fn base(&self) -> &Arc<WeightView> {
        &self.base
    }

    pub fn model(&self) -> &dyn ScoringModel {
        self.model.as_ref()
    }

    pub fn oracle(&self) -> &dyn LegalMoveOracle {
        self.oracle.as_ref()
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn adapters(&self) -> &AdapterRegistry {
        &self.adapters
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Options filled from the configured defaults.
    pub fn default_options(&self) -> PredictOptions {
        PredictOptions::new(
            self.settings.default_num_suggestions,
            self.settings.default_temperature,
        )
    }

    /// Validate `deltas` against the base and publish them under `name`.
    pub fn register_adapter(
        &self,
        name: impl Into<String>,
        deltas: Vec<AdapterDelta>,
    ) -> Result<u64, AdapterError> {
        validate_adapters(&self.base, &deltas)?;
        Ok(self.adapters.insert(name, deltas))
    }

    fn check_options(&self, opts: &PredictOptions) -> Result<(), PredictError> {
        if !opts.temperature.is_finite() || opts.temperature <= 0.0 {
            return Err(PredictError::input(
                "temperature",
                format!("must be finite and > 0, got {}", opts.temperature),
            ));
        }
        if opts.num_suggestions == 0 {
            return Err(PredictError::input("num_suggestions", "must be >= 1"));
        }
        if opts.num_suggestions > self.settings.max_num_suggestions {
            return Err(PredictError::input(
                "num_suggestions",
                format!(
                    "must be <= {}, got {}",
                    self.settings.max_num_suggestions, opts.num_suggestions
                ),
            ));
        }
        Ok(())
    }

    pub(crate) fn position(&self, history: &[String]) -> Result<Position, PredictError> {
        self.oracle
            .position(history)
            .map_err(|e| PredictError::input("moves", e.to_string()))
    }

    /// Merged view for `deltas`; the base itself when there are none.
    fn merge(&self, deltas: &[&AdapterDelta]) -> Result<Arc<WeightView>, PredictError> {
        if deltas.is_empty() {
            return Ok(Arc::clone(&self.base));
        }
        Ok(Arc::new(apply_adapters(&self.base, deltas.iter().copied())?))
    }

    /// Merged view for the named adapters plus the catalog version it came from.
    pub(crate) fn weights_for(
        &self,
        names: &[String],
    ) -> Result<(Arc<WeightView>, u64), PredictError> {
        let catalog = self.adapters.snapshot();
        let deltas = resolve(&catalog, names)?;
        Ok((self.merge(&deltas)?, catalog.version()))
    }

    fn lookup_move(&self, san: &str) -> Option<TokenId> {
        self.vocab
            .id_of(san)
            .or_else(|| self.vocab.id_of(&normalize_san(san)))
            .filter(|&id| !is_special(id))
    }

    /// Score `history` and return the masked distribution over `position.legal`.
    pub(crate) fn score(
        &self,
        history: &[String],
        position: &Position,
        weights: &WeightView,
        temperature: f32,
        cancel: Option<&CancelToken>,
    ) -> Result<Scored, PredictError> {
        let seq: TokenizedSequence = self.vocab.encode_history(history);
        self.metrics.unk(seq.unk_substitutions());

        let mut scorable = BTreeMap::new();
        let mut unscored = Vec::new();
        for san in &position.legal {
            match self.lookup_move(san) {
                Some(id) => {
                    scorable.entry(id).or_insert_with(|| san.clone());
                }
                None => unscored.push(san.clone()),
            }
        }

        if scorable.is_empty() {
            self.metrics.unscored_fallback();
            return Ok(Scored {
                probs: Vec::new(),
                scorable,
                unscored,
                unk_substitutions: seq.unk_substitutions(),
            });
        }

        check_cancel(cancel)?;
        let logits = self.model.logits(weights, &seq)?;
        if logits.len() != self.vocab.len() {
            return Err(ScoreError::VocabMismatch {
                expected: self.vocab.len(),
                got: logits.len(),
            }
            .into());
        }
        check_cancel(cancel)?;

        let allowed: Vec<usize> = scorable
            .keys()
            .map(|&id| id as usize)
            .chain(std::iter::once(EOS_ID as usize))
            .collect();
        let probs = masked_softmax(&logits, &allowed, temperature);
        Ok(Scored {
            probs,
            scorable,
            unscored,
            unk_substitutions: seq.unk_substitutions(),
        })
    }

    /// Ranked next-move suggestions for `history`.
    pub fn predict_next(
        &self,
        history: &[String],
        opts: &PredictOptions,
    ) -> Result<Prediction, PredictError> {
        let t0 = Instant::now();
        self.metrics.request();
        let res = self.predict_inner(history, opts);
        match &res {
            Ok(p) if p.terminal => self.metrics.terminal(),
            Ok(_) => {}
            Err(PredictError::Input { .. }) => self.metrics.input_error(),
            Err(PredictError::Cancelled) => self.metrics.cancelled(),
            Err(_) => self.metrics.scoring_failure(),
        }
        debug!(
            history_len = history.len(),
            ok = res.is_ok(),
            latency_us = t0.elapsed().as_micros() as u64,
            "predict_next"
        );
        res
    }

    fn predict_inner(
        &self,
        history: &[String],
        opts: &PredictOptions,
    ) -> Result<Prediction, PredictError> {
        let cancel = opts.cancel.as_ref();
        self.check_options(opts)?;
        check_cancel(cancel)?;

        // Unknown adapter names fail even for terminal positions.
        let catalog = self.adapters.snapshot();
        let deltas = resolve(&catalog, &opts.adapters)?;

        let position = self.position(history)?;
        if position.legal.is_empty() {
            return Ok(Prediction {
                candidates: Vec::new(),
                terminal: true,
                terminal_kind: position.terminal,
                end_of_game_probability: 1.0,
                adapter_version: catalog.version(),
                unk_substitutions: 0,
                unscored_legal: Vec::new(),
            });
        }
        check_cancel(cancel)?;

        let weights = self.merge(&deltas)?;
        let adapter_version = catalog.version();
        check_cancel(cancel)?;

        let scored = self.score(history, &position, &weights, opts.temperature, cancel)?;
        let k = opts.num_suggestions;

        let candidates = if scored.is_fallback() {
            let n = scored.unscored.len().min(k);
            let u = 1.0 / n.max(1) as f32;
            scored
                .unscored
                .iter()
                .take(n)
                .map(|s| Candidate {
                    mv: s.clone(),
                    probability: u,
                    token_id: None,
                })
                .collect()
        } else {
            let ids: Vec<usize> = scored.scorable.keys().map(|&id| id as usize).collect();
            let top = top_k(&scored.probs, &ids, k);
            let mut ps: Vec<f32> = top.iter().map(|&(_, p)| p).collect();
            renormalize(&mut ps);
            top.iter()
                .zip(ps)
                .filter_map(|(&(id, _), p)| {
                    let id = id as TokenId;
                    scored.scorable.get(&id).map(|s| Candidate {
                        mv: s.clone(),
                        probability: p,
                        token_id: Some(id),
                    })
                })
                .collect()
        };

        Ok(Prediction {
            candidates,
            terminal: false,
            terminal_kind: None,
            end_of_game_probability: scored.eos(),
            adapter_version,
            unk_substitutions: scored.unk_substitutions,
            unscored_legal: scored.unscored,
        })
    }
}
