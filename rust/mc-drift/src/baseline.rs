//! Reference statistics, refreshed only by an explicit rebuild.
//!
//! On disk (JSON): `{"format": 1, "created_ts_ms": …, "vocab_size": …,
//! "vocab_hash": "…", "sequences": …, "move_tokens": …, "unk_tokens": …,
//! "unigram": [[id, n], …], "bigram": [[a, b, n], …], "illegal_suggestion_rate": null}`.

use std::fs;
use std::path::Path;

use mc_vocab::{TokenId, TokenizedSequence};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::stats::SequenceStats;

pub const BASELINE_FORMAT: u32 = 1;

#[derive(Debug, Error)]
pub enum DriftError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported baseline format {found} (expected {BASELINE_FORMAT})")]
    Format { found: u32 },
    #[error("invalid illegal suggestion rate {0}")]
    InvalidRate(f64),
    #[error("baseline was built with vocabulary {baseline} but the sample uses {sample}")]
    VocabMismatch { baseline: String, sample: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct DriftBaseline {
    pub created_ts_ms: u64,
    pub vocab_size: usize,
    /// Corpus hash of the vocabulary the sequences were encoded with.
    pub vocab_hash: String,
    pub stats: SequenceStats,
    pub illegal_suggestion_rate: Option<f64>,
}

#[derive(Debug, Serialize, Deserialize)]
struct BaselineFile {
    format: u32,
    created_ts_ms: u64,
    vocab_size: usize,
    #[serde(default)]
    vocab_hash: String,
    sequences: u64,
    move_tokens: u64,
    unk_tokens: u64,
    unigram: Vec<(TokenId, u64)>,
    bigram: Vec<(TokenId, TokenId, u64)>,
    #[serde(default)]
    illegal_suggestion_rate: Option<f64>,
}

impl DriftBaseline {
    pub fn from_sequences(seqs: &[TokenizedSequence], vocab_size: usize) -> Self {
        Self {
            created_ts_ms: mc_logging::now_ms(),
            vocab_size,
            vocab_hash: String::new(),
            stats: SequenceStats::from_sequences(seqs),
            illegal_suggestion_rate: None,
        }
    }

    pub fn with_vocab_hash(mut self, hash: impl Into<String>) -> Self {
        self.vocab_hash = hash.into();
        self
    }

    /// Token ids are only comparable under the same vocabulary. A baseline
    /// without a recorded hash accepts any.
    pub fn check_vocab(&self, sample_hash: &str) -> Result<(), DriftError> {
        if self.vocab_hash.is_empty() || self.vocab_hash == sample_hash {
            return Ok(());
        }
        Err(DriftError::VocabMismatch {
            baseline: self.vocab_hash.clone(),
            sample: sample_hash.to_string(),
        })
    }

    /// Attach the fraction of served suggestions that were illegal over the reference period.
    pub fn with_illegal_suggestion_rate(mut self, rate: f64) -> Result<Self, DriftError> {
        if !(0.0..=1.0).contains(&rate) {
            return Err(DriftError::InvalidRate(rate));
        }
        self.illegal_suggestion_rate = Some(rate);
        Ok(self)
    }

    pub fn to_json_bytes(&self) -> Result<Vec<u8>, DriftError> {
        let s = &self.stats;
        let file = BaselineFile {
            format: BASELINE_FORMAT,
            created_ts_ms: self.created_ts_ms,
            vocab_size: self.vocab_size,
            vocab_hash: self.vocab_hash.clone(),
            sequences: s.sequences,
            move_tokens: s.move_tokens,
            unk_tokens: s.unk_tokens,
            unigram: s.unigram.iter().map(|(&k, &v)| (k, v)).collect(),
            bigram: s.bigram.iter().map(|(&(a, b), &v)| (a, b, v)).collect(),
            illegal_suggestion_rate: self.illegal_suggestion_rate,
        };
        Ok(serde_json::to_vec_pretty(&file)?)
    }

    pub fn from_json_bytes(bytes: &[u8]) -> Result<Self, DriftError> {
        let f: BaselineFile = serde_json::from_slice(bytes)?;
        if f.format != BASELINE_FORMAT {
            return Err(DriftError::Format { found: f.format });
        }
        Ok(Self {
            created_ts_ms: f.created_ts_ms,
            vocab_size: f.vocab_size,
            vocab_hash: f.vocab_hash,
            stats: SequenceStats {
                sequences: f.sequences,
                move_tokens: f.move_tokens,
                unk_tokens: f.unk_tokens,
                unigram: f.unigram.into_iter().collect(),
                bigram: f.bigram.into_iter().map(|(a, b, n)| ((a, b), n)).collect(),
            },
            illegal_suggestion_rate: f.illegal_suggestion_rate,
        })
    }

    /// Atomic write (tmp + rename).
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), DriftError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, self.to_json_bytes()?)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, DriftError> {
        Self::from_json_bytes(&fs::read(path)?)
    }
}
