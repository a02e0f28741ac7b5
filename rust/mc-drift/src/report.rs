//! Sample-versus-baseline comparison.

use mc_core::config::DriftConfig;
use mc_vocab::TokenizedSequence;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::baseline::DriftBaseline;
use crate::stats::{js_divergence, SequenceStats};

pub const M_UNIGRAM_JS: &str = "unigram_js";
pub const M_BIGRAM_JS: &str = "bigram_js";
pub const M_UNK_RATE: &str = "unk_rate";
pub const M_MEAN_LENGTH: &str = "mean_length";
pub const M_ILLEGAL_RATE: &str = "illegal_suggestion_rate";

/// A metric is flagged when its distance is strictly greater than its threshold.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DriftThresholds {
    /// Fewer sample (or baseline) sequences than this is insufficient data.
    pub min_sequences: usize,
    pub unigram_js: f64,
    pub bigram_js: f64,
    pub unk_rate: f64,
    pub mean_length: f64,
    pub illegal_suggestion_rate: f64,
}

impl Default for DriftThresholds {
    fn default() -> Self {
        Self::from(&DriftConfig::default())
    }
}

impl From<&DriftConfig> for DriftThresholds {
    fn from(c: &DriftConfig) -> Self {
        Self {
            min_sequences: c.min_sequences.max(1),
            unigram_js: c.unigram_js,
            bigram_js: c.bigram_js,
            unk_rate: c.unk_rate,
            mean_length: c.mean_length,
            illegal_suggestion_rate: c.illegal_suggestion_rate,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriftStatus {
    Stable,
    Drifted,
    /// Too little data to compare; nothing is flagged.
    Inconclusive,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftMetric {
    pub name: String,
    /// Scalar values on each side; `None` for distribution metrics.
    pub baseline: Option<f64>,
    pub sample: Option<f64>,
    pub distance: f64,
    pub threshold: f64,
    pub flagged: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftReport {
    pub status: DriftStatus,
    pub baseline_sequences: u64,
    pub sample_sequences: u64,
    pub metrics: Vec<DriftMetric>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl DriftReport {
    pub fn metric(&self, name: &str) -> Option<&DriftMetric> {
        self.metrics.iter().find(|m| m.name == name)
    }

    pub fn flagged(&self) -> impl Iterator<Item = &DriftMetric> {
        self.metrics.iter().filter(|m| m.flagged)
    }
}

fn metric(
    name: &str,
    sides: Option<(f64, f64)>,
    distance: f64,
    threshold: f64,
) -> DriftMetric {
    DriftMetric {
        name: name.to_string(),
        baseline: sides.map(|(b, _)| b),
        sample: sides.map(|(_, s)| s),
        distance,
        threshold,
        flagged: distance > threshold,
    }
}

/// Compare a window of tokenized sequences against `baseline`.
pub fn compare(
    sample: &[TokenizedSequence],
    baseline: &DriftBaseline,
    thresholds: &DriftThresholds,
) -> DriftReport {
    compare_stats(&SequenceStats::from_sequences(sample), None, baseline, thresholds)
}

/// Compare precomputed sample statistics, with the sample's illegal-suggestion
/// rate when the serving side tracked one.
pub fn compare_stats(
    sample: &SequenceStats,
    sample_illegal_rate: Option<f64>,
    baseline: &DriftBaseline,
    thresholds: &DriftThresholds,
) -> DriftReport {
    let base = &baseline.stats;
    let min = thresholds.min_sequences.max(1) as u64;
    if sample.sequences < min || base.sequences < min {
        let reason = format!(
            "insufficient data: sample has {} sequences, baseline {}, need {min}",
            sample.sequences, base.sequences
        );
        warn!(%reason, "drift comparison inconclusive");
        return DriftReport {
            status: DriftStatus::Inconclusive,
            baseline_sequences: base.sequences,
            sample_sequences: sample.sequences,
            metrics: Vec::new(),
            reason: Some(reason),
        };
    }

    let mut metrics = vec![
        metric(
            M_UNIGRAM_JS,
            None,
            js_divergence(&base.unigram, &sample.unigram),
            thresholds.unigram_js,
        ),
        metric(
            M_BIGRAM_JS,
            None,
            js_divergence(&base.bigram, &sample.bigram),
            thresholds.bigram_js,
        ),
        {
            let (b, s) = (base.unk_rate(), sample.unk_rate());
            metric(M_UNK_RATE, Some((b, s)), (s - b).abs(), thresholds.unk_rate)
        },
        {
            // Relative to the baseline length, with a floor of one move.
            let (b, s) = (base.mean_length(), sample.mean_length());
            metric(
                M_MEAN_LENGTH,
                Some((b, s)),
                (s - b).abs() / b.max(1.0),
                thresholds.mean_length,
            )
        },
    ];
    if let (Some(b), Some(s)) = (baseline.illegal_suggestion_rate, sample_illegal_rate) {
        metrics.push(metric(
            M_ILLEGAL_RATE,
            Some((b, s)),
            (s - b).abs(),
            thresholds.illegal_suggestion_rate,
        ));
    }

    let status = if metrics.iter().any(|m| m.flagged) {
        DriftStatus::Drifted
    } else {
        DriftStatus::Stable
    };
    let report = DriftReport {
        status,
        baseline_sequences: base.sequences,
        sample_sequences: sample.sequences,
        metrics,
        reason: None,
    };
    info!(
        status = ?report.status,
        flagged = report.flagged().count(),
        sample_sequences = report.sample_sequences,
        "drift comparison"
    );
    report
}
