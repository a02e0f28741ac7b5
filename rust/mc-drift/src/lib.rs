//! Sequence drift detection.
//!
//! A [`DriftBaseline`] holds reference token statistics over a period; each
//! [`compare`] measures a new sample window against it and flags metrics whose
//! distance exceeds the configured threshold. Too-small samples are reported
//! [`DriftStatus::Inconclusive`], never as stable.

pub mod baseline;
pub mod report;
pub mod stats;

pub use baseline::{DriftBaseline, DriftError, BASELINE_FORMAT};
pub use report::{
    compare, compare_stats, DriftMetric, DriftReport, DriftStatus, DriftThresholds, M_BIGRAM_JS,
    M_ILLEGAL_RATE, M_MEAN_LENGTH, M_UNIGRAM_JS, M_UNK_RATE,
};
pub use stats::{js_divergence, SequenceStats};

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
