//! Process-wide engine counters, read by external loggers.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

#[derive(Debug, Default)]
pub struct EngineMetrics {
    requests: AtomicU64,
    terminal_responses: AtomicU64,
    input_errors: AtomicU64,
    scoring_failures: AtomicU64,
    cancelled: AtomicU64,
    unk_substitutions: AtomicU64,
    unscored_fallbacks: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub requests: u64,
    pub terminal_responses: u64,
    pub input_errors: u64,
    pub scoring_failures: u64,
    pub cancelled: u64,
    pub unk_substitutions: u64,
    /// Requests answered uniformly because no legal move was in the vocabulary.
    pub unscored_fallbacks: u64,
}

impl EngineMetrics {
    pub(crate) fn request(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn terminal(&self) {
        self.terminal_responses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn input_error(&self) {
        self.input_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn scoring_failure(&self) {
        self.scoring_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn cancelled(&self) {
        self.cancelled.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn unk(&self, n: u32) {
        if n > 0 {
            self.unk_substitutions.fetch_add(n as u64, Ordering::Relaxed);
        }
    }

    pub(crate) fn unscored_fallback(&self) {
        self.unscored_fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            requests: self.requests.load(Ordering::Relaxed),
            terminal_responses: self.terminal_responses.load(Ordering::Relaxed),
            input_errors: self.input_errors.load(Ordering::Relaxed),
            scoring_failures: self.scoring_failures.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
            unk_substitutions: self.unk_substitutions.load(Ordering::Relaxed),
            unscored_fallbacks: self.unscored_fallbacks.load(Ordering::Relaxed),
        }
    }
}
