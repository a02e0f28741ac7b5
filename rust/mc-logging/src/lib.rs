//! mc-logging: NDJSON events + tracing setup + content hashing.
//!
//! Human-facing diagnostics go through `tracing`; anything a post-mortem or an
//! external metrics logger needs to parse goes through [`NdjsonWriter`] as one
//! versioned JSON object per line.

use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Run manifest schema version.
pub const RUN_MANIFEST_VERSION: u32 = 1;

/// Default `EnvFilter` directive when `RUST_LOG` is unset.
pub const DEFAULT_LOG_DIRECTIVE: &str = "mc=info";

#[derive(Debug, Error)]
pub enum NdjsonError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Install the global tracing subscriber (stderr, env-filtered).
///
/// Safe to call more than once; later calls are no-ops.
pub fn init_tracing(default_directive: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

pub fn now_ms() -> u64 {
    let d = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    d.as_millis() as u64
}

/// blake3 hex digest.
pub fn hash_bytes(bytes: &[u8]) -> String {
    blake3::hash(bytes).to_hex().to_string()
}

pub fn try_git_hash() -> Option<String> {
    use std::process::Command;

    let out = Command::new("git").args(["rev-parse", "HEAD"]).output().ok()?;
    if !out.status.success() {
        return None;
    }
    let s = String::from_utf8(out.stdout).ok()?;
    let t = s.trim();
    if t.is_empty() {
        None
    } else {
        Some(t.to_string())
    }
}

/// Describes one windowing run (written next to the shards it produced).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunManifestV1 {
    pub run_manifest_version: u32,

    pub run_id: String,
    pub created_ts_ms: u64,

    // Hashes for reproducibility.
    pub vocab_hash: String,
    pub config_hash: Option<String>,
    pub git_hash: Option<String>,

    pub vocab_size: usize,
    pub context_length: usize,
    pub stride: usize,

    // Counters.
    pub games: u64,
    pub windows: u64,
    pub shards: u64,
    pub unk_substitutions: u64,
    pub pad_tokens: u64,
}

pub fn read_manifest(path: impl AsRef<Path>) -> Result<RunManifestV1, NdjsonError> {
    let bytes = std::fs::read(path)?;
    Ok(serde_json::from_slice::<RunManifestV1>(&bytes)?)
}

pub fn write_manifest_atomic(path: impl AsRef<Path>, m: &RunManifestV1) -> Result<(), NdjsonError> {
    let path = path.as_ref();
    let tmp = path.with_extension("json.tmp");
    let bytes = serde_json::to_vec_pretty(m)?;
    std::fs::write(&tmp, bytes)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

/// One served next-move prediction.
#[derive(Debug, Clone, Serialize)]
pub struct PredictionEventV1 {
    pub event: &'static str,
    pub ts_ms: u64,

    pub history_len: usize,
    pub num_suggestions: usize,
    pub temperature: f32,
    pub adapters: Vec<String>,
    pub adapter_version: u64,

    pub terminal: bool,
    pub returned: usize,
    pub top_move: Option<String>,
    pub top_probability: Option<f32>,
    pub end_of_game_probability: f32,
    pub unk_substitutions: u32,
    pub latency_us: u64,
}

/// Per-run windowing counters (DataQualityWarning totals included).
#[derive(Debug, Clone, Serialize)]
pub struct WindowingStatsEventV1 {
    pub event: &'static str,
    pub ts_ms: u64,

    pub games: u64,
    pub windows: u64,
    pub loss_tokens: u64,
    pub pad_tokens: u64,
    pub unk_substitutions: u64,
}

/// Drift comparison outcome; `report` is the detector's own serialized report.
#[derive(Debug, Clone, Serialize)]
pub struct DriftReportEventV1<'a, R: Serialize> {
    pub event: &'static str,
    pub ts_ms: u64,
    pub baseline_created_ts_ms: u64,
    pub report: &'a R,
}

/// Append-only NDJSON sink.
///
/// Every [`NdjsonWriter::write_event`] appends exactly one JSON object and a
/// newline. Buffered lines reach the file every `flush_every_lines` events
/// (0: only on [`NdjsonWriter::flush`] or drop).
pub struct NdjsonWriter {
    out: BufWriter<File>,
    flush_every_lines: u64,
    pending: u64,
    written: u64,
}

impl NdjsonWriter {
    pub fn open_append(path: impl AsRef<Path>) -> Result<Self, NdjsonError> {
        Self::open_append_with_flush(path, 0)
    }

    /// Open (creating parent directories) for append.
    pub fn open_append_with_flush(
        path: impl AsRef<Path>,
        flush_every_lines: u64,
    ) -> Result<Self, NdjsonError> {
        let path = path.as_ref();
        match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => std::fs::create_dir_all(dir)?,
            _ => {}
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            out: BufWriter::new(file),
            flush_every_lines,
            pending: 0,
            written: 0,
        })
    }

    pub fn write_event<T: Serialize>(&mut self, event: &T) -> Result<(), NdjsonError> {
        // A serialization failure writes nothing.
        let mut line = serde_json::to_vec(event)?;
        line.push(b'\n');
        self.out.write_all(&line)?;
        self.pending += 1;
        self.written += 1;
        if self.flush_every_lines != 0 && self.pending >= self.flush_every_lines {
            self.flush()?;
        }
        Ok(())
    }

    /// Events appended through this handle.
    pub fn lines_written(&self) -> u64 {
        self.written
    }

    pub fn flush(&mut self) -> Result<(), NdjsonError> {
        self.out.flush()?;
        self.pending = 0;
        Ok(())
    }
}

impl Drop for NdjsonWriter {
    fn drop(&mut self) {
        let _ = self.out.flush();
    }
}
