//! Unified configuration schema for movecast.
//!
//! One YAML file drives every component: the CLI, the server, and the batch
//! windowing pass all load it through [`Config::load`] and validate it once.
//! After validation the config is shared read-only.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration loading errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid config field `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl ConfigError {
    fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    /// Vocabulary location and build limits.
    #[serde(default)]
    pub vocab: VocabConfig,
    /// Causal windowing for training data.
    #[serde(default)]
    pub dataset: DatasetConfig,
    /// Base weights and scoring-model architecture.
    #[serde(default)]
    pub model: ModelConfig,
    /// Decoding defaults and request limits.
    #[serde(default)]
    pub inference: InferenceConfig,
    /// LoRA adapters loaded at startup.
    #[serde(default)]
    pub adapters: AdaptersConfig,
    /// Drift thresholds.
    #[serde(default)]
    pub drift: DriftConfig,
    /// HTTP serving boundary.
    #[serde(default)]
    pub serve: ServeConfig,
    /// NDJSON event logging.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Vocabulary configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VocabConfig {
    /// Path to the vocabulary JSON.
    #[serde(default = "default_vocab_path")]
    pub path: String,
    /// Moves seen fewer times than this are left out of a freshly built vocabulary.
    #[serde(default = "default_min_count")]
    pub min_count: u64,
    /// Optional cap on the number of move entries (special tokens excluded).
    #[serde(default)]
    pub max_size: Option<usize>,
}

fn default_vocab_path() -> String {
    "vocab.json".to_string()
}

fn default_min_count() -> u64 {
    1
}

impl Default for VocabConfig {
    fn default() -> Self {
        Self {
            path: default_vocab_path(),
            min_count: default_min_count(),
            max_size: None,
        }
    }
}

/// Dataset windowing configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatasetConfig {
    /// Tokens per window (both inputs and labels).
    #[serde(default = "default_context_length")]
    pub context_length: usize,
    /// Offset between consecutive window starts.
    #[serde(default = "default_stride")]
    pub stride: usize,
    /// Windows per safetensors shard.
    #[serde(default = "default_max_windows_per_shard")]
    pub max_windows_per_shard: usize,
}

fn default_context_length() -> usize {
    128
}

fn default_stride() -> usize {
    64
}

fn default_max_windows_per_shard() -> usize {
    4096
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            context_length: default_context_length(),
            stride: default_stride(),
            max_windows_per_shard: default_max_windows_per_shard(),
        }
    }
}

/// Scoring model configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ModelConfig {
    /// Base weights (safetensors). Ignored when `run_id` is set.
    #[serde(default = "default_base_weights")]
    pub base_weights: String,
    /// Fetch base weights from the model registry instead of `base_weights`.
    #[serde(default)]
    pub run_id: Option<String>,
    /// Registry root directory, laid out as `<root>/<run_id>/<artifact>`.
    #[serde(default)]
    pub registry_root: Option<String>,
    /// Number of preceding tokens averaged into the context vector.
    #[serde(default = "default_history_window")]
    pub history_window: usize,
}

fn default_base_weights() -> String {
    "weights/base.safetensors".to_string()
}

fn default_history_window() -> usize {
    8
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            base_weights: default_base_weights(),
            run_id: None,
            registry_root: None,
            history_window: default_history_window(),
        }
    }
}

/// Inference defaults.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct InferenceConfig {
    /// Temperature used when a request does not carry one.
    #[serde(default = "default_temperature")]
    pub default_temperature: f32,
    /// Suggestions returned when a request does not ask for a count.
    #[serde(default = "default_num_suggestions")]
    pub default_num_suggestions: usize,
    /// Upper bound accepted from callers.
    #[serde(default = "default_max_num_suggestions")]
    pub max_num_suggestions: usize,
}

fn default_temperature() -> f32 {
    1.0
}

fn default_num_suggestions() -> usize {
    3
}

fn default_max_num_suggestions() -> usize {
    32
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            default_temperature: default_temperature(),
            default_num_suggestions: default_num_suggestions(),
            max_num_suggestions: default_max_num_suggestions(),
        }
    }
}

/// One named adapter artifact.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct AdapterSpec {
    pub name: String,
    pub path: String,
}

/// Adapters loaded into the catalog at startup.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AdaptersConfig {
    #[serde(default)]
    pub preload: Vec<AdapterSpec>,
}

/// Drift comparison thresholds.
///
/// Each threshold is compared against the distance of the metric with the
/// same name; a metric is flagged when its distance is strictly greater.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DriftConfig {
    /// Samples with fewer sequences are reported inconclusive.
    #[serde(default = "default_min_sequences")]
    pub min_sequences: usize,
    #[serde(default = "default_unigram_js")]
    pub unigram_js: f64,
    #[serde(default = "default_bigram_js")]
    pub bigram_js: f64,
    #[serde(default = "default_unk_rate")]
    pub unk_rate: f64,
    #[serde(default = "default_mean_length")]
    pub mean_length: f64,
    #[serde(default = "default_illegal_rate")]
    pub illegal_suggestion_rate: f64,
}

fn default_min_sequences() -> usize {
    1
}

fn default_unigram_js() -> f64 {
    0.05
}

fn default_bigram_js() -> f64 {
    0.10
}

fn default_unk_rate() -> f64 {
    0.02
}

fn default_mean_length() -> f64 {
    0.25
}

fn default_illegal_rate() -> f64 {
    0.01
}

impl Default for DriftConfig {
    fn default() -> Self {
        Self {
            min_sequences: default_min_sequences(),
            unigram_js: default_unigram_js(),
            bigram_js: default_bigram_js(),
            unk_rate: default_unk_rate(),
            mean_length: default_mean_length(),
            illegal_suggestion_rate: default_illegal_rate(),
        }
    }
}

/// HTTP serving configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServeConfig {
    /// Bind address (e.g., "127.0.0.1:8080").
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Worker threads pulling requests off the listener.
    #[serde(default = "default_workers")]
    pub workers: usize,
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_workers() -> usize {
    4
}

impl Default for ServeConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            workers: default_workers(),
        }
    }
}

/// NDJSON event logging.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Append events here when set.
    #[serde(default)]
    pub events_path: Option<String>,
    /// `0` disables periodic flushing.
    #[serde(default = "default_flush_every_lines")]
    pub flush_every_lines: u64,
}

fn default_flush_every_lines() -> u64 {
    100
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            events_path: None,
            flush_every_lines: default_flush_every_lines(),
        }
    }
}

impl Config {
    /// Load and validate configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load and validate configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Check every field with a constrained domain.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.dataset.context_length == 0 {
            return Err(ConfigError::invalid(
                "dataset.context_length",
                "must be >= 1",
            ));
        }
        if self.dataset.stride == 0 {
            return Err(ConfigError::invalid("dataset.stride", "must be >= 1"));
        }
        if self.dataset.max_windows_per_shard == 0 {
            return Err(ConfigError::invalid(
                "dataset.max_windows_per_shard",
                "must be >= 1",
            ));
        }
        if self.model.history_window == 0 {
            return Err(ConfigError::invalid("model.history_window", "must be >= 1"));
        }
        if self.model.run_id.is_some() && self.model.registry_root.is_none() {
            return Err(ConfigError::invalid(
                "model.registry_root",
                "required when model.run_id is set",
            ));
        }
        let t = self.inference.default_temperature;
        if !(t.is_finite() && t > 0.0) {
            return Err(ConfigError::invalid(
                "inference.default_temperature",
                format!("must be finite and > 0, got {t}"),
            ));
        }
        if self.inference.default_num_suggestions == 0 {
            return Err(ConfigError::invalid(
                "inference.default_num_suggestions",
                "must be >= 1",
            ));
        }
        if self.inference.max_num_suggestions < self.inference.default_num_suggestions {
            return Err(ConfigError::invalid(
                "inference.max_num_suggestions",
                "must be >= inference.default_num_suggestions",
            ));
        }
        let mut seen = std::collections::BTreeSet::new();
        for a in &self.adapters.preload {
            if a.name.is_empty() {
                return Err(ConfigError::invalid("adapters.preload", "empty adapter name"));
            }
            if !seen.insert(a.name.as_str()) {
                return Err(ConfigError::invalid(
                    "adapters.preload",
                    format!("duplicate adapter name {:?}", a.name),
                ));
            }
        }
        let thresholds = [
            ("drift.unigram_js", self.drift.unigram_js),
            ("drift.bigram_js", self.drift.bigram_js),
            ("drift.unk_rate", self.drift.unk_rate),
            ("drift.mean_length", self.drift.mean_length),
            (
                "drift.illegal_suggestion_rate",
                self.drift.illegal_suggestion_rate,
            ),
        ];
        for (field, v) in thresholds {
            if !(v.is_finite() && v >= 0.0) {
                return Err(ConfigError::invalid(field, format!("must be finite and >= 0, got {v}")));
            }
        }
        if self.serve.workers == 0 {
            return Err(ConfigError::invalid("serve.workers", "must be >= 1"));
        }
        Ok(())
    }
}

/// Resolve a config-relative path against the directory holding the config file.
pub fn resolve_path(config_dir: &Path, p: &str) -> PathBuf {
    let path = Path::new(p);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        config_dir.join(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_yaml_uses_defaults() {
        let config = Config::from_yaml("{}").expect("empty mapping should parse");
        assert_eq!(config.dataset.context_length, 128);
        assert_eq!(config.dataset.stride, 64);
        assert_eq!(config.inference.default_num_suggestions, 3);
        assert_eq!(config.serve.bind, "127.0.0.1:8080");
        assert_eq!(config.drift.min_sequences, 1);
        assert!(config.adapters.preload.is_empty());
    }

    #[test]
    fn test_parse_yaml_string() {
        let yaml = r#"
vocab:
  path: "artifacts/vocab.json"

dataset:
  context_length: 32
  stride: 16

inference:
  default_temperature: 0.7
  default_num_suggestions: 5

adapters:
  preload:
    - name: "blitz"
      path: "adapters/blitz.safetensors"

serve:
  bind: "0.0.0.0:9000"
  workers: 2
"#;

        let config = Config::from_yaml(yaml).expect("Failed to parse YAML");
        assert_eq!(config.vocab.path, "artifacts/vocab.json");
        assert_eq!(config.dataset.context_length, 32);
        assert_eq!(config.dataset.stride, 16);
        assert!((config.inference.default_temperature - 0.7).abs() < 1e-6);
        assert_eq!(config.adapters.preload.len(), 1);
        assert_eq!(config.adapters.preload[0].name, "blitz");
        assert_eq!(config.serve.workers, 2);
        // Check defaults are applied
        assert_eq!(config.inference.max_num_suggestions, 32);
        assert_eq!(config.model.history_window, 8);
    }

    #[test]
    fn test_invalid_yaml_fails() {
        let invalid_yaml = "this is not: valid: yaml: {{{}}}";
        let result = Config::from_yaml(invalid_yaml);
        assert!(result.is_err());
    }

    #[test]
    fn zero_context_length_is_rejected() {
        let err = Config::from_yaml("dataset:\n  context_length: 0\n").unwrap_err();
        match err {
            ConfigError::Invalid { field, .. } => assert_eq!(field, "dataset.context_length"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn non_positive_temperature_is_rejected() {
        let err = Config::from_yaml("inference:\n  default_temperature: 0.0\n").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "inference.default_temperature",
                ..
            }
        ));
    }

    #[test]
    fn duplicate_adapter_names_are_rejected() {
        let yaml = r#"
adapters:
  preload:
    - { name: "a", path: "x.safetensors" }
    - { name: "a", path: "y.safetensors" }
"#;
        assert!(Config::from_yaml(yaml).is_err());
    }

    #[test]
    fn run_id_requires_registry_root() {
        let err = Config::from_yaml("model:\n  run_id: \"r1\"\n").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "model.registry_root",
                ..
            }
        ));
    }

    #[test]
    fn load_reads_file_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mc.yaml");
        std::fs::write(&path, "serve:\n  workers: 8\n").unwrap();
        let config = Config::load(&path).unwrap();
        assert_eq!(config.serve.workers, 8);
    }

    #[test]
    fn resolve_path_keeps_absolute_and_joins_relative() {
        let base = Path::new("/srv/mc");
        assert_eq!(resolve_path(base, "vocab.json"), PathBuf::from("/srv/mc/vocab.json"));
        assert_eq!(resolve_path(base, "/tmp/v.json"), PathBuf::from("/tmp/v.json"));
    }
}
