//! Build an [`InferenceEngine`] from a validated [`Config`].

use std::path::Path;
use std::sync::Arc;

use mc_adapter::{load_adapter, load_base, load_base_file, AdapterError};
use mc_core::{resolve_path, ArtifactError, Config, FsModelRegistry, ModelRegistry};
use mc_oracle::StandardChess;
use mc_vocab::{VocabError, Vocabulary};
use thiserror::Error;
use tracing::info;

use crate::engine::{EngineSettings, InferenceEngine};
use crate::scorer::{BilinearModel, ScoreError};

#[derive(Debug, Error)]
pub enum InitError {
    #[error("vocabulary: {0}")]
    Vocab(#[from] VocabError),
    #[error("artifact: {0}")]
    Artifact(#[from] ArtifactError),
    #[error("weights: {0}")]
    Weights(#[from] AdapterError),
    #[error("model: {0}")]
    Model(#[from] ScoreError),
    #[error("failed to read adapter {name:?}: {source}")]
    AdapterIo {
        name: String,
        #[source]
        source: std::io::Error,
    },
    #[error("adapter {name:?}: {source}")]
    AdapterLoad {
        name: String,
        #[source]
        source: AdapterError,
    },
}

impl InferenceEngine {
    /// Load the vocabulary, base weights and preloaded adapters named by `cfg`.
    ///
    /// Relative paths resolve against `config_dir`. Base weights come from the
    /// model registry when `model.run_id` is set.
    pub fn from_config(cfg: &Config, config_dir: &Path) -> Result<Self, InitError> {
        let vocab = Vocabulary::load(resolve_path(config_dir, &cfg.vocab.path))?;

        let base = match (&cfg.model.run_id, &cfg.model.registry_root) {
            (Some(run_id), Some(root)) => {
                let registry = FsModelRegistry::new(resolve_path(config_dir, root));
                let bytes = registry.get_artifact(run_id, &cfg.model.base_weights)?;
                load_base(&bytes)?
            }
            _ => load_base_file(resolve_path(config_dir, &cfg.model.base_weights))?,
        };

        let engine = InferenceEngine::new(
            Arc::new(vocab),
            Arc::new(base),
            Arc::new(BilinearModel::new(cfg.model.history_window)),
            Arc::new(StandardChess),
            EngineSettings::from(&cfg.inference),
        )?;

        for spec in &cfg.adapters.preload {
            let path = resolve_path(config_dir, &spec.path);
            let bytes = std::fs::read(&path).map_err(|source| InitError::AdapterIo {
                name: spec.name.clone(),
                source,
            })?;
            let version = load_adapter(&bytes)
                .and_then(|d| engine.register_adapter(spec.name.clone(), d))
                .map_err(|source| InitError::AdapterLoad {
                    name: spec.name.clone(),
                    source,
                })?;
            info!(adapter = %spec.name, version, path = %path.display(), "adapter loaded");
        }

        info!(
            vocab_size = engine.vocab().len(),
            adapters = engine.adapters().snapshot().len(),
            "inference engine ready"
        );
        Ok(engine)
    }
}
