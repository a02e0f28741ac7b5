use thiserror::Error;

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("safetensors: {0}")]
    Safetensors(#[from] safetensors::SafeTensorError),
    #[error("artifact: {0}")]
    Artifact(#[from] mc_core::ArtifactError),
    #[error("missing tensor {0:?}")]
    MissingTensor(String),
    #[error("shape mismatch for {target:?}: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        target: String,
        expected: (usize, usize),
        got: (usize, usize),
    },
    #[error("invalid tensor {name:?}: {reason}")]
    InvalidTensor { name: String, reason: String },
    #[error("invalid metadata {key:?}={value:?}")]
    InvalidMetadata { key: String, value: String },
    #[error("unknown adapter {0:?}")]
    UnknownAdapter(String),
}
