//! mc-core: configuration schema and artifact interfaces shared by every movecast crate.

pub mod artifacts;
pub mod config;

pub use artifacts::{
    ArtifactError, ArtifactStore, FsArtifactStore, FsModelRegistry, MemoryArtifactStore,
    ModelRegistry,
};
pub use config::{resolve_path, AdapterSpec, Config, ConfigError};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
