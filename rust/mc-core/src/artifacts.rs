//! Artifact store and model registry seams.
//!
//! Object storage and experiment tracking live outside this workspace. The
//! core only needs blob get/put by key and artifact fetch by `(run_id, name)`;
//! the filesystem and in-memory implementations below cover local runs and tests.

use std::collections::HashMap;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::Mutex;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("artifact not found: {0}")]
    NotFound(String),
    #[error("invalid artifact key {key:?}: {reason}")]
    InvalidKey { key: String, reason: &'static str },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Blob storage for vocabularies, adapters and base weights.
pub trait ArtifactStore: Send + Sync {
    fn get_blob(&self, key: &str) -> Result<Vec<u8>, ArtifactError>;
    fn put_blob(&self, key: &str, bytes: &[u8]) -> Result<(), ArtifactError>;
}

/// Trained artifact lookup by run.
pub trait ModelRegistry: Send + Sync {
    fn get_artifact(&self, run_id: &str, name: &str) -> Result<Vec<u8>, ArtifactError>;
}

fn check_key(key: &str) -> Result<&Path, ArtifactError> {
    let p = Path::new(key);
    if key.is_empty() {
        return Err(ArtifactError::InvalidKey {
            key: key.to_string(),
            reason: "empty",
        });
    }
    for c in p.components() {
        match c {
            Component::Normal(_) => {}
            Component::CurDir => {}
            _ => {
                return Err(ArtifactError::InvalidKey {
                    key: key.to_string(),
                    reason: "must be a relative path without `..`",
                })
            }
        }
    }
    Ok(p)
}

/// Directory-rooted store. Keys are relative paths under `root`.
#[derive(Debug, Clone)]
pub struct FsArtifactStore {
    root: PathBuf,
}

impl FsArtifactStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl ArtifactStore for FsArtifactStore {
    fn get_blob(&self, key: &str) -> Result<Vec<u8>, ArtifactError> {
        let path = self.root.join(check_key(key)?);
        match fs::read(&path) {
            Ok(b) => Ok(b),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(ArtifactError::NotFound(key.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn put_blob(&self, key: &str, bytes: &[u8]) -> Result<(), ArtifactError> {
        let path = self.root.join(check_key(key)?);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        // Write-then-rename so readers never observe a partial blob.
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }
}

/// In-memory store (tests, ephemeral pipelines).
#[derive(Debug, Default)]
pub struct MemoryArtifactStore {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ArtifactStore for MemoryArtifactStore {
    fn get_blob(&self, key: &str) -> Result<Vec<u8>, ArtifactError> {
        check_key(key)?;
        let blobs = self.blobs.lock().unwrap_or_else(|p| p.into_inner());
        blobs
            .get(key)
            .cloned()
            .ok_or_else(|| ArtifactError::NotFound(key.to_string()))
    }

    fn put_blob(&self, key: &str, bytes: &[u8]) -> Result<(), ArtifactError> {
        check_key(key)?;
        let mut blobs = self.blobs.lock().unwrap_or_else(|p| p.into_inner());
        blobs.insert(key.to_string(), bytes.to_vec());
        Ok(())
    }
}

/// Registry laid out as `<root>/<run_id>/<name>`.
#[derive(Debug, Clone)]
pub struct FsModelRegistry {
    store: FsArtifactStore,
}

impl FsModelRegistry {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            store: FsArtifactStore::new(root),
        }
    }
}

impl ModelRegistry for FsModelRegistry {
    fn get_artifact(&self, run_id: &str, name: &str) -> Result<Vec<u8>, ArtifactError> {
        check_key(run_id)?;
        self.store.get_blob(&format!("{run_id}/{name}"))
    }
}
