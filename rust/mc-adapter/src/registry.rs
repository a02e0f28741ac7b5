//! Versioned adapter catalog with copy-on-write publication.
//!
//! Readers take an `Arc` snapshot and never hold the lock while merging or
//! scoring, so an in-flight request keeps seeing one catalog version even if
//! a new one is published meanwhile.

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

use crate::{AdapterDelta, AdapterError};

/// Immutable name → deltas map stamped with a version.
#[derive(Debug, Default)]
pub struct AdapterCatalog {
    version: u64,
    adapters: BTreeMap<String, Arc<[AdapterDelta]>>,
}

impl AdapterCatalog {
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.adapters.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Arc<[AdapterDelta]>> {
        self.adapters.get(name)
    }

    /// Deltas for `names`, in request order.
    pub fn resolve<S: AsRef<str>>(&self, names: &[S]) -> Result<Vec<&AdapterDelta>, AdapterError> {
        let mut out = Vec::new();
        for n in names {
            let n = n.as_ref();
            let set = self
                .adapters
                .get(n)
                .ok_or_else(|| AdapterError::UnknownAdapter(n.to_string()))?;
            out.extend(set.iter());
        }
        Ok(out)
    }
}

#[derive(Debug, Default)]
pub struct AdapterRegistry {
    current: RwLock<Arc<AdapterCatalog>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current catalog. Holds the read lock only for the `Arc` clone.
    pub fn snapshot(&self) -> Arc<AdapterCatalog> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn version(&self) -> u64 {
        self.snapshot().version
    }

    /// Replace the whole catalog. Returns the new version.
    pub fn publish(&self, adapters: BTreeMap<String, Vec<AdapterDelta>>) -> u64 {
        self.swap(|_| {
            adapters
                .into_iter()
                .map(|(k, v)| (k, Arc::<[AdapterDelta]>::from(v)))
                .collect()
        })
    }

    /// Add or replace one adapter; the rest of the catalog is carried over.
    pub fn insert(&self, name: impl Into<String>, deltas: Vec<AdapterDelta>) -> u64 {
        let name = name.into();
        let deltas: Arc<[AdapterDelta]> = Arc::from(deltas);
        self.swap(move |prev| {
            let mut next = prev.clone();
            next.insert(name, deltas);
            next
        })
    }

    /// Remove one adapter. `None` if it was not present.
    pub fn remove(&self, name: &str) -> Option<u64> {
        let mut removed = false;
        let v = self.swap(|prev| {
            let mut next = prev.clone();
            removed = next.remove(name).is_some();
            next
        });
        removed.then_some(v)
    }

    fn swap<F>(&self, f: F) -> u64
    where
        F: FnOnce(&BTreeMap<String, Arc<[AdapterDelta]>>) -> BTreeMap<String, Arc<[AdapterDelta]>>,
    {
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        let version = guard.version + 1;
        let adapters = f(&guard.adapters);
        tracing::info!(version, adapters = adapters.len(), "adapter catalog published");
        *guard = Arc::new(AdapterCatalog { version, adapters });
        version
    }
}
