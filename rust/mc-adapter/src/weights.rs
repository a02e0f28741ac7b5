//! Named weight matrices loaded from safetensors.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;
use std::sync::Arc;

use bytemuck::cast_slice;
use mc_core::ArtifactStore;
use safetensors::tensor::{Dtype, TensorView};
use safetensors::SafeTensors;

use crate::{AdapterError, Matrix};

/// Read-only name → matrix map. Cloning is cheap: matrices are shared.
#[derive(Debug, Clone, Default)]
pub struct WeightView {
    tensors: BTreeMap<String, Arc<Matrix>>,
}

impl WeightView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, m: Matrix) {
        self.tensors.insert(name.into(), Arc::new(m));
    }

    pub(crate) fn insert_shared(&mut self, name: String, m: Arc<Matrix>) {
        self.tensors.insert(name, m);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<Matrix>> {
        self.tensors.get(name)
    }

    pub fn matrix(&self, name: &str) -> Result<&Matrix, AdapterError> {
        self.tensors
            .get(name)
            .map(Arc::as_ref)
            .ok_or_else(|| AdapterError::MissingTensor(name.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tensors.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }

    /// Whether both views hold the very same allocation for `name`.
    pub fn shares(&self, other: &WeightView, name: &str) -> bool {
        match (self.tensors.get(name), other.tensors.get(name)) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Same names, shapes and bit patterns.
    pub fn bits_eq(&self, other: &WeightView) -> bool {
        self.tensors.len() == other.tensors.len()
            && self
                .tensors
                .iter()
                .zip(&other.tensors)
                .all(|((na, a), (nb, b))| na == nb && (Arc::ptr_eq(a, b) || a.bits_eq(b)))
    }
}

pub(crate) fn read_f32(name: &str, t: &TensorView<'_>) -> Result<Vec<f32>, AdapterError> {
    if t.dtype() != Dtype::F32 {
        return Err(AdapterError::InvalidTensor {
            name: name.to_string(),
            reason: format!("dtype {:?} (expected F32)", t.dtype()),
        });
    }
    Ok(t.data()
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

/// 2-D tensors as-is; 1-D tensors become `[1, n]`.
pub(crate) fn read_matrix(name: &str, t: &TensorView<'_>) -> Result<Matrix, AdapterError> {
    let data = read_f32(name, t)?;
    let (rows, cols) = match t.shape() {
        [n] => (1, *n),
        [r, c] => (*r, *c),
        other => {
            return Err(AdapterError::InvalidTensor {
                name: name.to_string(),
                reason: format!("rank {} (expected 1 or 2)", other.len()),
            })
        }
    };
    Matrix::new(rows, cols, data).map_err(|e| match e {
        AdapterError::InvalidTensor { reason, .. } => AdapterError::InvalidTensor {
            name: name.to_string(),
            reason,
        },
        other => other,
    })
}

/// Parse a base-weight safetensors blob.
pub fn load_base(bytes: &[u8]) -> Result<WeightView, AdapterError> {
    let st = SafeTensors::deserialize(bytes)?;
    let mut view = WeightView::new();
    for (name, t) in st.tensors() {
        let m = read_matrix(&name, &t)?;
        view.insert(name, m);
    }
    Ok(view)
}

pub fn load_base_file(path: impl AsRef<Path>) -> Result<WeightView, AdapterError> {
    let bytes = fs::read(path)?;
    load_base(&bytes)
}

pub fn load_base_from(store: &dyn ArtifactStore, key: &str) -> Result<WeightView, AdapterError> {
    let bytes = store.get_blob(key)?;
    load_base(&bytes)
}

/// Serialize a view as 2-D F32 tensors.
pub fn weights_to_bytes(
    view: &WeightView,
    metadata: Option<HashMap<String, String>>,
) -> Result<Vec<u8>, AdapterError> {
    let mut tensors: BTreeMap<String, TensorView<'_>> = BTreeMap::new();
    for (name, m) in &view.tensors {
        tensors.insert(
            name.clone(),
            TensorView::new(Dtype::F32, vec![m.rows(), m.cols()], cast_slice(m.data()))?,
        );
    }
    Ok(safetensors::serialize(&tensors, &metadata)?)
}

/// Atomic write (tmp + rename).
pub fn save_weights(
    view: &WeightView,
    metadata: Option<HashMap<String, String>>,
    path: impl AsRef<Path>,
) -> Result<(), AdapterError> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let bytes = weights_to_bytes(view, metadata)?;
    let tmp = path.with_extension("safetensors.tmp");
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)?;
    Ok(())
}
