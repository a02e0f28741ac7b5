//! Low-rank adapter deltas and their composition onto a base view.
//!
//! A delta targeting `W ∈ R^{d_out×d_in}` carries `A ∈ R^{r×d_in}` and
//! `B ∈ R^{d_out×r}`; applying it yields `W + (alpha / r) · B · A`.
//!
//! On disk one safetensors file may hold several targets as
//! `<target>.lora_a` / `<target>.lora_b` pairs. `__metadata__` may carry a
//! file-wide `alpha` and per-target `<target>.alpha`; both default to the rank.

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use mc_core::ArtifactStore;
use safetensors::SafeTensors;

use crate::weights::read_matrix;
use crate::{AdapterError, Matrix, WeightView};

pub const LORA_A_SUFFIX: &str = ".lora_a";
pub const LORA_B_SUFFIX: &str = ".lora_b";
pub const META_ALPHA: &str = "alpha";

#[derive(Debug, Clone, PartialEq)]
pub struct AdapterDelta {
    target: String,
    a: Matrix,
    b: Matrix,
    alpha: f32,
}

impl AdapterDelta {
    pub fn new(target: impl Into<String>, a: Matrix, b: Matrix, alpha: f32) -> Result<Self, AdapterError> {
        let target = target.into();
        if a.rows() == 0 {
            return Err(AdapterError::InvalidTensor {
                name: format!("{target}{LORA_A_SUFFIX}"),
                reason: "rank must be >= 1".to_string(),
            });
        }
        if b.cols() != a.rows() {
            return Err(AdapterError::ShapeMismatch {
                target: format!("{target}{LORA_B_SUFFIX}"),
                expected: (b.rows(), a.rows()),
                got: b.shape(),
            });
        }
        if !alpha.is_finite() {
            return Err(AdapterError::InvalidMetadata {
                key: META_ALPHA.to_string(),
                value: alpha.to_string(),
            });
        }
        Ok(Self { target, a, b, alpha })
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn rank(&self) -> usize {
        self.a.rows()
    }

    pub fn alpha(&self) -> f32 {
        self.alpha
    }

    pub fn scale(&self) -> f32 {
        self.alpha / self.rank() as f32
    }

    pub fn a(&self) -> &Matrix {
        &self.a
    }

    pub fn b(&self) -> &Matrix {
        &self.b
    }

    /// Shape of the matrix this delta can be added to.
    pub fn target_shape(&self) -> (usize, usize) {
        (self.b.rows(), self.a.cols())
    }

    fn check_against(&self, base: &WeightView) -> Result<(), AdapterError> {
        let w = base.matrix(&self.target)?;
        if w.shape() != self.target_shape() {
            return Err(AdapterError::ShapeMismatch {
                target: self.target.clone(),
                expected: w.shape(),
                got: self.target_shape(),
            });
        }
        Ok(())
    }
}

fn parse_alpha(key: &str, value: &str) -> Result<f32, AdapterError> {
    value
        .trim()
        .parse::<f32>()
        .ok()
        .filter(|a| a.is_finite())
        .ok_or_else(|| AdapterError::InvalidMetadata {
            key: key.to_string(),
            value: value.to_string(),
        })
}

/// Parse every delta from an adapter blob, ordered by target name.
pub fn load_adapter(bytes: &[u8]) -> Result<Vec<AdapterDelta>, AdapterError> {
    let (_, header) = SafeTensors::read_metadata(bytes)?;
    let meta = header.metadata().clone().unwrap_or_default();
    let st = SafeTensors::deserialize(bytes)?;

    let mut pairs: BTreeMap<String, (Option<Matrix>, Option<Matrix>)> = BTreeMap::new();
    for (name, t) in st.tensors() {
        if let Some(target) = name.strip_suffix(LORA_A_SUFFIX) {
            pairs.entry(target.to_string()).or_default().0 = Some(read_matrix(&name, &t)?);
        } else if let Some(target) = name.strip_suffix(LORA_B_SUFFIX) {
            pairs.entry(target.to_string()).or_default().1 = Some(read_matrix(&name, &t)?);
        } else {
            return Err(AdapterError::InvalidTensor {
                name,
                reason: format!("expected a {LORA_A_SUFFIX} or {LORA_B_SUFFIX} suffix"),
            });
        }
    }

    let file_alpha = meta
        .get(META_ALPHA)
        .map(|v| parse_alpha(META_ALPHA, v))
        .transpose()?;

    let mut out = Vec::with_capacity(pairs.len());
    for (target, (a, b)) in pairs {
        let a = a.ok_or_else(|| AdapterError::MissingTensor(format!("{target}{LORA_A_SUFFIX}")))?;
        let b = b.ok_or_else(|| AdapterError::MissingTensor(format!("{target}{LORA_B_SUFFIX}")))?;
        let key = format!("{target}.{META_ALPHA}");
        let alpha = match meta.get(&key) {
            Some(v) => parse_alpha(&key, v)?,
            None => file_alpha.unwrap_or(a.rows() as f32),
        };
        out.push(AdapterDelta::new(target, a, b, alpha)?);
    }
    Ok(out)
}

pub fn load_adapter_from(
    store: &dyn ArtifactStore,
    key: &str,
) -> Result<Vec<AdapterDelta>, AdapterError> {
    let bytes = store.get_blob(key)?;
    load_adapter(&bytes)
}

/// Serialize deltas in the layout [`load_adapter`] reads. Each delta's alpha is
/// written as per-target metadata.
pub fn adapter_to_bytes(deltas: &[AdapterDelta]) -> Result<Vec<u8>, AdapterError> {
    let mut view = WeightView::new();
    let mut meta = HashMap::new();
    for d in deltas {
        view.insert(format!("{}{LORA_A_SUFFIX}", d.target), d.a.clone());
        view.insert(format!("{}{LORA_B_SUFFIX}", d.target), d.b.clone());
        meta.insert(format!("{}.{META_ALPHA}", d.target), d.alpha.to_string());
    }
    crate::weights::weights_to_bytes(&view, Some(meta))
}

/// Fail if any delta misses its target or disagrees with its shape.
pub fn validate_adapters<'a, I>(base: &WeightView, deltas: I) -> Result<(), AdapterError>
where
    I: IntoIterator<Item = &'a AdapterDelta>,
{
    for d in deltas {
        d.check_against(base)?;
    }
    Ok(())
}

/// Compose `deltas` in order onto `base`, returning a new view.
///
/// `base` is never mutated. Targets no delta touches are shared with `base`;
/// an empty list yields a view whose every matrix is the base allocation.
pub fn apply_adapters<'a, I>(base: &WeightView, deltas: I) -> Result<WeightView, AdapterError>
where
    I: IntoIterator<Item = &'a AdapterDelta>,
{
    let mut merged: BTreeMap<&str, Matrix> = BTreeMap::new();
    for d in deltas {
        d.check_against(base)?;
        let w = match merged.entry(d.target.as_str()) {
            Entry::Occupied(e) => e.into_mut(),
            Entry::Vacant(e) => e.insert(base.matrix(&d.target)?.clone()),
        };
        w.add_low_rank(&d.b, &d.a, d.scale());
    }

    let mut out = base.clone();
    for (name, m) in merged {
        out.insert_shared(name.to_string(), Arc::new(m));
    }
    Ok(out)
}
