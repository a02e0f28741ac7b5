use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use bytemuck::cast_slice;
use safetensors::tensor::{Dtype, TensorView};
use safetensors::SafeTensors;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::schema::{SHARD_FORMAT_VERSION, T_ATTENTION_MASK, T_INPUT_IDS, T_LABEL_IDS, T_LOSS_MASK};
use crate::window::Window;

#[derive(Debug, Error)]
pub enum ShardError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("safetensors: {0}")]
    Safetensors(#[from] safetensors::SafeTensorError),
    #[error("invalid window: {0}")]
    InvalidWindow(&'static str),
    #[error("invalid shard {path}: {reason}")]
    InvalidShard { path: String, reason: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShardMeta {
    pub format: u32,
    pub context_length: usize,
    pub stride: usize,
    pub vocab_hash: String,

    pub num_windows: usize,

    pub git_hash: Option<String>,
    pub config_hash: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ShardWriterConfig {
    pub out_dir: PathBuf,
    pub max_windows_per_shard: usize,
    pub context_length: usize,
    pub stride: usize,
    /// Corpus hash of the vocabulary the ids belong to.
    pub vocab_hash: String,
    pub git_hash: Option<String>,
    pub config_hash: Option<String>,
}

pub struct ShardWriter {
    cfg: ShardWriterConfig,
    shard_idx: u64,
    shards_written: u64,
    buf: Vec<Window>,
}

impl ShardWriter {
    /// Opens `out_dir`, continuing after the highest existing shard index.
    pub fn new(cfg: ShardWriterConfig) -> Result<Self, ShardError> {
        if cfg.max_windows_per_shard == 0 {
            return Err(ShardError::InvalidWindow(
                "max_windows_per_shard must be > 0",
            ));
        }
        if cfg.context_length == 0 {
            return Err(ShardError::InvalidWindow("context_length must be > 0"));
        }
        fs::create_dir_all(&cfg.out_dir)?;
        let shard_idx = list_shard_indices(&cfg.out_dir)?
            .last()
            .map(|i| i + 1)
            .unwrap_or(0);
        Ok(Self {
            cfg,
            shard_idx,
            shards_written: 0,
            buf: Vec::new(),
        })
    }

    pub fn push(&mut self, w: Window) -> Result<(), ShardError> {
        let l = self.cfg.context_length;
        if w.input_ids.len() != l
            || w.label_ids.len() != l
            || w.attention_mask.len() != l
            || w.loss_mask.len() != l
        {
            return Err(ShardError::InvalidWindow(
                "window length differs from context_length",
            ));
        }
        self.buf.push(w);
        if self.buf.len() >= self.cfg.max_windows_per_shard {
            self.flush()?;
        }
        Ok(())
    }

    pub fn extend<I: IntoIterator<Item = Window>>(&mut self, it: I) -> Result<(), ShardError> {
        for w in it {
            self.push(w)?;
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), ShardError> {
        if self.buf.is_empty() {
            return Ok(());
        }
        let n = self.buf.len();
        let l = self.cfg.context_length;

        let mut input_ids = Vec::<u32>::with_capacity(n * l);
        let mut label_ids = Vec::<u32>::with_capacity(n * l);
        let mut attention = Vec::<u8>::with_capacity(n * l);
        let mut loss = Vec::<u8>::with_capacity(n * l);
        for w in &self.buf {
            input_ids.extend_from_slice(&w.input_ids);
            label_ids.extend_from_slice(&w.label_ids);
            attention.extend_from_slice(&w.attention_mask);
            loss.extend_from_slice(&w.loss_mask);
        }

        let mut tensors: BTreeMap<String, TensorView<'_>> = BTreeMap::new();
        tensors.insert(
            T_INPUT_IDS.to_string(),
            TensorView::new(Dtype::U32, vec![n, l], cast_slice(&input_ids))?,
        );
        tensors.insert(
            T_LABEL_IDS.to_string(),
            TensorView::new(Dtype::U32, vec![n, l], cast_slice(&label_ids))?,
        );
        tensors.insert(
            T_ATTENTION_MASK.to_string(),
            TensorView::new(Dtype::U8, vec![n, l], &attention)?,
        );
        tensors.insert(
            T_LOSS_MASK.to_string(),
            TensorView::new(Dtype::U8, vec![n, l], &loss)?,
        );

        let final_st = safetensors_path(&self.cfg.out_dir, self.shard_idx);
        let tmp_st = final_st.with_extension("safetensors.tmp");
        let final_meta = meta_path(&self.cfg.out_dir, self.shard_idx);
        let tmp_meta = final_meta.with_extension("json.tmp");

        let st_bytes = safetensors::serialize(&tensors, &None)?;
        fs::write(&tmp_st, st_bytes)?;
        fs::rename(&tmp_st, &final_st)?;

        let meta = ShardMeta {
            format: SHARD_FORMAT_VERSION,
            context_length: l,
            stride: self.cfg.stride,
            vocab_hash: self.cfg.vocab_hash.clone(),
            num_windows: n,
            git_hash: self.cfg.git_hash.clone(),
            config_hash: self.cfg.config_hash.clone(),
        };
        fs::write(&tmp_meta, serde_json::to_vec_pretty(&meta)?)?;
        fs::rename(&tmp_meta, &final_meta)?;

        self.shard_idx += 1;
        self.shards_written += 1;
        self.buf.clear();
        Ok(())
    }

    /// Flush the tail and return how many shards this writer produced.
    pub fn finish(mut self) -> Result<u64, ShardError> {
        self.flush()?;
        Ok(self.shards_written)
    }
}

fn safetensors_path(dir: &Path, idx: u64) -> PathBuf {
    dir.join(format!("shard_{idx:06}.safetensors"))
}

fn meta_path(dir: &Path, idx: u64) -> PathBuf {
    dir.join(format!("shard_{idx:06}.meta.json"))
}

/// Indices of `shard_NNNNNN.safetensors` files in `dir`, ascending.
pub fn list_shard_indices(dir: &Path) -> Result<Vec<u64>, ShardError> {
    let mut out = Vec::new();
    if !dir.exists() {
        return Ok(out);
    }
    for entry in fs::read_dir(dir)? {
        let name = entry?.file_name();
        let Some(name) = name.to_str() else { continue };
        let Some(stem) = name
            .strip_prefix("shard_")
            .and_then(|s| s.strip_suffix(".safetensors"))
        else {
            continue;
        };
        if let Ok(idx) = stem.parse::<u64>() {
            out.push(idx);
        }
    }
    out.sort_unstable();
    Ok(out)
}

/// Read every window back out of one shard.
pub fn read_shard(path: &Path) -> Result<Vec<Window>, ShardError> {
    let bytes = fs::read(path)?;
    let st = SafeTensors::deserialize(&bytes)?;
    let bad = |reason: String| ShardError::InvalidShard {
        path: path.display().to_string(),
        reason,
    };

    let input = st.tensor(T_INPUT_IDS)?;
    let shape = input.shape().to_vec();
    if shape.len() != 2 {
        return Err(bad(format!("{T_INPUT_IDS} has rank {}", shape.len())));
    }
    let (n, l) = (shape[0], shape[1]);

    let ids = |name: &str| -> Result<Vec<u32>, ShardError> {
        let t = st.tensor(name)?;
        if t.dtype() != Dtype::U32 || t.shape() != [n, l] {
            return Err(bad(format!("{name} has unexpected dtype or shape")));
        }
        Ok(t.data()
            .chunks_exact(4)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect())
    };
    let mask = |name: &str| -> Result<Vec<u8>, ShardError> {
        let t = st.tensor(name)?;
        if t.dtype() != Dtype::U8 || t.shape() != [n, l] {
            return Err(bad(format!("{name} has unexpected dtype or shape")));
        }
        Ok(t.data().to_vec())
    };

    let input_ids = ids(T_INPUT_IDS)?;
    let label_ids = ids(T_LABEL_IDS)?;
    let attention = mask(T_ATTENTION_MASK)?;
    let loss = mask(T_LOSS_MASK)?;

    Ok((0..n)
        .map(|i| {
            let r = i * l..(i + 1) * l;
            Window {
                input_ids: input_ids[r.clone()].to_vec(),
                label_ids: label_ids[r.clone()].to_vec(),
                attention_mask: attention[r.clone()].to_vec(),
                loss_mask: loss[r].to_vec(),
            }
        })
        .collect())
}

pub fn read_meta(path: &Path) -> Result<ShardMeta, ShardError> {
    let bytes = fs::read(path)?;
    Ok(serde_json::from_slice(&bytes)?)
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PruneReport {
    pub before_shards: usize,
    pub after_shards: usize,
    pub deleted_shards: usize,
    pub deleted_min_idx: Option<u64>,
    pub deleted_max_idx: Option<u64>,
}

/// Keep the newest `keep` shards by index; delete older safetensors/meta pairs.
pub fn prune_shards_by_idx(dir: &Path, keep: usize) -> Result<PruneReport, ShardError> {
    let idxs = list_shard_indices(dir)?;
    let before = idxs.len();
    let cut = before.saturating_sub(keep);
    let doomed = &idxs[..cut];
    for &idx in doomed {
        fs::remove_file(safetensors_path(dir, idx))?;
        let m = meta_path(dir, idx);
        if m.exists() {
            fs::remove_file(m)?;
        }
    }
    Ok(PruneReport {
        before_shards: before,
        after_shards: before - cut,
        deleted_shards: cut,
        deleted_min_idx: doomed.first().copied(),
        deleted_max_idx: doomed.last().copied(),
    })
}

/// Remove half-written `*.tmp` files left by an interrupted writer.
pub fn cleanup_tmp_files(dir: &Path) -> Result<(), ShardError> {
    if !dir.exists() {
        return Ok(());
    }
    for entry in fs::read_dir(dir)? {
        let e = entry?;
        let p = e.path();
        if let Some(name) = p.file_name().and_then(|s| s.to_str()) {
            if name.ends_with(".safetensors.tmp") || name.ends_with(".meta.json.tmp") {
                let _ = fs::remove_file(&p);
            }
        }
    }
    Ok(())
}
