//! Vocabulary JSON persistence.
//!
//! On disk: `{"format": 1, "corpus_hash": "<blake3>", "vocab": {"<PAD>": 0, "e4": 4, ...}}`.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::schema::{TokenId, SPECIAL_TOKENS, VOCAB_FORMAT};
use crate::vocab::{VocabError, Vocabulary};

#[derive(Debug, Serialize, Deserialize)]
struct VocabFile {
    format: u32,
    corpus_hash: String,
    vocab: BTreeMap<String, TokenId>,
}

impl Vocabulary {
    pub fn to_json_bytes(&self) -> Result<Vec<u8>, VocabError> {
        let file = VocabFile {
            format: VOCAB_FORMAT,
            corpus_hash: self.corpus_hash().to_string(),
            vocab: (0..self.len() as TokenId)
                .filter_map(|id| self.token(id).map(|t| (t.to_string(), id)))
                .collect(),
        };
        Ok(serde_json::to_vec_pretty(&file)?)
    }

    /// Parse and validate: ids contiguous from 0, one token per id, reserved
    /// tokens on their reserved ids.
    pub fn from_json_bytes(bytes: &[u8]) -> Result<Self, VocabError> {
        let file: VocabFile = serde_json::from_slice(bytes)?;
        if file.format != VOCAB_FORMAT {
            return Err(VocabError::Invalid(format!(
                "unsupported format {} (expected {VOCAB_FORMAT})",
                file.format
            )));
        }
        let n = file.vocab.len();
        let mut by_id: Vec<Option<String>> = vec![None; n];
        for (token, id) in file.vocab {
            let slot = by_id.get_mut(id as usize).ok_or_else(|| {
                VocabError::Invalid(format!("id {id} for {token:?} is not contiguous (size {n})"))
            })?;
            if let Some(prev) = slot {
                return Err(VocabError::Invalid(format!(
                    "id {id} assigned to both {prev:?} and {token:?}"
                )));
            }
            *slot = Some(token);
        }
        // n distinct keys into n slots with no collision fills every slot.
        let tokens: Vec<String> = by_id.into_iter().flatten().collect();
        if tokens.len() != n {
            return Err(VocabError::Invalid("ids are not contiguous".to_string()));
        }
        for (id, special) in SPECIAL_TOKENS.iter().enumerate() {
            if tokens.get(id).map(String::as_str) != Some(*special) {
                return Err(VocabError::Invalid(format!(
                    "reserved token {special} must have id {id}"
                )));
            }
        }
        for (id, t) in tokens.iter().enumerate().skip(SPECIAL_TOKENS.len()) {
            if SPECIAL_TOKENS.contains(&t.as_str()) {
                return Err(VocabError::Invalid(format!(
                    "reserved token {t} repeated at id {id}"
                )));
            }
        }
        Ok(Vocabulary::from_parts(tokens, file.corpus_hash))
    }

    /// Atomic write (tmp + rename).
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), VocabError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, self.to_json_bytes()?)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, VocabError> {
        let path = path.as_ref();
        let bytes = match fs::read(path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(VocabError::MissingFile(path.display().to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        Self::from_json_bytes(&bytes)
    }
}
