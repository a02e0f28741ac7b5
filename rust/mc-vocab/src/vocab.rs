//! Bidirectional move ↔ token id table.

use std::sync::atomic::{AtomicU64, Ordering};

use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::schema::{
    is_special, TokenId, BOS_ID, EOS_ID, NUM_SPECIAL, PAD_ID, SPECIAL_TOKENS, UNK, UNK_ID,
};

#[derive(Debug, Error)]
pub enum VocabError {
    #[error("vocabulary file not found: {0}")]
    MissingFile(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid vocabulary: {0}")]
    Invalid(String),
    #[error("token id {0} is outside the vocabulary")]
    UnknownId(TokenId),
    #[error("token {token} at position {position} is not a playable move")]
    Unplayable { position: usize, token: String },
}

/// Limits applied while building from a corpus.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// Drop moves seen fewer times than this.
    pub min_count: u64,
    /// Keep at most this many move entries.
    pub max_size: Option<usize>,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            min_count: 1,
            max_size: None,
        }
    }
}

/// How [`Vocabulary::decode`] treats special tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeMode {
    /// Skip boundaries and padding; render `<UNK>` literally.
    Lenient,
    /// Every non-boundary token must be a real move.
    Playable,
}

/// One game as token ids. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenizedSequence {
    ids: Vec<TokenId>,
    unk_substitutions: u32,
}

impl TokenizedSequence {
    /// Wrap raw ids (e.g. read back from a shard).
    pub fn from_ids(ids: Vec<TokenId>) -> Self {
        let unk_substitutions = ids.iter().filter(|&&t| t == UNK_ID).count() as u32;
        Self {
            ids,
            unk_substitutions,
        }
    }

    pub fn ids(&self) -> &[TokenId] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Moves that were replaced by `<UNK>` during encoding.
    pub fn unk_substitutions(&self) -> u32 {
        self.unk_substitutions
    }

    /// Whether the sequence is closed by `<EOS>`.
    pub fn is_complete(&self) -> bool {
        self.ids.last() == Some(&EOS_ID)
    }

    pub fn into_ids(self) -> Vec<TokenId> {
        self.ids
    }
}

/// Built once, shared read-only. Only the substitution counter changes after
/// construction.
#[derive(Debug)]
pub struct Vocabulary {
    id_to_token: Vec<String>,
    token_to_id: FxHashMap<String, TokenId>,
    corpus_hash: String,
    unk_total: AtomicU64,
}

impl Vocabulary {
    /// Build from games in corpus order.
    ///
    /// Ids follow descending frequency; equal counts keep first-seen order so
    /// identical corpora always yield identical vocabularies.
    pub fn build<G, M>(games: &[G], opts: &BuildOptions) -> Self
    where
        G: AsRef<[M]>,
        M: AsRef<str>,
    {
        let mut hasher = blake3::Hasher::new();
        let mut counts: FxHashMap<&str, (u64, usize)> = FxHashMap::default();
        let mut next_seen = 0usize;

        for (gi, game) in games.iter().enumerate() {
            if gi > 0 {
                hasher.update(b"\n");
            }
            for (mi, mv) in game.as_ref().iter().enumerate() {
                let mv = mv.as_ref();
                if mi > 0 {
                    hasher.update(b" ");
                }
                hasher.update(mv.as_bytes());
                if mv.is_empty() || SPECIAL_TOKENS.contains(&mv) {
                    continue;
                }
                let e = counts.entry(mv).or_insert_with(|| {
                    let seen = next_seen;
                    next_seen += 1;
                    (0, seen)
                });
                e.0 += 1;
            }
        }

        let mut entries: Vec<(&str, u64, usize)> = counts
            .into_iter()
            .filter(|(_, (c, _))| *c >= opts.min_count)
            .map(|(m, (c, seen))| (m, c, seen))
            .collect();
        entries.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));
        if let Some(max) = opts.max_size {
            entries.truncate(max);
        }

        let tokens = SPECIAL_TOKENS
            .iter()
            .map(|s| s.to_string())
            .chain(entries.into_iter().map(|(m, _, _)| m.to_string()))
            .collect::<Vec<_>>();
        Self::from_parts(tokens, hasher.finalize().to_hex().to_string())
    }

    /// Assemble from an id-ordered token list. Callers guarantee the reserved
    /// prefix and uniqueness (see `store::from_file_repr`).
    pub(crate) fn from_parts(id_to_token: Vec<String>, corpus_hash: String) -> Self {
        let token_to_id = id_to_token
            .iter()
            .enumerate()
            .map(|(i, t)| (t.clone(), i as TokenId))
            .collect();
        Self {
            id_to_token,
            token_to_id,
            corpus_hash,
            unk_total: AtomicU64::new(0),
        }
    }

    /// Total entries including the reserved ids.
    pub fn len(&self) -> usize {
        self.id_to_token.len()
    }

    pub fn is_empty(&self) -> bool {
        self.id_to_token.len() <= NUM_SPECIAL
    }

    /// blake3 of the corpus this vocabulary was built from.
    pub fn corpus_hash(&self) -> &str {
        &self.corpus_hash
    }

    pub fn id_of(&self, token: &str) -> Option<TokenId> {
        self.token_to_id.get(token).copied()
    }

    pub fn token(&self, id: TokenId) -> Option<&str> {
        self.id_to_token.get(id as usize).map(String::as_str)
    }

    /// Move entries in id order (specials excluded).
    pub fn moves(&self) -> impl Iterator<Item = (TokenId, &str)> {
        self.id_to_token
            .iter()
            .enumerate()
            .skip(NUM_SPECIAL)
            .map(|(i, t)| (i as TokenId, t.as_str()))
    }

    /// `<UNK>` substitutions across every encode call on this vocabulary.
    pub fn unk_substitutions_total(&self) -> u64 {
        self.unk_total.load(Ordering::Relaxed)
    }

    fn lookup(&self, mv: &str, unk: &mut u32) -> TokenId {
        match self.token_to_id.get(mv) {
            Some(&id) if !is_special(id) => id,
            _ => {
                *unk += 1;
                UNK_ID
            }
        }
    }

    fn encode_inner<M: AsRef<str>>(&self, moves: &[M], close: bool) -> TokenizedSequence {
        let mut ids = Vec::with_capacity(moves.len() + 2);
        let mut unk = 0u32;
        ids.push(BOS_ID);
        for m in moves {
            ids.push(self.lookup(m.as_ref(), &mut unk));
        }
        if close {
            ids.push(EOS_ID);
        }
        if unk > 0 {
            self.unk_total.fetch_add(unk as u64, Ordering::Relaxed);
        }
        TokenizedSequence {
            ids,
            unk_substitutions: unk,
        }
    }

    /// Encode a full game: `<BOS> m1 … mn <EOS>`. Never fails.
    pub fn encode<M: AsRef<str>>(&self, moves: &[M]) -> TokenizedSequence {
        self.encode_inner(moves, true)
    }

    /// Encode a game in progress: `<BOS> m1 … mn` (no `<EOS>`).
    pub fn encode_history<M: AsRef<str>>(&self, moves: &[M]) -> TokenizedSequence {
        self.encode_inner(moves, false)
    }

    /// Map ids back to move strings.
    pub fn decode(
        &self,
        seq: &TokenizedSequence,
        mode: DecodeMode,
    ) -> Result<Vec<String>, VocabError> {
        let mut out = Vec::with_capacity(seq.len());
        for (position, &id) in seq.ids().iter().enumerate() {
            let token = self.token(id).ok_or(VocabError::UnknownId(id))?;
            match id {
                BOS_ID | EOS_ID => continue,
                PAD_ID | UNK_ID => {
                    if mode == DecodeMode::Playable {
                        return Err(VocabError::Unplayable {
                            position,
                            token: token.to_string(),
                        });
                    }
                    if id == UNK_ID {
                        out.push(UNK.to_string());
                    }
                }
                _ => out.push(token.to_string()),
            }
        }
        Ok(out)
    }
}
