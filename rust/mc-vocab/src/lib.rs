//! mc-vocab: move vocabulary, tokenizer and corpus parsing.

pub mod corpus;
pub mod schema;
pub mod store;
pub mod vocab;

pub use corpus::{is_plausible_san, parse_corpus, parse_game_line, read_corpus, CorpusError};
pub use schema::{
    is_special, TokenId, BOS, BOS_ID, EOS, EOS_ID, NUM_SPECIAL, PAD, PAD_ID, UNK, UNK_ID,
};
pub use vocab::{BuildOptions, DecodeMode, TokenizedSequence, VocabError, Vocabulary};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
