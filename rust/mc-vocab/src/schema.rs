//! Reserved token layout and vocabulary file format.
//!
//! ### Layout
//! - id 0: `<PAD>`
//! - id 1: `<UNK>`
//! - id 2: `<BOS>`
//! - id 3: `<EOS>`
//! - ids 4..|V|: moves, most frequent first (ties by first appearance in the corpus)
//!
//! Changing this layout invalidates every trained weight file.

/// Dense token identifier in `[0, |V|)`.
pub type TokenId = u32;

pub const PAD: &str = "<PAD>";
pub const UNK: &str = "<UNK>";
pub const BOS: &str = "<BOS>";
pub const EOS: &str = "<EOS>";

pub const PAD_ID: TokenId = 0;
pub const UNK_ID: TokenId = 1;
pub const BOS_ID: TokenId = 2;
pub const EOS_ID: TokenId = 3;

/// Number of reserved ids; the first move gets this id.
pub const NUM_SPECIAL: usize = 4;

/// Special symbols in id order.
pub const SPECIAL_TOKENS: [&str; NUM_SPECIAL] = [PAD, UNK, BOS, EOS];

/// Increment this whenever the on-disk vocabulary JSON changes shape.
pub const VOCAB_FORMAT: u32 = 1;

#[inline]
pub fn is_special(id: TokenId) -> bool {
    (id as usize) < NUM_SPECIAL
}
