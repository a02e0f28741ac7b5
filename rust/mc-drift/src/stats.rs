//! Token-stream statistics shared by baselines and samples.

use std::collections::BTreeMap;

use mc_vocab::{is_special, TokenId, TokenizedSequence, PAD_ID, UNK_ID};

/// Counts over a set of tokenized sequences. `<PAD>` is never counted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SequenceStats {
    pub sequences: u64,
    /// Non-special tokens plus `<UNK>`.
    pub move_tokens: u64,
    pub unk_tokens: u64,
    pub unigram: BTreeMap<TokenId, u64>,
    pub bigram: BTreeMap<(TokenId, TokenId), u64>,
}

impl SequenceStats {
    pub fn from_sequences<'a, I>(seqs: I) -> Self
    where
        I: IntoIterator<Item = &'a TokenizedSequence>,
    {
        let mut s = Self::default();
        for seq in seqs {
            s.add(seq);
        }
        s
    }

    pub fn add(&mut self, seq: &TokenizedSequence) {
        self.sequences += 1;
        let mut prev: Option<TokenId> = None;
        for &id in seq.ids() {
            if id == PAD_ID {
                continue;
            }
            *self.unigram.entry(id).or_insert(0) += 1;
            if let Some(p) = prev {
                *self.bigram.entry((p, id)).or_insert(0) += 1;
            }
            prev = Some(id);
            if id == UNK_ID {
                self.unk_tokens += 1;
                self.move_tokens += 1;
            } else if !is_special(id) {
                self.move_tokens += 1;
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.sequences == 0
    }

    /// `<UNK>` share of move positions; 0 when there are none.
    pub fn unk_rate(&self) -> f64 {
        if self.move_tokens == 0 {
            return 0.0;
        }
        self.unk_tokens as f64 / self.move_tokens as f64
    }

    /// Moves per sequence.
    pub fn mean_length(&self) -> f64 {
        if self.sequences == 0 {
            return 0.0;
        }
        self.move_tokens as f64 / self.sequences as f64
    }
}

/// Jensen–Shannon divergence (base 2, in `[0, 1]`) between two count tables.
///
/// Two empty tables are identical (0); one empty table against a non-empty
/// one is maximally divergent (1).
pub fn js_divergence<K: Ord>(p: &BTreeMap<K, u64>, q: &BTreeMap<K, u64>) -> f64 {
    let np: u64 = p.values().sum();
    let nq: u64 = q.values().sum();
    match (np, nq) {
        (0, 0) => return 0.0,
        (0, _) | (_, 0) => return 1.0,
        _ => {}
    }
    let (np, nq) = (np as f64, nq as f64);

    // Each key contributes 0.5 * (pi log2(pi/mi) + qi log2(qi/mi)).
    let term = |x: f64, m: f64| if x > 0.0 { x * (x / m).log2() } else { 0.0 };
    let mut js = 0.0;
    for (k, &c) in p {
        let pi = c as f64 / np;
        let qi = q.get(k).copied().unwrap_or(0) as f64 / nq;
        let m = 0.5 * (pi + qi);
        js += 0.5 * (term(pi, m) + term(qi, m));
    }
    for (k, &c) in q {
        if p.contains_key(k) {
            continue;
        }
        // pi = 0, mi = qi / 2
        let qi = c as f64 / nq;
        js += 0.5 * term(qi, 0.5 * qi);
    }
    js.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counts(v: &[(u32, u64)]) -> BTreeMap<u32, u64> {
        v.iter().copied().collect()
    }

    #[test]
    fn js_is_zero_for_proportional_tables() {
        let a = counts(&[(4, 2), (5, 6)]);
        let b = counts(&[(4, 1), (5, 3)]);
        assert!(js_divergence(&a, &b).abs() < 1e-12);
    }

    #[test]
    fn js_is_one_for_disjoint_support_and_symmetric() {
        let a = counts(&[(4, 3)]);
        let b = counts(&[(5, 7)]);
        assert!((js_divergence(&a, &b) - 1.0).abs() < 1e-12);

        let c = counts(&[(4, 1), (5, 3), (6, 2)]);
        let d = counts(&[(4, 5), (6, 1)]);
        let x = js_divergence(&c, &d);
        assert!((x - js_divergence(&d, &c)).abs() < 1e-12);
        assert!(x > 0.0 && x < 1.0);
    }

    #[test]
    fn empty_tables() {
        let e: BTreeMap<u32, u64> = BTreeMap::new();
        assert_eq!(js_divergence(&e, &e), 0.0);
        assert_eq!(js_divergence(&e, &counts(&[(4, 1)])), 1.0);
    }

    #[test]
    fn stats_skip_pad_and_count_moves() {
        // <BOS> e4 <UNK> <EOS> <PAD>
        let seq = TokenizedSequence::from_ids(vec![2, 4, 1, 3, 0]);
        let s = SequenceStats::from_sequences([&seq]);
        assert_eq!(s.sequences, 1);
        assert_eq!(s.move_tokens, 2);
        assert_eq!(s.unk_tokens, 1);
        assert!(!s.unigram.contains_key(&PAD_ID));
        assert_eq!(s.bigram.get(&(2, 4)), Some(&1));
        assert_eq!(s.bigram.get(&(1, 3)), Some(&1));
        assert_eq!(s.bigram.len(), 3);
        assert!((s.unk_rate() - 0.5).abs() < 1e-12);
        assert!((s.mean_length() - 2.0).abs() < 1e-12);
    }
}
