//! Fixed-length causal windows over tokenized games.
//!
//! For a window starting at `s` over a sequence of `n` tokens:
//! - `input_ids[i] = seq[s + i]`, right-padded with `<PAD>` past the end
//! - `label_ids[i] = input_ids[i + 1]`; the last label is always `<PAD>`
//! - `attention_mask[i] = 1` iff `input_ids[i]` is a real token
//! - `loss_mask[i] = 1` iff `label_ids[i]` is a real token
//!
//! The last label position in every window has no ground truth inside the
//! window and is therefore always excluded by `loss_mask`.

use std::ops::AddAssign;

use mc_vocab::{TokenId, TokenizedSequence, PAD_ID};
use rayon::prelude::*;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WindowError {
    #[error("context_length must be >= 1, got {0}")]
    InvalidContextLength(usize),
    #[error("stride must be >= 1, got {0}")]
    InvalidStride(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Window {
    pub input_ids: Vec<TokenId>,
    pub label_ids: Vec<TokenId>,
    pub attention_mask: Vec<u8>,
    pub loss_mask: Vec<u8>,
}

impl Window {
    /// Real (non-pad) input tokens.
    pub fn real_len(&self) -> usize {
        self.attention_mask.iter().filter(|&&m| m == 1).count()
    }

    pub fn pad_len(&self) -> usize {
        self.input_ids.len() - self.real_len()
    }

    pub fn loss_positions(&self) -> usize {
        self.loss_mask.iter().filter(|&&m| m == 1).count()
    }
}

/// Counters for one windowing pass. `pad_tokens` is the DataQualityWarning
/// surfaced for padding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WindowStats {
    pub sequences: u64,
    pub windows: u64,
    pub loss_tokens: u64,
    pub pad_tokens: u64,
}

impl AddAssign for WindowStats {
    fn add_assign(&mut self, o: Self) {
        self.sequences += o.sequences;
        self.windows += o.windows;
        self.loss_tokens += o.loss_tokens;
        self.pad_tokens += o.pad_tokens;
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Windower {
    context_length: usize,
    stride: usize,
}

impl Windower {
    pub fn new(context_length: usize, stride: usize) -> Result<Self, WindowError> {
        if context_length == 0 {
            return Err(WindowError::InvalidContextLength(context_length));
        }
        if stride == 0 {
            return Err(WindowError::InvalidStride(stride));
        }
        Ok(Self {
            context_length,
            stride,
        })
    }

    pub fn context_length(&self) -> usize {
        self.context_length
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    fn slice(&self, ids: &[TokenId]) -> Window {
        let l = self.context_length;
        let real = ids.len().min(l);

        let mut input_ids = vec![PAD_ID; l];
        input_ids[..real].copy_from_slice(&ids[..real]);

        let mut label_ids = vec![PAD_ID; l];
        label_ids[..l - 1].copy_from_slice(&input_ids[1..]);

        let attention_mask = (0..l).map(|i| u8::from(i < real)).collect();
        let loss_mask = (0..l).map(|i| u8::from(i + 1 < real)).collect();

        Window {
            input_ids,
            label_ids,
            attention_mask,
            loss_mask,
        }
    }

    /// Window one sequence. Always returns at least one window.
    pub fn window(&self, seq: &TokenizedSequence) -> Vec<Window> {
        let ids = seq.ids();
        let n = ids.len();
        let mut out = Vec::new();
        let mut start = 0usize;
        loop {
            let end = (start + self.context_length).min(n);
            out.push(self.slice(&ids[start.min(n)..end]));
            if start + self.context_length >= n {
                break;
            }
            start += self.stride;
            // A stride wider than the window can step past the last token.
            if start >= n {
                break;
            }
        }
        out
    }

    /// Window many sequences in parallel. Output order follows input order.
    pub fn window_all(&self, seqs: &[TokenizedSequence]) -> (Vec<Window>, WindowStats) {
        let per_seq: Vec<Vec<Window>> = seqs.par_iter().map(|s| self.window(s)).collect();

        let mut stats = WindowStats {
            sequences: seqs.len() as u64,
            ..WindowStats::default()
        };
        let mut out = Vec::with_capacity(per_seq.iter().map(Vec::len).sum());
        for ws in per_seq {
            for w in ws {
                stats.windows += 1;
                stats.loss_tokens += w.loss_positions() as u64;
                stats.pad_tokens += w.pad_len() as u64;
                out.push(w);
            }
        }
        (out, stats)
    }
}
