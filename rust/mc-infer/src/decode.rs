//! Masked, temperature-scaled softmax and deterministic top-k.

use std::cmp::Ordering;

/// Softmax of `logits / temperature` restricted to `allowed` indices.
///
/// Entries outside `allowed` are 0. The maximum surviving scaled logit is
/// subtracted before exponentiation. If any allowed logit scales to `+inf`
/// the mass is split evenly among those; if none is finite it is split evenly
/// over `allowed`. `temperature` must be finite and `> 0` (checked by callers).
pub fn masked_softmax(logits: &[f32], allowed: &[usize], temperature: f32) -> Vec<f32> {
    let mut out = vec![0.0f32; logits.len()];
    let allowed: Vec<usize> = allowed
        .iter()
        .copied()
        .filter(|&i| i < logits.len())
        .collect();
    if allowed.is_empty() {
        return out;
    }

    let scaled: Vec<f32> = allowed.iter().map(|&i| logits[i] / temperature).collect();

    let infinite: Vec<usize> = allowed
        .iter()
        .zip(&scaled)
        .filter(|(_, s)| **s == f32::INFINITY)
        .map(|(&i, _)| i)
        .collect();
    if !infinite.is_empty() {
        return uniform_into(out, &infinite);
    }

    let max = scaled
        .iter()
        .copied()
        .filter(|s| s.is_finite())
        .fold(f32::NEG_INFINITY, f32::max);
    if !max.is_finite() {
        return uniform_into(out, &allowed);
    }

    let mut sum = 0.0f32;
    for (&i, &s) in allowed.iter().zip(&scaled) {
        if s.is_finite() {
            let w = (s - max).exp();
            out[i] = w;
            sum += w;
        }
    }
    // sum >= 1 here since the max term contributes exp(0).
    for &i in &allowed {
        out[i] /= sum;
    }
    out
}

fn uniform_into(mut out: Vec<f32>, idx: &[usize]) -> Vec<f32> {
    let u = 1.0 / idx.len() as f32;
    for &i in idx {
        out[i] = u;
    }
    out
}

/// Highest-probability `k` of `candidates`, ties by index ascending.
pub fn top_k(probs: &[f32], candidates: &[usize], k: usize) -> Vec<(usize, f32)> {
    let mut v: Vec<(usize, f32)> = candidates
        .iter()
        .filter(|&&i| i < probs.len())
        .map(|&i| (i, probs[i]))
        .collect();
    v.sort_by(|a, b| match b.1.total_cmp(&a.1) {
        Ordering::Equal => a.0.cmp(&b.0),
        o => o,
    });
    v.dedup_by_key(|e| e.0);
    v.truncate(k);
    v
}

/// Rescale so the entries sum to 1; an all-zero input becomes uniform.
pub fn renormalize(ps: &mut [f32]) {
    if ps.is_empty() {
        return;
    }
    // f64 accumulation keeps the f32 results within one ulp of summing to 1.
    let sum: f64 = ps.iter().map(|&p| f64::from(p)).sum();
    if sum.is_finite() && sum > 0.0 {
        ps.iter_mut().for_each(|p| *p = (f64::from(*p) / sum) as f32);
    } else {
        let u = 1.0 / ps.len() as f32;
        ps.iter_mut().for_each(|p| *p = u);
    }
}
