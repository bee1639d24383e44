//! Per-token label decoding.

use slotwise_core::{LabelDistribution, LabelVocab, NluError, Result};

/// Index of the highest score, ties going to the lowest index.
///
/// NaN scores never win. Returns `None` only for an empty slice.
pub fn argmax(scores: &[f32]) -> Option<usize> {
    if scores.is_empty() {
        return None;
    }
    let mut best: Option<(usize, f32)> = None;
    for (i, &s) in scores.iter().enumerate() {
        if s.is_nan() {
            continue;
        }
        match best {
            Some((_, b)) if s <= b => {}
            _ => best = Some((i, s)),
        }
    }
    Some(best.map(|(i, _)| i).unwrap_or(0))
}

/// Winning label index for every token.
///
/// A distribution whose width differs from the vocabulary is a configuration
/// error and fails the whole decode.
pub fn decode_labels(
    distributions: &[LabelDistribution],
    vocab: &LabelVocab,
) -> Result<Vec<usize>> {
    distributions
        .iter()
        .enumerate()
        .map(|(i, dist)| {
            vocab.check_width(dist.len()).map_err(|e| match e {
                NluError::Configuration(msg) => {
                    NluError::Configuration(format!("token {i}: {msg}"))
                }
                other => other,
            })?;
            argmax(dist)
                .ok_or_else(|| NluError::Configuration(format!("token {i}: empty distribution")))
        })
        .collect()
}

/// Softmax in place, for heads that emit raw logits.
pub fn softmax(logits: &mut [f32]) {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    if !max.is_finite() {
        return;
    }
    let mut sum = 0.0f32;
    for v in logits.iter_mut() {
        *v = (*v - max).exp();
        sum += *v;
    }
    if sum > 0.0 {
        for v in logits.iter_mut() {
            *v /= sum;
        }
    }
}
