//! Flat classification: pick the winning intent or language.

use slotwise_core::{IntentScore, LabelDistribution, LabelVocab, NluError, Result};

use crate::decode::argmax;

/// Winning label name and its probability.
pub fn score(distribution: &LabelDistribution, vocab: &LabelVocab) -> Result<IntentScore> {
    vocab.check_width(distribution.len())?;
    let best = argmax(distribution)
        .ok_or_else(|| NluError::Configuration("empty class distribution".into()))?;
    let name = vocab
        .name(best)
        .ok_or_else(|| NluError::Configuration(format!("label index {best} out of range")))?;
    let confidence = distribution[best];
    Ok(IntentScore {
        name: name.to_string(),
        confidence: if confidence.is_nan() { 0.0 } else { confidence.clamp(0.0, 1.0) },
    })
}
