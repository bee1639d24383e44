//! Span confidence.

use slotwise_core::{LabelDistribution, TokenSpan};

/// Mean probability of the span's label over its constituent tokens.
///
/// Continuation tokens count with the probability they give the span label,
/// not their own argmax. Tokens past the end of `distributions` are ignored;
/// a span with no scored constituents gets `0.0`.
pub fn span_confidence(span: &TokenSpan, distributions: &[LabelDistribution]) -> f32 {
    let (sum, count) = span
        .indices()
        .filter_map(|i| distributions.get(i))
        .map(|dist| dist.get(span.label).copied().unwrap_or(0.0))
        .filter(|p| !p.is_nan())
        .fold((0.0f32, 0usize), |(s, c), p| (s + p, c + 1));
    if count == 0 {
        return 0.0;
    }
    (sum / count as f32).clamp(0.0, 1.0)
}
