//! Merging sub-word tokens into slot spans.
//!
//! Single left-to-right pass. An *anchor* is a non-special, non-continuation
//! token with a non-null label. From an anchor the span:
//!
//! 1. walks back over immediately preceding continuation tokens that no
//!    earlier span has claimed, but only when that run has no word start of
//!    its own: it must follow a special token, the start of the sequence or
//!    the end of the previous span;
//! 2. walks forward over every following continuation token, whatever label
//!    it was predicted with;
//! 3. keeps extending while the next whole-word token carries the same label.
//!
//! Special tokens are opaque walls: they never join a span and a
//! continuation never reaches across one. Continuation tokens with no anchor
//! have no label to inherit and are dropped.

use slotwise_core::{NULL_LABEL, Token, TokenSpan};

/// Build the non-overlapping slot spans of a decoded sequence, in order.
///
/// `labels[i]` is the winning label of `tokens[i]`. Extra entries on either
/// side are ignored.
pub fn merge_spans(tokens: &[Token], labels: &[usize]) -> Vec<TokenSpan> {
    let n = tokens.len().min(labels.len());
    let mut spans = Vec::new();
    // First index not yet claimed by a span.
    let mut floor = 0;
    let mut i = 0;

    while i < n {
        let token = &tokens[i];
        let label = labels[i];
        if token.is_special || token.is_continuation || label == NULL_LABEL {
            i += 1;
            continue;
        }

        let mut start = i;
        while start > floor && is_continuation(&tokens[start - 1]) {
            start -= 1;
        }
        // The run continues an earlier unlabelled word.
        if start < i && start > floor && is_word_start(&tokens[start - 1]) {
            start = i;
        }

        let mut end = absorb_continuations(tokens, i + 1, n);
        while end < n && is_word_start(&tokens[end]) && labels[end] == label {
            end = absorb_continuations(tokens, end + 1, n);
        }

        spans.push(TokenSpan { label, start, end });
        floor = end;
        i = end;
    }

    spans
}

fn is_continuation(token: &Token) -> bool {
    token.is_continuation && !token.is_special
}

fn is_word_start(token: &Token) -> bool {
    !token.is_continuation && !token.is_special
}

/// Index just past the continuation run starting at `from`.
fn absorb_continuations(tokens: &[Token], from: usize, n: usize) -> usize {
    let mut j = from;
    while j < n && is_continuation(&tokens[j]) {
        j += 1;
    }
    j
}
