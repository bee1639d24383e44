//! Mapping merged token spans back onto the query text.
//!
//! Sub-word tokenization loses character alignment, so a span's text is
//! rebuilt by detokenizing its pieces and then searched for in the query.
//! Matching is case-sensitive. A span whose text cannot be found is dropped;
//! an entity is never emitted with made-up offsets.

use slotwise_core::{SynonymMap, Token, TokenSpan};
use tracing::debug;

use crate::classifier::SubwordTokenizer;

/// Character and byte bounds of a match in the query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextMatch {
    /// Character offset of the first matched character.
    pub start: usize,
    /// Character offset just past the last matched character.
    pub end: usize,
    pub byte_start: usize,
    pub byte_end: usize,
}

/// A span located in the query, before a label and confidence are attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocatedSpan {
    /// `query[start..end]`, verbatim.
    pub text: String,
    /// `text` after synonym resolution.
    pub value: String,
    pub start: usize,
    pub end: usize,
}

/// Rebuild the surface text of `span` with the tokenizer's detokenization.
pub fn reconstruct(span: &TokenSpan, tokens: &[Token], tokenizer: &dyn SubwordTokenizer) -> String {
    let end = span.end.min(tokens.len());
    let start = span.start.min(end);
    tokenizer.detokenize(&tokens[start..end])
}

/// Locate `span` in `query` and normalize its value.
///
/// The detokenized text is tried verbatim first, then with detokenization
/// whitespace removed, then with whitespace ignored on both sides (so
/// `play list` finds `playlist` and `guest list` survives a double space).
/// The first occurrence wins.
pub fn locate_span(
    span: &TokenSpan,
    tokens: &[Token],
    query: &str,
    tokenizer: &dyn SubwordTokenizer,
    synonyms: &SynonymMap,
) -> Option<LocatedSpan> {
    let rebuilt = reconstruct(span, tokens, tokenizer);
    let Some(m) = find_span_text(query, &rebuilt) else {
        debug!(
            label = span.label,
            start_token = span.start,
            end_token = span.end,
            rebuilt = %rebuilt,
            "span text not found in query, dropping"
        );
        return None;
    };

    let text = query[m.byte_start..m.byte_end].to_string();
    let value = synonyms.resolve(&text).to_string();
    Some(LocatedSpan {
        text,
        value,
        start: m.start,
        end: m.end,
    })
}

/// Find `needle` in `haystack`, falling back from exact to
/// whitespace-insensitive matching.
pub fn find_span_text(haystack: &str, needle: &str) -> Option<TextMatch> {
    let needle = needle.trim();
    if needle.is_empty() {
        return None;
    }
    if let Some(m) = find_exact(haystack, needle) {
        return Some(m);
    }
    let collapsed: String = needle.chars().filter(|c| !c.is_whitespace()).collect();
    if collapsed != needle
        && let Some(m) = find_exact(haystack, &collapsed)
    {
        return Some(m);
    }
    find_collapsed(haystack, &collapsed)
}

fn find_exact(haystack: &str, needle: &str) -> Option<TextMatch> {
    let byte_start = haystack.find(needle)?;
    let byte_end = byte_start + needle.len();
    let start = haystack[..byte_start].chars().count();
    Some(TextMatch {
        start,
        end: start + needle.chars().count(),
        byte_start,
        byte_end,
    })
}

/// Match `needle` (no whitespace) against the non-whitespace characters of
/// `haystack`, reporting bounds in the original string.
fn find_collapsed(haystack: &str, needle: &str) -> Option<TextMatch> {
    let needle: Vec<char> = needle.chars().collect();
    // (char offset, byte offset, char) for every non-whitespace character.
    let hay: Vec<(usize, usize, char)> = haystack
        .char_indices()
        .enumerate()
        .filter(|(_, (_, c))| !c.is_whitespace())
        .map(|(ci, (bi, c))| (ci, bi, c))
        .collect();

    if needle.is_empty() || needle.len() > hay.len() {
        return None;
    }

    (0..=hay.len() - needle.len()).find_map(|s| {
        let window = &hay[s..s + needle.len()];
        if !window.iter().zip(&needle).all(|(h, n)| h.2 == *n) {
            return None;
        }
        let (start, byte_start, _) = window[0];
        let (last, last_byte, last_char) = window[window.len() - 1];
        Some(TextMatch {
            start,
            end: last + 1,
            byte_start,
            byte_end: last_byte + last_char.len_utf8(),
        })
    })
}
