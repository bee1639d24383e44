//! Sub-word tokens and the spans the merger builds from them.

use std::ops::Range;

/// Continuation marker used by WordPiece vocabularies (`tu`, `##ne`).
pub const WORDPIECE_PREFIX: &str = "##";

/// One sub-word token of a tokenized query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub text: String,
    /// Vocabulary id, fed to the classifier.
    pub id: u32,
    /// Position in the tokenized sequence (special tokens included).
    pub index: usize,
    /// Fragment of the previous whole word.
    pub is_continuation: bool,
    /// Padding, `[CLS]`, `[SEP]` and friends.
    pub is_special: bool,
}

impl Token {
    /// Build a token from a raw vocabulary piece, deriving the continuation
    /// flag from `prefix`. Special tokens are never continuations.
    pub fn from_piece(index: usize, text: &str, id: u32, prefix: &str, is_special: bool) -> Self {
        Self {
            text: text.to_string(),
            id,
            index,
            is_continuation: !is_special && !prefix.is_empty() && text.starts_with(prefix),
            is_special,
        }
    }

    /// Piece text with the continuation marker removed.
    pub fn stripped<'a>(&'a self, prefix: &str) -> &'a str {
        if self.is_continuation {
            self.text.strip_prefix(prefix).unwrap_or(&self.text)
        } else {
            &self.text
        }
    }
}

/// A maximal contiguous run of tokens sharing one non-null slot label.
///
/// `start..end` is a half-open range of token indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenSpan {
    pub label: usize,
    pub start: usize,
    pub end: usize,
}

impl TokenSpan {
    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn indices(&self) -> Range<usize> {
        self.start..self.end
    }

    pub fn overlaps(&self, other: &TokenSpan) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// Join WordPiece pieces back into text: pieces are space-separated and a
/// continuation piece is glued to its predecessor without its marker.
pub fn wordpiece_detokenize<'a>(pieces: impl IntoIterator<Item = &'a str>, prefix: &str) -> String {
    let mut out = String::new();
    for piece in pieces {
        match piece.strip_prefix(prefix).filter(|_| !prefix.is_empty()) {
            Some(rest) => out.push_str(rest),
            None => {
                if !out.is_empty() {
                    out.push(' ');
                }
                out.push_str(piece);
            }
        }
    }
    out.trim().to_string()
}
