//! Contracts for the tokenizer and the transformer heads.
//!
//! Implementations must be deterministic for a fixed loaded model and input,
//! and safe to call from many request tasks at once.

use slotwise_core::{LabelDistribution, Result, Token};

/// Sub-word tokenizer adapter.
pub trait SubwordTokenizer: Send + Sync {
    /// Tokenize `text`, special tokens included, in sequence order.
    fn tokenize(&self, text: &str) -> Result<Vec<Token>>;

    /// Join tokens back into text, stripping continuation markers.
    fn detokenize(&self, tokens: &[Token]) -> String;

    /// The reserved tokens (`[CLS]`, `[SEP]`, `[PAD]`, ...).
    fn special_tokens(&self) -> &[String];
}

/// Token classification head: one distribution per input token, same order.
pub trait SequenceClassifier: Send + Sync {
    fn classify_sequence(&self, tokens: &[Token]) -> Result<Vec<LabelDistribution>>;
}

/// Sequence classification head: one distribution for the whole text.
pub trait TextClassifier: Send + Sync {
    fn classify_text(&self, text: &str) -> Result<LabelDistribution>;
}
