//! Test doubles for the collaborator traits.

use std::collections::HashMap;

use slotwise_core::{
    LabelDistribution, NluError, Result, Token, WORDPIECE_PREFIX, wordpiece_detokenize,
};

use crate::classifier::{SequenceClassifier, SubwordTokenizer, TextClassifier};

fn is_bracketed(piece: &str) -> bool {
    piece.starts_with('[') && piece.ends_with(']')
}

/// Tokens for literal WordPiece pieces; `[..]` pieces are special.
pub fn pieces(p: &[&str]) -> Vec<Token> {
    p.iter()
        .enumerate()
        .map(|(i, s)| Token::from_piece(i, s, i as u32, WORDPIECE_PREFIX, is_bracketed(s)))
        .collect()
}

/// Tokenizer that returns a canned piece sequence per input text, wrapped in
/// `[CLS]`/`[SEP]`.
pub struct ScriptedTokenizer {
    scripts: HashMap<String, Vec<&'static str>>,
    special: Vec<String>,
}

impl ScriptedTokenizer {
    pub fn new(text: &str, body: &[&'static str]) -> Self {
        Self {
            scripts: HashMap::new(),
            special: vec!["[CLS]".into(), "[SEP]".into()],
        }
        .with(text, body)
    }

    pub fn with(mut self, text: &str, body: &[&'static str]) -> Self {
        self.scripts.insert(text.to_string(), body.to_vec());
        self
    }
}

impl SubwordTokenizer for ScriptedTokenizer {
    fn tokenize(&self, text: &str) -> Result<Vec<Token>> {
        let body = self
            .scripts
            .get(text)
            .ok_or_else(|| NluError::Prediction(format!("no script for {text:?}")))?;
        let mut all = vec!["[CLS]"];
        all.extend(body.iter().copied());
        all.push("[SEP]");
        Ok(pieces(&all))
    }

    fn detokenize(&self, tokens: &[Token]) -> String {
        wordpiece_detokenize(tokens.iter().map(|t| t.text.as_str()), WORDPIECE_PREFIX)
    }

    fn special_tokens(&self) -> &[String] {
        &self.special
    }
}

/// Sequence head returning a fixed distribution list, or an error.
pub struct FixedSequence(pub Result<Vec<LabelDistribution>, String>);

impl SequenceClassifier for FixedSequence {
    fn classify_sequence(&self, _tokens: &[Token]) -> Result<Vec<LabelDistribution>> {
        self.0.clone().map_err(NluError::Prediction)
    }
}

/// Text head returning a fixed distribution.
pub struct FixedText(pub LabelDistribution);

impl TextClassifier for FixedText {
    fn classify_text(&self, _text: &str) -> Result<LabelDistribution> {
        Ok(self.0.clone())
    }
}

/// One-hot-ish distribution: `p` on `label`, the rest spread over the others.
pub fn peaked(width: usize, label: usize, p: f32) -> LabelDistribution {
    let rest = if width > 1 { (1.0 - p) / (width - 1) as f32 } else { 0.0 };
    (0..width).map(|i| if i == label { p } else { rest }).collect()
}
