pub mod entity;
pub mod error;
pub mod labels;
pub mod token;

pub use entity::{
    Entity, IntentScore, LanguageGuess, ParseResult, Prediction, PredictorResult, Status,
};
pub use error::{NluError, Result};
pub use labels::{LabelDistribution, LabelVocab, NULL_LABEL, SynonymEntry, SynonymMap};
pub use token::{Token, TokenSpan, WORDPIECE_PREFIX, wordpiece_detokenize};
