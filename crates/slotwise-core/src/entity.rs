//! Wire-level results: entities, scores, and per-model payloads.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A located slot value.
///
/// `start..end` are character offsets into the original query and
/// `text == query[start..end]`. `value` is `text` after synonym resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub entity: String,
    pub value: String,
    pub text: String,
    pub start: usize,
    pub end: usize,
    pub confidence: f32,
}

/// Winning label of a flat classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentScore {
    pub name: String,
    pub confidence: f32,
}

/// Language identification result, shaped like an entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LanguageGuess {
    pub entity: String,
    pub value: String,
    pub confidence: f32,
}

impl LanguageGuess {
    pub fn new(value: impl Into<String>, confidence: f32) -> Self {
        Self {
            entity: "language".into(),
            value: value.into(),
            confidence,
        }
    }
}

/// Output of one predictor for one query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Prediction {
    Language {
        text: String,
        language: LanguageGuess,
    },
    Intent {
        text: String,
        intent: IntentScore,
    },
    Slots {
        text: String,
        entities: Vec<Entity>,
    },
    Joint {
        text: String,
        intent: IntentScore,
        entities: Vec<Entity>,
    },
}

impl Prediction {
    pub fn text(&self) -> &str {
        match self {
            Self::Language { text, .. }
            | Self::Intent { text, .. }
            | Self::Slots { text, .. }
            | Self::Joint { text, .. } => text,
        }
    }

    pub fn intent(&self) -> Option<&IntentScore> {
        match self {
            Self::Intent { intent, .. } | Self::Joint { intent, .. } => Some(intent),
            _ => None,
        }
    }

    pub fn entities(&self) -> &[Entity] {
        match self {
            Self::Slots { entities, .. } | Self::Joint { entities, .. } => entities,
            _ => &[],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Success,
    Failed,
}

/// Per-model outcome inside a multi-model response.
///
/// Serialized as `{"predictions": .., "status": "success"}` or
/// `{"error": .., "status": "failed"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PredictorResult<T = Prediction> {
    Success { predictions: T, status: Status },
    Failed { error: String, status: Status },
}

impl<T> PredictorResult<T> {
    pub fn success(predictions: T) -> Self {
        Self::Success {
            predictions,
            status: Status::Success,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self::Failed {
            error: error.into(),
            status: Status::Failed,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn predictions(&self) -> Option<&T> {
        match self {
            Self::Success { predictions, .. } => Some(predictions),
            Self::Failed { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Failed { error, .. } => Some(error),
            Self::Success { .. } => None,
        }
    }
}

/// Combined, language-routed NLU result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParseResult {
    pub text: String,
    pub language: Option<LanguageGuess>,
    pub intent: Option<IntentScore>,
    pub entities: Vec<Entity>,
    /// Models that failed while building this result, with their error.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub failures: BTreeMap<String, String>,
}
