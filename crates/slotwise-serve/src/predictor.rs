//! Named, loaded predictors and the input they consume.

use std::collections::{BTreeMap, BTreeSet};

use slotwise_ai::{ModelKind, Pipeline};
use slotwise_core::{NluError, Prediction, Result};

use crate::upload::RequestArtifacts;

/// Input feature carrying the query text.
pub const TEXT_FEATURE: &str = "text";

/// Everything a request supplies to its predictors: scalar form fields and
/// the temp files of uploaded parts.
#[derive(Default)]
pub struct PredictInput {
    pub fields: BTreeMap<String, String>,
    pub artifacts: RequestArtifacts,
}

impl PredictInput {
    pub fn from_text(text: impl Into<String>) -> Self {
        let mut fields = BTreeMap::new();
        fields.insert(TEXT_FEATURE.to_string(), text.into());
        Self {
            fields,
            artifacts: RequestArtifacts::new(),
        }
    }

    pub fn text(&self) -> Option<&str> {
        self.fields.get(TEXT_FEATURE).map(String::as_str)
    }

    pub fn has_feature(&self, name: &str) -> bool {
        self.fields.contains_key(name) || self.artifacts.get(name).is_some()
    }

    pub fn missing_features<'a>(&self, required: &[&'a str]) -> BTreeSet<&'a str> {
        required.iter().copied().filter(|f| !self.has_feature(f)).collect()
    }
}

/// A loaded model that can answer predictions.
///
/// `predict` runs on a blocking thread and may be called concurrently.
pub trait Predictor: Send + Sync {
    fn name(&self) -> &str;

    fn kind(&self) -> ModelKind;

    /// Language the model serves; `None` for language-agnostic models.
    fn language(&self) -> Option<&str>;

    fn required_features(&self) -> &[&'static str] {
        &[TEXT_FEATURE]
    }

    fn predict(&self, input: &PredictInput) -> Result<Prediction>;
}

/// Check the input carries every feature `predictor` needs, then predict.
pub fn run_predictor(predictor: &dyn Predictor, input: &PredictInput) -> Result<Prediction> {
    let missing = input.missing_features(predictor.required_features());
    if !missing.is_empty() {
        return Err(NluError::Validation(format!("Missing features: {missing:?}.")));
    }
    predictor.predict(input)
}

/// A pipeline loaded from a model directory.
pub struct ModelPredictor {
    name: String,
    language: Option<String>,
    pipeline: Pipeline,
}

impl ModelPredictor {
    pub fn new(name: impl Into<String>, language: Option<String>, pipeline: Pipeline) -> Self {
        Self {
            name: name.into(),
            language,
            pipeline,
        }
    }
}

impl Predictor for ModelPredictor {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ModelKind {
        self.pipeline.kind()
    }

    fn language(&self) -> Option<&str> {
        self.language.as_deref()
    }

    fn predict(&self, input: &PredictInput) -> Result<Prediction> {
        let text = input
            .text()
            .ok_or_else(|| {
                NluError::Validation(format!("Missing features: {{{TEXT_FEATURE:?}}}."))
            })?;
        self.pipeline.run(text)
    }
}
