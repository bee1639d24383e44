//! Multi-model fan-out.
//!
//! A request names zero or more target models. After the readiness and name
//! checks, every target runs on its own blocking task and the results are
//! joined into one map keyed by model name. A failing or panicking model
//! only fails its own entry.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use slotwise_ai::ModelKind;
use slotwise_core::{
    Entity, IntentScore, NluError, ParseResult, Prediction, PredictorResult, Result,
};
use tokio::task::JoinError;
use tracing::{error, info, warn};

use crate::predictor::{PredictInput, Predictor, run_predictor};
use crate::registry::RegistryHandle;

/// Per-model outcomes of one request, keyed by model name.
pub type PredictionMap = BTreeMap<String, PredictorResult>;

/// Per-model outcomes of a batch request: one prediction per input text.
pub type BatchPredictionMap = BTreeMap<String, PredictorResult<Vec<Prediction>>>;

#[derive(Clone)]
pub struct Dispatcher {
    registry: RegistryHandle,
}

impl Dispatcher {
    pub fn new(registry: RegistryHandle) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &RegistryHandle {
        &self.registry
    }

    /// Run `input` through every target (all models when `targets` is empty).
    ///
    /// Fails as a whole only while models are loading or when a target name
    /// is unknown; no model runs in either case. `input` and the uploads it
    /// owns are released once the last predictor finishes.
    pub async fn dispatch(&self, input: PredictInput, targets: &[String]) -> Result<PredictionMap> {
        let predictors = self.registry.require()?.resolve(targets)?;
        let started = Instant::now();
        let outcomes = fan_out(&predictors, Arc::new(input)).await;
        let results: PredictionMap = predictors
            .iter()
            .zip(outcomes)
            .map(|(p, outcome)| (p.name().to_string(), settle(p.name(), outcome)))
            .collect();
        log_outcome("predict", &results, started);
        Ok(results)
    }

    /// Run every text through every target. A model that fails on any text
    /// fails as a whole; other models are unaffected.
    pub async fn dispatch_batch(
        &self,
        texts: Vec<String>,
        targets: &[String],
    ) -> Result<BatchPredictionMap> {
        let predictors = self.registry.require()?.resolve(targets)?;
        if texts.is_empty() {
            return Err(NluError::Validation("texts must not be empty".into()));
        }
        let started = Instant::now();
        let inputs: Arc<Vec<PredictInput>> =
            Arc::new(texts.into_iter().map(PredictInput::from_text).collect());

        let tasks = predictors.iter().map(|p| {
            let predictor = Arc::clone(p);
            let inputs = Arc::clone(&inputs);
            tokio::task::spawn_blocking(move || {
                inputs
                    .iter()
                    .map(|input| run_predictor(predictor.as_ref(), input))
                    .collect::<Result<Vec<_>>>()
            })
        });
        let outcomes = join_all(tasks).await;

        let results: BatchPredictionMap = predictors
            .iter()
            .zip(outcomes)
            .map(|(p, outcome)| (p.name().to_string(), settle(p.name(), outcome)))
            .collect();
        let failed = results.values().filter(|r| !r.is_success()).count();
        info!(
            route = "batch_predict",
            models = results.len(),
            texts = inputs.len(),
            failed,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "dispatch complete"
        );
        Ok(results)
    }

    /// Language-routed parse: detect the language, then run the intent,
    /// slot and joint models that serve it and merge their answers.
    ///
    /// Models without a language serve every language. Without a language
    /// model, or if it fails, only language-agnostic models run.
    pub async fn parse(&self, text: String) -> Result<ParseResult> {
        let registry = self.registry.require()?;
        if text.trim().is_empty() {
            return Err(NluError::Validation("text must not be empty".into()));
        }
        let started = Instant::now();
        let input = Arc::new(PredictInput::from_text(text.clone()));
        let mut result = ParseResult {
            text,
            ..Default::default()
        };

        if let Some(detector) = registry.first_of_kind(ModelKind::Language) {
            let detector = Arc::clone(detector);
            let outcomes = fan_out(std::slice::from_ref(&detector), Arc::clone(&input)).await;
            for outcome in outcomes {
                match settle(detector.name(), outcome) {
                    PredictorResult::Success {
                        predictions: Prediction::Language { language, .. },
                        ..
                    } => result.language = Some(language),
                    PredictorResult::Success { .. } => {
                        warn!(
                            model = detector.name(),
                            "language model returned a non-language prediction"
                        );
                    }
                    PredictorResult::Failed { error, .. } => {
                        result.failures.insert(detector.name().to_string(), error);
                    }
                }
            }
        }

        let detected = result.language.as_ref().map(|l| l.value.clone());
        let routed: Vec<Arc<dyn Predictor>> = registry
            .predictors()
            .filter(|p| p.kind() != ModelKind::Language)
            .filter(|p| match (p.language(), detected.as_deref()) {
                (None, _) => true,
                (Some(served), Some(lang)) => served == lang,
                (Some(_), None) => false,
            })
            .cloned()
            .collect();

        let outcomes = fan_out(&routed, input).await;
        for (p, outcome) in routed.iter().zip(outcomes) {
            match settle(p.name(), outcome) {
                PredictorResult::Success { predictions, .. } => {
                    merge_prediction(&mut result, predictions)
                }
                PredictorResult::Failed { error, .. } => {
                    result.failures.insert(p.name().to_string(), error);
                }
            }
        }
        dedup_entities(&mut result.entities);

        info!(
            route = "parse",
            language = detected.as_deref().unwrap_or("-"),
            models = routed.len(),
            entities = result.entities.len(),
            failed = result.failures.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "parse complete"
        );
        Ok(result)
    }
}

/// One blocking task per predictor, joined in order.
async fn fan_out(
    predictors: &[Arc<dyn Predictor>],
    input: Arc<PredictInput>,
) -> Vec<std::result::Result<Result<Prediction>, JoinError>> {
    let tasks = predictors.iter().map(|p| {
        let predictor = Arc::clone(p);
        let input = Arc::clone(&input);
        tokio::task::spawn_blocking(move || run_predictor(predictor.as_ref(), &input))
    });
    join_all(tasks).await
}

/// Fold a task outcome into the wire result for `model`.
fn settle<T>(
    model: &str,
    outcome: std::result::Result<Result<T>, JoinError>,
) -> PredictorResult<T> {
    match outcome {
        Ok(Ok(predictions)) => PredictorResult::success(predictions),
        Ok(Err(e)) => {
            warn!(model, error = %e, "prediction failed");
            PredictorResult::failed(e.to_string())
        }
        Err(e) => {
            error!(model, error = %e, "predictor task aborted");
            PredictorResult::failed(format!("predictor task aborted: {e}"))
        }
    }
}

/// Keep the most confident intent and collect every entity.
fn merge_prediction(result: &mut ParseResult, prediction: Prediction) {
    match prediction {
        Prediction::Intent { intent, .. } => merge_intent(result, intent),
        Prediction::Slots { entities, .. } => result.entities.extend(entities),
        Prediction::Joint { intent, entities, .. } => {
            merge_intent(result, intent);
            result.entities.extend(entities);
        }
        Prediction::Language { .. } => {}
    }
}

/// Order by offset and drop spans reported by more than one model.
fn dedup_entities(entities: &mut Vec<Entity>) {
    entities.sort_by(|a, b| (a.start, a.end, &a.entity).cmp(&(b.start, b.end, &b.entity)));
    entities.dedup_by(|a, b| a.entity == b.entity && a.start == b.start && a.end == b.end);
}

fn merge_intent(result: &mut ParseResult, intent: IntentScore) {
    match &result.intent {
        Some(current) if current.confidence >= intent.confidence => {}
        _ => result.intent = Some(intent),
    }
}

fn log_outcome(route: &str, results: &PredictionMap, started: Instant) {
    let failed = results.values().filter(|r| !r.is_success()).count();
    info!(
        route,
        models = results.len(),
        failed,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "dispatch complete"
    );
}
