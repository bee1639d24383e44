//! Stub predictors for dispatcher and router tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use slotwise_ai::ModelKind;
use slotwise_core::{Entity, IntentScore, LanguageGuess, NluError, Prediction, Result};

use crate::predictor::{PredictInput, Predictor};
use crate::registry::{PredictorRegistry, RegistryHandle};

#[derive(Clone, Copy)]
enum Behavior {
    Ok,
    Fail,
    Panic,
}

pub struct StubPredictor {
    name: String,
    kind: ModelKind,
    language: Option<String>,
    behavior: Behavior,
    delay: Duration,
    calls: Arc<AtomicUsize>,
}

impl StubPredictor {
    fn build(name: &str, kind: ModelKind, behavior: Behavior) -> Self {
        Self {
            name: name.to_string(),
            kind,
            language: None,
            behavior,
            delay: Duration::ZERO,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn ok(name: &str, kind: ModelKind) -> Self {
        Self::build(name, kind, Behavior::Ok)
    }

    pub fn failing(name: &str, kind: ModelKind) -> Self {
        Self::build(name, kind, Behavior::Fail)
    }

    pub fn panicking(name: &str, kind: ModelKind) -> Self {
        Self::build(name, kind, Behavior::Panic)
    }

    pub fn with_language(mut self, language: &str) -> Self {
        self.language = Some(language.to_string());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Shared call counter, readable after the stub moves into a registry.
    pub fn counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Predictor for StubPredictor {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ModelKind {
        self.kind
    }

    fn language(&self) -> Option<&str> {
        self.language.as_deref()
    }

    fn predict(&self, input: &PredictInput) -> Result<Prediction> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        let text = input.text().unwrap_or_default().to_string();
        match self.behavior {
            Behavior::Fail => return Err(NluError::Prediction(format!("{} exploded", self.name))),
            Behavior::Panic => panic!("{} panicked", self.name),
            Behavior::Ok => {}
        }
        let intent = IntentScore {
            name: format!("{}_intent", self.name),
            confidence: 0.9,
        };
        let entities = vec![Entity {
            entity: "thing".into(),
            value: text.split_whitespace().next().unwrap_or_default().to_string(),
            text: text.split_whitespace().next().unwrap_or_default().to_string(),
            start: 0,
            end: text.split_whitespace().next().map(|w| w.chars().count()).unwrap_or(0),
            confidence: 0.8,
        }];
        Ok(match self.kind {
            ModelKind::Language => Prediction::Language {
                language: LanguageGuess::new(
                    self.language.clone().unwrap_or_else(|| "en".into()),
                    0.99,
                ),
                text,
            },
            ModelKind::Intent => Prediction::Intent { text, intent },
            ModelKind::Slot => Prediction::Slots { text, entities },
            ModelKind::Joint => Prediction::Joint { text, intent, entities },
        })
    }
}

/// A published registry holding `predictors`.
pub fn ready_handle(predictors: Vec<StubPredictor>) -> RegistryHandle {
    let mut registry = PredictorRegistry::new();
    for p in predictors {
        registry.insert(Arc::new(p));
    }
    let handle = RegistryHandle::new();
    handle.publish(registry);
    handle
}
