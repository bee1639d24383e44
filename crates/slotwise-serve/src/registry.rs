//! Model registry and cold-start readiness.
//!
//! Models load on a background blocking task after the server starts
//! listening. Until the populated registry is published, every prediction
//! endpoint answers 503. Publication happens once; the registry is
//! read-only afterwards.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use std::time::Instant;

use slotwise_ai::ModelKind;
use slotwise_core::{NluError, Result};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::predictor::Predictor;

/// Builds a predictor from a configured name and model directory.
pub type ModelLoader = Arc<dyn Fn(&str, &Path) -> anyhow::Result<Arc<dyn Predictor>> + Send + Sync>;

/// Loader for ONNX model directories (`model.onnx`, `tokenizer.json`, `nlu.json`).
#[cfg(feature = "onnx")]
pub fn onnx_loader() -> ModelLoader {
    use crate::predictor::ModelPredictor;
    use slotwise_ai::ModelManifest;

    Arc::new(|name: &str, dir: &Path| -> anyhow::Result<Arc<dyn Predictor>> {
        let manifest = ModelManifest::load(dir)?;
        let pipeline = slotwise_ai::load_pipeline(dir, &manifest)?;
        Ok(Arc::new(ModelPredictor::new(name, manifest.language.clone(), pipeline)))
    })
}

/// Predictors by name, plus the configured models that failed to load.
#[derive(Default)]
pub struct PredictorRegistry {
    predictors: BTreeMap<String, Arc<dyn Predictor>>,
    failed: BTreeMap<String, String>,
}

impl PredictorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, predictor: Arc<dyn Predictor>) {
        let name = predictor.name().to_string();
        self.failed.remove(&name);
        self.predictors.insert(name, predictor);
    }

    pub fn record_failure(&mut self, name: &str, reason: impl Into<String>) {
        self.failed.insert(name.to_string(), reason.into());
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Predictor>> {
        self.predictors.get(name)
    }

    /// Servable model names, sorted.
    pub fn names(&self) -> Vec<String> {
        self.predictors.keys().cloned().collect()
    }

    pub fn failed(&self) -> &BTreeMap<String, String> {
        &self.failed
    }

    pub fn len(&self) -> usize {
        self.predictors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.predictors.is_empty()
    }

    pub fn predictors(&self) -> impl Iterator<Item = &Arc<dyn Predictor>> {
        self.predictors.values()
    }

    /// First loaded model of `kind`, in name order.
    pub fn first_of_kind(&self, kind: ModelKind) -> Option<&Arc<dyn Predictor>> {
        self.predictors.values().find(|p| p.kind() == kind)
    }

    /// Resolve requested names to predictors, in request order.
    ///
    /// No names means every loaded model. If any name is unknown nothing is
    /// resolved; the error lists every unknown name and the available ones.
    pub fn resolve(&self, names: &[String]) -> Result<Vec<Arc<dyn Predictor>>> {
        if names.is_empty() {
            return Ok(self.predictors.values().cloned().collect());
        }
        let invalid: Vec<String> = names
            .iter()
            .filter(|n| !self.predictors.contains_key(n.as_str()))
            .cloned()
            .collect();
        if !invalid.is_empty() {
            return Err(NluError::UnknownModels {
                invalid,
                available: self.names(),
            });
        }
        let mut seen = std::collections::BTreeSet::new();
        Ok(names
            .iter()
            .filter(|n| seen.insert(n.as_str()))
            .filter_map(|n| self.predictors.get(n.as_str()).cloned())
            .collect())
    }
}

/// Load every configured model. A model that fails is logged and recorded;
/// the rest still load.
pub fn populate(models: &BTreeMap<String, PathBuf>, loader: &ModelLoader) -> PredictorRegistry {
    let mut registry = PredictorRegistry::new();
    for (name, dir) in models {
        let started = Instant::now();
        match loader(name.as_str(), dir.as_path()) {
            Ok(predictor) => {
                info!(
                    model = %name,
                    kind = %predictor.kind(),
                    dir = %dir.display(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "model loaded"
                );
                registry.insert(predictor);
            }
            Err(e) => {
                error!(
                    model = %name,
                    dir = %dir.display(),
                    error = %format!("{e:#}"),
                    "failed to load model"
                );
                registry.record_failure(name, format!("{e:#}"));
            }
        }
    }
    registry
}

/// Shared, cloneable view of the registry that becomes ready exactly once.
#[derive(Clone, Default)]
pub struct RegistryHandle {
    inner: Arc<OnceLock<PredictorRegistry>>,
}

impl RegistryHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish the populated registry. Returns `false` if one was already
    /// published; the first one stays.
    pub fn publish(&self, registry: PredictorRegistry) -> bool {
        let loaded = registry.len();
        let failed = registry.failed().len();
        match self.inner.set(registry) {
            Ok(()) => {
                info!(loaded, failed, "model registry ready");
                true
            }
            Err(_) => {
                warn!("model registry already published, ignoring");
                false
            }
        }
    }

    pub fn is_ready(&self) -> bool {
        self.inner.get().is_some()
    }

    pub fn get(&self) -> Option<&PredictorRegistry> {
        self.inner.get()
    }

    /// The registry, or `NotReady` while models are still loading.
    pub fn require(&self) -> Result<&PredictorRegistry> {
        self.inner.get().ok_or_else(NluError::not_ready)
    }
}

/// Load `models` on a blocking task and publish the result into `handle`.
pub fn spawn_population(
    handle: RegistryHandle,
    models: BTreeMap<String, PathBuf>,
    loader: ModelLoader,
) -> JoinHandle<()> {
    info!(models = models.len(), "loading models in background");
    tokio::task::spawn_blocking(move || {
        let registry = populate(&models, &loader);
        handle.publish(registry);
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{StubPredictor, ready_handle};

    fn stub_loader() -> ModelLoader {
        Arc::new(|name: &str, dir: &Path| -> anyhow::Result<Arc<dyn Predictor>> {
            anyhow::ensure!(dir.exists(), "model directory {} not found", dir.display());
            Ok(Arc::new(StubPredictor::ok(name, ModelKind::Intent)))
        })
    }

    #[test]
    fn unknown_names_reported_together() {
        let handle = ready_handle(vec![
            StubPredictor::ok("intent", ModelKind::Intent),
            StubPredictor::ok("slots", ModelKind::Slot),
        ]);
        let registry = handle.require().unwrap();
        let err = registry
            .resolve(&["intent".into(), "nope".into(), "gone".into()])
            .err()
            .unwrap();
        match err {
            NluError::UnknownModels { invalid, available } => {
                assert_eq!(invalid, vec!["nope", "gone"]);
                assert_eq!(available, vec!["intent", "slots"]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn empty_request_resolves_all_and_duplicates_collapse() {
        let handle = ready_handle(vec![
            StubPredictor::ok("a", ModelKind::Intent),
            StubPredictor::ok("b", ModelKind::Slot),
        ]);
        let registry = handle.require().unwrap();
        assert_eq!(registry.resolve(&[]).unwrap().len(), 2);
        assert_eq!(registry.resolve(&["b".into(), "b".into()]).unwrap().len(), 1);
    }

    #[test]
    fn handle_not_ready_until_published() {
        let handle = RegistryHandle::new();
        assert!(!handle.is_ready());
        assert!(matches!(handle.require(), Err(NluError::NotReady { retry_after: 120 })));
        assert!(handle.publish(PredictorRegistry::new()));
        assert!(handle.is_ready());
        assert!(!handle.publish(PredictorRegistry::new()));
    }

    #[test]
    fn populate_records_failures_and_keeps_others() {
        let dir = tempfile::tempdir().unwrap();
        let mut models = BTreeMap::new();
        models.insert("good".to_string(), dir.path().to_path_buf());
        models.insert("bad".to_string(), dir.path().join("missing"));
        let registry = populate(&models, &stub_loader());
        assert_eq!(registry.names(), vec!["good"]);
        assert!(registry.failed()["bad"].contains("not found"));
        assert!(matches!(
            registry.resolve(&["bad".into()]),
            Err(NluError::UnknownModels { .. })
        ));
    }

    #[tokio::test]
    async fn spawn_population_publishes() {
        let dir = tempfile::tempdir().unwrap();
        let handle = RegistryHandle::new();
        let mut models = BTreeMap::new();
        models.insert("intent".to_string(), dir.path().to_path_buf());
        spawn_population(handle.clone(), models, stub_loader()).await.unwrap();
        assert!(handle.is_ready());
        assert_eq!(handle.get().unwrap().names(), vec!["intent"]);
    }
}
