//! Per-model `nlu.json` manifests.
//!
//! A model directory holds `model.onnx`, `tokenizer.json` and `nlu.json`.
//! The manifest names the model kind, its label vocabularies and synonyms,
//! and how to read the network's outputs.

use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use slotwise_core::{LabelVocab, NluError, Result, SynonymEntry, SynonymMap, WORDPIECE_PREFIX};

/// File name of the manifest inside a model directory.
pub const MANIFEST_FILE: &str = "nlu.json";

/// What a model predicts. Closed set; each kind maps to one pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    Language,
    Intent,
    #[serde(alias = "slots")]
    Slot,
    Joint,
}

impl ModelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Language => "language",
            Self::Intent => "intent",
            Self::Slot => "slot",
            Self::Joint => "joint",
        }
    }
}

impl std::fmt::Display for ModelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether the classifier heads emit probabilities or raw logits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputKind {
    #[default]
    Probabilities,
    Logits,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelManifest {
    pub kind: ModelKind,
    /// Language the model serves, for language-routed parsing.
    #[serde(default)]
    pub language: Option<String>,
    /// Class labels (intent, language) or slot labels with the null label
    /// first (slot, joint).
    #[serde(default)]
    pub labels: Vec<String>,
    /// Intent labels of a joint model.
    #[serde(default)]
    pub intent_labels: Vec<String>,
    #[serde(default)]
    pub entity_synonyms: Vec<SynonymEntry>,
    #[serde(default)]
    pub output: OutputKind,
    #[serde(default = "default_max_length")]
    pub max_length: usize,
    #[serde(default = "default_continuation_prefix")]
    pub continuation_prefix: String,
    #[serde(default = "default_true")]
    pub use_token_type_ids: bool,
    /// Output tensor names of a joint model. Default to the first output for
    /// slots and the second for intents.
    #[serde(default)]
    pub slot_output: Option<String>,
    #[serde(default)]
    pub intent_output: Option<String>,
}

fn default_max_length() -> usize {
    128
}

fn default_continuation_prefix() -> String {
    WORDPIECE_PREFIX.to_string()
}

fn default_true() -> bool {
    true
}

impl ModelManifest {
    /// Read and validate `nlu.json` from a model directory.
    pub fn load(model_dir: &Path) -> anyhow::Result<Self> {
        let path = model_dir.join(MANIFEST_FILE);
        anyhow::ensure!(path.exists(), "{MANIFEST_FILE} not found in {model_dir:?}");
        let raw =
            std::fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))?;
        let manifest: Self =
            serde_json::from_str(&raw).with_context(|| format!("parse {}", path.display()))?;
        manifest
            .validate()
            .with_context(|| format!("invalid manifest {}", path.display()))?;
        Ok(manifest)
    }

    /// Check that the vocabularies this kind needs are present and usable.
    pub fn validate(&self) -> Result<()> {
        if self.max_length < 2 {
            return Err(NluError::Configuration(format!(
                "max_length {} leaves no room for text",
                self.max_length
            )));
        }
        match self.kind {
            ModelKind::Language | ModelKind::Intent => {
                self.class_vocab()?;
            }
            ModelKind::Slot => {
                self.slot_vocab()?;
            }
            ModelKind::Joint => {
                self.slot_vocab()?;
                self.intent_vocab()?;
            }
        }
        Ok(())
    }

    /// Vocabulary of a slot or joint model's token head.
    pub fn slot_vocab(&self) -> Result<LabelVocab> {
        LabelVocab::for_slots(self.labels.clone())
    }

    /// Vocabulary of an intent or language model.
    pub fn class_vocab(&self) -> Result<LabelVocab> {
        LabelVocab::new(self.labels.clone())
    }

    /// Intent vocabulary of a joint model.
    pub fn intent_vocab(&self) -> Result<LabelVocab> {
        LabelVocab::new(self.intent_labels.clone())
            .map_err(|_| NluError::Configuration("joint model needs intent_labels".into()))
    }

    pub fn synonyms(&self) -> SynonymMap {
        SynonymMap::from_entries(&self.entity_synonyms)
    }
}
