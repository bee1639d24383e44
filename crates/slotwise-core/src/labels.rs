//! Label vocabularies and synonym tables.
//!
//! Both are loaded once with a model and shared read-only by every request.
//! Slot vocabularies reserve index 0 for the null/padding label.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{NluError, Result};

/// Index of the null/padding label in every slot vocabulary.
pub const NULL_LABEL: usize = 0;

/// Probabilities over a label vocabulary, in vocabulary order.
pub type LabelDistribution = Vec<f32>;

/// Ordered label names for one model head.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LabelVocab {
    names: Vec<String>,
}

impl LabelVocab {
    /// Vocabulary for a flat classifier (intent, language).
    pub fn new(names: Vec<String>) -> Result<Self> {
        if names.is_empty() {
            return Err(NluError::Configuration("label vocabulary is empty".into()));
        }
        Ok(Self { names })
    }

    /// Vocabulary for a slot head. Index 0 is the null label, so at least one
    /// real label must follow it for the model to ever produce an entity.
    pub fn for_slots(names: Vec<String>) -> Result<Self> {
        if names.len() < 2 {
            return Err(NluError::Configuration(format!(
                "slot vocabulary needs a null label plus at least one slot, got {} label(s)",
                names.len()
            )));
        }
        Ok(Self { names })
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn name(&self, index: usize) -> Option<&str> {
        self.names.get(index).map(String::as_str)
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Fail unless a classifier emitting `width` scores can be decoded with
    /// this vocabulary.
    pub fn check_width(&self, width: usize) -> Result<()> {
        if width != self.names.len() {
            return Err(NluError::Configuration(format!(
                "distribution has {width} scores but vocabulary has {} labels",
                self.names.len()
            )));
        }
        Ok(())
    }
}

/// One `entity_synonyms` record: every synonym resolves to `value`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SynonymEntry {
    pub value: String,
    #[serde(default)]
    pub synonyms: Vec<String>,
}

/// Surface form → canonical value. Many-to-one; a missing key means the
/// surface form is already canonical.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SynonymMap {
    map: HashMap<String, String>,
}

impl SynonymMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flatten `entity_synonyms` records. When two records claim the same
    /// synonym the later one wins.
    pub fn from_entries(entries: &[SynonymEntry]) -> Self {
        let mut map = HashMap::new();
        for entry in entries {
            for synonym in &entry.synonyms {
                if let Some(prev) = map.insert(synonym.clone(), entry.value.clone())
                    && prev != entry.value
                {
                    warn!(
                        synonym = %synonym,
                        previous = %prev,
                        value = %entry.value,
                        "synonym mapped to more than one value"
                    );
                }
            }
        }
        Self { map }
    }

    pub fn insert(&mut self, synonym: impl Into<String>, value: impl Into<String>) {
        self.map.insert(synonym.into(), value.into());
    }

    /// Canonical value for `surface`, or `surface` itself.
    pub fn resolve<'a>(&'a self, surface: &'a str) -> &'a str {
        self.map.get(surface).map(String::as_str).unwrap_or(surface)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for SynonymMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            map: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn slot_vocab_requires_null_plus_one() {
        assert!(LabelVocab::for_slots(names(&["<PAD>"])).is_err());
        let vocab = LabelVocab::for_slots(names(&["<PAD>", "city"])).unwrap();
        assert_eq!(vocab.name(NULL_LABEL), Some("<PAD>"));
        assert_eq!(vocab.index_of("city"), Some(1));
    }

    #[test]
    fn flat_vocab_rejects_empty() {
        assert!(LabelVocab::new(vec![]).is_err());
        assert_eq!(LabelVocab::new(names(&["en"])).unwrap().len(), 1);
    }

    #[test]
    fn check_width_mismatch_is_configuration_error() {
        let vocab = LabelVocab::new(names(&["greeting", "goodbye"])).unwrap();
        assert!(vocab.check_width(2).is_ok());
        assert!(matches!(
            vocab.check_width(3),
            Err(NluError::Configuration(_))
        ));
    }

    #[test]
    fn vocab_deserializes_from_plain_list() {
        let vocab: LabelVocab = serde_json::from_str(r#"["<PAD>", "city"]"#).unwrap();
        assert_eq!(vocab.names(), &["<PAD>", "city"]);
    }

    #[test]
    fn synonyms_flatten_many_to_one() {
        let entries: Vec<SynonymEntry> = serde_json::from_str(
            r#"[
                {"value": "new york", "synonyms": ["nyc", "big apple"]},
                {"value": "paris", "synonyms": []}
            ]"#,
        )
        .unwrap();
        let map = SynonymMap::from_entries(&entries);
        assert_eq!(map.len(), 2);
        assert_eq!(map.resolve("nyc"), "new york");
        assert_eq!(map.resolve("big apple"), "new york");
        assert_eq!(map.resolve("paris"), "paris");
    }

    #[test]
    fn synonym_resolution_is_exact() {
        let map: SynonymMap = [("nyc", "new york")].into_iter().collect();
        assert_eq!(map.resolve("NYC"), "NYC");
    }

    #[test]
    fn later_synonym_entry_wins() {
        let entries = vec![
            SynonymEntry {
                value: "a".into(),
                synonyms: vec!["x".into()],
            },
            SynonymEntry {
                value: "b".into(),
                synonyms: vec!["x".into()],
            },
        ];
        assert_eq!(SynonymMap::from_entries(&entries).resolve("x"), "b");
    }
}
