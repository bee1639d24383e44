//! End-to-end pipelines over the classifier traits.
//!
//! A pipeline owns everything loaded with one model (heads, tokenizer,
//! vocabularies, synonyms) and is shared read-only across requests.

use std::sync::Arc;

use slotwise_core::{
    Entity, IntentScore, LabelVocab, LanguageGuess, NluError, Prediction, Result, SynonymMap,
};
use tracing::debug;

use crate::classifier::{SequenceClassifier, SubwordTokenizer, TextClassifier};
use crate::confidence::span_confidence;
use crate::decode::decode_labels;
use crate::locate::locate_span;
use crate::manifest::ModelKind;
use crate::merge::merge_spans;
use crate::scorer::score;

// ── Slot filling ──

/// Token classification → located, normalized entities.
pub struct SlotFiller {
    tokenizer: Arc<dyn SubwordTokenizer>,
    classifier: Arc<dyn SequenceClassifier>,
    vocab: LabelVocab,
    synonyms: SynonymMap,
}

impl SlotFiller {
    pub fn new(
        tokenizer: Arc<dyn SubwordTokenizer>,
        classifier: Arc<dyn SequenceClassifier>,
        vocab: LabelVocab,
        synonyms: SynonymMap,
    ) -> Self {
        Self {
            tokenizer,
            classifier,
            vocab,
            synonyms,
        }
    }

    pub fn vocab(&self) -> &LabelVocab {
        &self.vocab
    }

    /// Entities of `text`, in span order.
    ///
    /// Spans whose text cannot be found in `text` are dropped, so the result
    /// may be shorter than the number of decoded spans.
    pub fn extract(&self, text: &str) -> Result<Vec<Entity>> {
        let tokens = self.tokenizer.tokenize(text)?;
        let distributions = self.classifier.classify_sequence(&tokens)?;
        if distributions.len() != tokens.len() {
            return Err(NluError::Prediction(format!(
                "classifier returned {} distributions for {} tokens",
                distributions.len(),
                tokens.len()
            )));
        }
        let labels = decode_labels(&distributions, &self.vocab)?;
        let spans = merge_spans(&tokens, &labels);

        let entities: Vec<Entity> = spans
            .iter()
            .filter_map(|span| {
                let located =
                    locate_span(span, &tokens, text, self.tokenizer.as_ref(), &self.synonyms)?;
                let entity = self.vocab.name(span.label)?;
                Some(Entity {
                    entity: entity.to_string(),
                    value: located.value,
                    text: located.text,
                    start: located.start,
                    end: located.end,
                    confidence: span_confidence(span, &distributions),
                })
            })
            .collect();

        debug!(
            tokens = tokens.len(),
            spans = spans.len(),
            entities = entities.len(),
            "slots extracted"
        );
        Ok(entities)
    }
}

// ── Flat scoring ──

/// Sequence classification → one winning label. Serves intent and language
/// models alike.
pub struct TextScorer {
    classifier: Arc<dyn TextClassifier>,
    vocab: LabelVocab,
}

impl TextScorer {
    pub fn new(classifier: Arc<dyn TextClassifier>, vocab: LabelVocab) -> Self {
        Self { classifier, vocab }
    }

    pub fn vocab(&self) -> &LabelVocab {
        &self.vocab
    }

    pub fn score(&self, text: &str) -> Result<IntentScore> {
        let distribution = self.classifier.classify_text(text)?;
        score(&distribution, &self.vocab)
    }
}

// ── Joint ──

/// Intent and slots from one model over the same text.
pub struct JointParser {
    intent: TextScorer,
    slots: SlotFiller,
}

impl JointParser {
    pub fn new(intent: TextScorer, slots: SlotFiller) -> Self {
        Self { intent, slots }
    }

    pub fn parse(&self, text: &str) -> Result<(IntentScore, Vec<Entity>)> {
        Ok((self.intent.score(text)?, self.slots.extract(text)?))
    }
}

/// A loaded model of any kind.
pub enum Pipeline {
    Language(TextScorer),
    Intent(TextScorer),
    Slot(SlotFiller),
    Joint(JointParser),
}

impl Pipeline {
    pub fn kind(&self) -> ModelKind {
        match self {
            Self::Language(_) => ModelKind::Language,
            Self::Intent(_) => ModelKind::Intent,
            Self::Slot(_) => ModelKind::Slot,
            Self::Joint(_) => ModelKind::Joint,
        }
    }

    pub fn run(&self, text: &str) -> Result<Prediction> {
        let text_owned = text.to_string();
        Ok(match self {
            Self::Language(scorer) => {
                let best = scorer.score(text)?;
                Prediction::Language {
                    text: text_owned,
                    language: LanguageGuess::new(best.name, best.confidence),
                }
            }
            Self::Intent(scorer) => Prediction::Intent {
                text: text_owned,
                intent: scorer.score(text)?,
            },
            Self::Slot(filler) => Prediction::Slots {
                text: text_owned,
                entities: filler.extract(text)?,
            },
            Self::Joint(parser) => {
                let (intent, entities) = parser.parse(text)?;
                Prediction::Joint {
                    text: text_owned,
                    intent,
                    entities,
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{FixedSequence, FixedText, ScriptedTokenizer, peaked};

    const QUERY: &str = "add a tune to my playlist";
    const PLAYLIST_BODY: &[&str] = &["add", "a", "tu", "##ne", "to", "my", "play", "list"];

    fn slot_vocab() -> LabelVocab {
        LabelVocab::for_slots(vec![
            "<PAD>".into(),
            "music_item".into(),
            "playlist_owner".into(),
            "playlist".into(),
        ])
        .unwrap()
    }

    fn intent_vocab() -> LabelVocab {
        LabelVocab::new(vec!["AddToPlaylist".into(), "PlayMusic".into()]).unwrap()
    }

    fn playlist_dists() -> Vec<Vec<f32>> {
        // [CLS] add a tu ##ne to my play list [SEP]
        [
            (0, 0.99),
            (0, 0.9),
            (0, 0.9),
            (1, 0.9),
            (1, 0.7),
            (0, 0.9),
            (2, 0.8),
            (3, 0.6),
            (3, 0.8),
            (0, 0.99),
        ]
        .into_iter()
        .map(|(label, p)| peaked(4, label, p))
        .collect()
    }

    fn filler(dists: Result<Vec<Vec<f32>>, String>, synonyms: SynonymMap) -> SlotFiller {
        SlotFiller::new(
            Arc::new(ScriptedTokenizer::new(QUERY, PLAYLIST_BODY)),
            Arc::new(FixedSequence(dists)),
            slot_vocab(),
            synonyms,
        )
    }

    #[test]
    fn playlist_entities_with_offsets() {
        let entities = filler(Ok(playlist_dists()), SynonymMap::new()).extract(QUERY).unwrap();
        let got: Vec<_> = entities
            .iter()
            .map(|e| (e.entity.as_str(), e.text.as_str(), e.start, e.end))
            .collect();
        assert_eq!(
            got,
            vec![
                ("music_item", "tune", 6, 10),
                ("playlist_owner", "my", 14, 16),
                ("playlist", "playlist", 17, 25),
            ]
        );
        assert!((entities[0].confidence - 0.8).abs() < 1e-6);
        assert!((entities[1].confidence - 0.8).abs() < 1e-6);
        assert!((entities[2].confidence - 0.7).abs() < 1e-6);
    }

    #[test]
    fn offsets_slice_back_to_text() {
        let entities = filler(Ok(playlist_dists()), SynonymMap::new()).extract(QUERY).unwrap();
        for e in entities {
            assert_eq!(&QUERY[e.start..e.end], e.text);
            assert!((0.0..=1.0).contains(&e.confidence));
        }
    }

    #[test]
    fn synonyms_normalize_value() {
        let synonyms: SynonymMap = [("tune", "song")].into_iter().collect();
        let entities = filler(Ok(playlist_dists()), synonyms).extract(QUERY).unwrap();
        assert_eq!(entities[0].value, "song");
        assert_eq!(entities[0].text, "tune");
        assert_eq!(entities[1].value, "my");
    }

    #[test]
    fn all_null_predictions_yield_no_entities() {
        let dists = (0..10).map(|_| peaked(4, 0, 0.9)).collect();
        let entities = filler(Ok(dists), SynonymMap::new()).extract(QUERY).unwrap();
        assert!(entities.is_empty());
    }

    #[test]
    fn distribution_count_mismatch_is_prediction_error() {
        let mut dists = playlist_dists();
        dists.pop();
        let err = filler(Ok(dists), SynonymMap::new()).extract(QUERY).unwrap_err();
        assert!(matches!(err, NluError::Prediction(_)));
    }

    #[test]
    fn vocab_width_mismatch_is_configuration_error() {
        let dists = (0..10).map(|_| vec![0.5, 0.5]).collect();
        let err = filler(Ok(dists), SynonymMap::new()).extract(QUERY).unwrap_err();
        assert!(matches!(err, NluError::Configuration(_)));
    }

    #[test]
    fn classifier_failure_propagates() {
        let err = filler(Err("session poisoned".into()), SynonymMap::new())
            .extract(QUERY)
            .unwrap_err();
        assert!(err.to_string().contains("session poisoned"));
    }

    #[test]
    fn unlocatable_span_dropped_rest_kept() {
        // The tokenizer claims "tune" but the caller sent different casing.
        let text = "add a TUNE to my playlist";
        let slots = SlotFiller::new(
            Arc::new(ScriptedTokenizer::new(text, PLAYLIST_BODY)),
            Arc::new(FixedSequence(Ok(playlist_dists()))),
            slot_vocab(),
            SynonymMap::new(),
        );
        let entities = slots.extract(text).unwrap();
        let names: Vec<_> = entities.iter().map(|e| e.entity.as_str()).collect();
        assert_eq!(names, vec!["playlist_owner", "playlist"]);
    }

    #[test]
    fn entity_after_multi_piece_word_keeps_its_own_text() {
        let text = "playing jazz";
        let slots = SlotFiller::new(
            Arc::new(ScriptedTokenizer::new(text, &["play", "##ing", "jazz"])),
            Arc::new(FixedSequence(Ok(vec![
                peaked(2, 0, 0.99),
                peaked(2, 0, 0.9),
                peaked(2, 0, 0.9),
                peaked(2, 1, 0.9),
                peaked(2, 0, 0.99),
            ]))),
            LabelVocab::for_slots(vec!["<PAD>".into(), "genre".into()]).unwrap(),
            SynonymMap::new(),
        );
        let entities = slots.extract(text).unwrap();
        assert_eq!(entities.len(), 1);
        let e = &entities[0];
        assert_eq!(
            (e.entity.as_str(), e.text.as_str(), e.value.as_str()),
            ("genre", "jazz", "jazz")
        );
        assert_eq!((e.start, e.end), (8, 12));
        assert!((e.confidence - 0.9).abs() < 1e-6);
    }

    #[test]
    fn joint_pipeline_combines_intent_and_slots() {
        let pipeline = Pipeline::Joint(JointParser::new(
            TextScorer::new(Arc::new(FixedText(vec![0.9, 0.1])), intent_vocab()),
            filler(Ok(playlist_dists()), SynonymMap::new()),
        ));
        assert_eq!(pipeline.kind(), ModelKind::Joint);
        match pipeline.run(QUERY).unwrap() {
            Prediction::Joint { text, intent, entities } => {
                assert_eq!(text, QUERY);
                assert_eq!(intent.name, "AddToPlaylist");
                assert_eq!(entities.len(), 3);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn language_pipeline_reports_language_entity() {
        let vocab = LabelVocab::new(vec!["en".into(), "fr".into()]).unwrap();
        let pipeline =
            Pipeline::Language(TextScorer::new(Arc::new(FixedText(vec![0.2, 0.8])), vocab));
        match pipeline.run("bonjour").unwrap() {
            Prediction::Language { language, .. } => {
                assert_eq!(language.entity, "language");
                assert_eq!(language.value, "fr");
                assert_eq!(language.confidence, 0.8);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn intent_pipeline_scores_text() {
        let pipeline = Pipeline::Intent(TextScorer::new(
            Arc::new(FixedText(vec![0.3, 0.7])),
            intent_vocab(),
        ));
        let prediction = pipeline.run(QUERY).unwrap();
        assert_eq!(prediction.intent().unwrap().name, "PlayMusic");
    }
}
