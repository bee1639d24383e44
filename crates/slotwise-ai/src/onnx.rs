//! ONNX Runtime backend for transformer NLU models.
//!
//! A model directory must contain `model.onnx`, `tokenizer.json` and
//! `nlu.json`. Token heads produce `[1, seq, labels]`, sequence heads
//! `[1, labels]`. Joint models expose both as separate named outputs.

use std::path::Path;
use std::sync::{Arc, Mutex};

use ort::session::Session;
use ort::value::Tensor;
use slotwise_core::{LabelDistribution, NluError, Result, Token, wordpiece_detokenize};
use tokenizers::Tokenizer;
use tracing::{debug, info};

use crate::classifier::{SequenceClassifier, SubwordTokenizer, TextClassifier};
use crate::decode::softmax;
use crate::manifest::{ModelKind, ModelManifest, OutputKind};
use crate::pipeline::{JointParser, Pipeline, SlotFiller, TextScorer};

fn prediction_err(context: &str, e: impl std::fmt::Display) -> NluError {
    NluError::Prediction(format!("{context}: {e}"))
}

// ── Tokenizer ──

/// HuggingFace `tokenizers` adapter.
///
/// Continuation pieces are recognized by their prefix (`##` for WordPiece);
/// special flags come from the encoding's special-tokens mask.
pub struct HfTokenizer {
    inner: Tokenizer,
    prefix: String,
    special: Vec<String>,
}

impl HfTokenizer {
    pub fn from_file(path: &Path, max_length: usize, prefix: &str) -> anyhow::Result<Self> {
        let mut inner =
            Tokenizer::from_file(path).map_err(|e| anyhow::anyhow!("load tokenizer: {e}"))?;

        inner
            .with_truncation(Some(tokenizers::TruncationParams {
                max_length,
                ..Default::default()
            }))
            .map_err(|e| anyhow::anyhow!("set truncation: {e}"))?;
        // One query per call; padding would only add tokens to filter out.
        inner.with_padding(None);

        let mut special: Vec<String> = inner
            .get_added_tokens_decoder()
            .values()
            .filter(|t| t.special)
            .map(|t| t.content.clone())
            .collect();
        special.sort();
        special.dedup();

        Ok(Self {
            inner,
            prefix: prefix.to_string(),
            special,
        })
    }
}

impl SubwordTokenizer for HfTokenizer {
    fn tokenize(&self, text: &str) -> Result<Vec<Token>> {
        let encoding = self
            .inner
            .encode(text, true)
            .map_err(|e| prediction_err("tokenize", e))?;
        let mask = encoding.get_special_tokens_mask();
        Ok(encoding
            .get_tokens()
            .iter()
            .zip(encoding.get_ids())
            .enumerate()
            .map(|(i, (piece, &id))| {
                let is_special = mask.get(i).is_some_and(|&m| m == 1);
                Token::from_piece(i, piece, id, &self.prefix, is_special)
            })
            .collect())
    }

    fn detokenize(&self, tokens: &[Token]) -> String {
        wordpiece_detokenize(tokens.iter().map(|t| t.text.as_str()), &self.prefix)
    }

    fn special_tokens(&self) -> &[String] {
        &self.special
    }
}

// ── Model ──

/// One ONNX session serving the token head, the sequence head, or both.
///
/// `Session::run` needs exclusive access, so concurrent requests on the same
/// model serialize on the mutex.
pub struct OnnxModel {
    session: Mutex<Session>,
    tokenizer: Arc<HfTokenizer>,
    output: OutputKind,
    use_token_type_ids: bool,
    slot_output: String,
    intent_output: String,
}

impl OnnxModel {
    pub fn new(
        session: Session,
        tokenizer: Arc<HfTokenizer>,
        manifest: &ModelManifest,
    ) -> anyhow::Result<Self> {
        let names: Vec<String> = session.outputs().iter().map(|o| o.name().to_string()).collect();
        anyhow::ensure!(!names.is_empty(), "model has no outputs");

        let pick = |requested: &Option<String>, fallback: usize| -> anyhow::Result<String> {
            match requested {
                Some(name) => {
                    anyhow::ensure!(
                        names.contains(name),
                        "output {name:?} not in model outputs {names:?}"
                    );
                    Ok(name.clone())
                }
                None => names
                    .get(fallback)
                    .cloned()
                    .ok_or_else(|| {
                        anyhow::anyhow!("model has no output #{fallback}, outputs: {names:?}")
                    }),
            }
        };
        let intent_fallback = if manifest.kind == ModelKind::Joint { 1 } else { 0 };
        let slot_output = pick(&manifest.slot_output, 0)?;
        let intent_output = pick(&manifest.intent_output, intent_fallback)?;

        Ok(Self {
            session: Mutex::new(session),
            tokenizer,
            output: manifest.output,
            use_token_type_ids: manifest.use_token_type_ids,
            slot_output,
            intent_output,
        })
    }

    /// Fail unless `output`'s static label dimension, when known, equals `labels`.
    pub fn check_width(&self, output: &str, labels: usize) -> Result<()> {
        let session = self
            .session
            .lock()
            .map_err(|_| NluError::Configuration("session mutex poisoned".into()))?;
        let width = session
            .outputs()
            .iter()
            .find(|o| o.name() == output)
            .and_then(|o| last_dim(o.dtype()));
        match width {
            Some(w) if w != labels => Err(NluError::Configuration(format!(
                "output {output:?} has {w} labels but vocabulary has {labels}"
            ))),
            _ => Ok(()),
        }
    }

    /// Run the session on one sequence and return the shape and scores of
    /// `output`.
    fn infer(&self, ids: &[u32], output: &str) -> Result<(Vec<i64>, Vec<f32>)> {
        let seq = ids.len();
        let shape = [1i64, seq as i64];
        let input_ids: Vec<i64> = ids.iter().map(|&id| id as i64).collect();

        let ids_tensor = Tensor::from_array((shape, input_ids.into_boxed_slice()))
            .map_err(|e| prediction_err("input_ids", e))?;
        let mask_tensor = Tensor::from_array((shape, vec![1i64; seq].into_boxed_slice()))
            .map_err(|e| prediction_err("attention_mask", e))?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| NluError::Prediction("session mutex poisoned".into()))?;
        let outputs = if self.use_token_type_ids {
            let type_tensor = Tensor::from_array((shape, vec![0i64; seq].into_boxed_slice()))
                .map_err(|e| prediction_err("token_type_ids", e))?;
            session.run(ort::inputs![
                "input_ids" => ids_tensor,
                "attention_mask" => mask_tensor,
                "token_type_ids" => type_tensor,
            ])
        } else {
            session.run(ort::inputs![
                "input_ids" => ids_tensor,
                "attention_mask" => mask_tensor,
            ])
        }
        .map_err(|e| prediction_err("run session", e))?;

        let value = outputs
            .get(output)
            .ok_or_else(|| {
                NluError::Prediction(format!("output {output:?} missing from session results"))
            })?;
        let (out_shape, data) = value
            .try_extract_tensor::<f32>()
            .map_err(|e| prediction_err("extract output", e))?;
        let dims: &[i64] = out_shape;
        Ok((dims.to_vec(), data.to_vec()))
    }

    fn finish(&self, mut row: LabelDistribution) -> LabelDistribution {
        if self.output == OutputKind::Logits {
            softmax(&mut row);
        }
        row
    }
}

impl SequenceClassifier for OnnxModel {
    fn classify_sequence(&self, tokens: &[Token]) -> Result<Vec<LabelDistribution>> {
        if tokens.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<u32> = tokens.iter().map(|t| t.id).collect();
        let (dims, data) = self.infer(&ids, &self.slot_output)?;
        if dims.len() != 3 || dims[0] != 1 || dims[1] as usize != tokens.len() || dims[2] <= 0 {
            return Err(NluError::Prediction(format!(
                "unexpected token head shape {dims:?}, expected [1, {}, labels]",
                tokens.len()
            )));
        }
        let width = dims[2] as usize;
        debug!(tokens = tokens.len(), width, "token head scored");
        Ok(data.chunks(width).map(|row| self.finish(row.to_vec())).collect())
    }
}

impl TextClassifier for OnnxModel {
    fn classify_text(&self, text: &str) -> Result<LabelDistribution> {
        let tokens = self.tokenizer.tokenize(text)?;
        let ids: Vec<u32> = tokens.iter().map(|t| t.id).collect();
        let (dims, data) = self.infer(&ids, &self.intent_output)?;
        if dims.len() != 2 || dims[0] != 1 || dims[1] <= 0 {
            return Err(NluError::Prediction(format!(
                "unexpected sequence head shape {dims:?}, expected [1, labels]"
            )));
        }
        Ok(self.finish(data))
    }
}

/// Static size of the last dimension of a tensor output, if declared.
fn last_dim(output_type: &ort::value::ValueType) -> Option<usize> {
    match output_type {
        ort::value::ValueType::Tensor { shape, .. } => {
            shape.last().and_then(|&d| if d > 0 { Some(d as usize) } else { None })
        }
        _ => None,
    }
}

// ── Loading ──

/// Load a model directory into the pipeline `manifest` asks for.
pub fn load_pipeline(model_dir: &Path, manifest: &ModelManifest) -> anyhow::Result<Pipeline> {
    let model_path = model_dir.join("model.onnx");
    let tokenizer_path = model_dir.join("tokenizer.json");

    anyhow::ensure!(model_path.exists(), "model.onnx not found in {model_dir:?}");
    anyhow::ensure!(tokenizer_path.exists(), "tokenizer.json not found in {model_dir:?}");

    let tokenizer = Arc::new(HfTokenizer::from_file(
        &tokenizer_path,
        manifest.max_length,
        &manifest.continuation_prefix,
    )?);
    let session = Session::builder()?.commit_from_file(&model_path)?;
    let model = Arc::new(OnnxModel::new(session, tokenizer.clone(), manifest)?);

    let pipeline = match manifest.kind {
        ModelKind::Language | ModelKind::Intent => {
            let vocab = manifest.class_vocab()?;
            model.check_width(&model.intent_output, vocab.len())?;
            let scorer = TextScorer::new(model.clone(), vocab);
            if manifest.kind == ModelKind::Language {
                Pipeline::Language(scorer)
            } else {
                Pipeline::Intent(scorer)
            }
        }
        ModelKind::Slot => {
            let vocab = manifest.slot_vocab()?;
            model.check_width(&model.slot_output, vocab.len())?;
            Pipeline::Slot(SlotFiller::new(tokenizer, model.clone(), vocab, manifest.synonyms()))
        }
        ModelKind::Joint => {
            let slot_vocab = manifest.slot_vocab()?;
            let intent_vocab = manifest.intent_vocab()?;
            model.check_width(&model.slot_output, slot_vocab.len())?;
            model.check_width(&model.intent_output, intent_vocab.len())?;
            Pipeline::Joint(JointParser::new(
                TextScorer::new(model.clone(), intent_vocab),
                SlotFiller::new(tokenizer, model.clone(), slot_vocab, manifest.synonyms()),
            ))
        }
    };

    info!(
        kind = %manifest.kind,
        language = manifest.language.as_deref().unwrap_or("-"),
        labels = manifest.labels.len(),
        model = %model_path.display(),
        "loaded nlu model"
    );
    Ok(pipeline)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn model_dir() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("..")
            .join("..")
            .join("models")
            .join("snips-joint")
    }

    #[test]
    fn missing_model_files_reported() {
        let dir = tempfile::tempdir().unwrap();
        let manifest: ModelManifest =
            serde_json::from_str(r#"{"kind": "intent", "labels": ["a", "b"]}"#).unwrap();
        let err = load_pipeline(dir.path(), &manifest).err().unwrap();
        assert!(err.to_string().contains("model.onnx"), "{err}");
    }

    #[test]
    #[ignore = "needs models/snips-joint exported with nlu.json"]
    fn joint_model_parses_playlist_query() {
        let dir = model_dir();
        let manifest = ModelManifest::load(&dir).unwrap();
        let pipeline = load_pipeline(&dir, &manifest).unwrap();
        let prediction = pipeline.run("add a tune to my playlist").unwrap();
        assert!(prediction.intent().is_some());
        for e in prediction.entities() {
            assert!((0.0..=1.0).contains(&e.confidence));
            let slice: String = "add a tune to my playlist"
                .chars()
                .skip(e.start)
                .take(e.end - e.start)
                .collect();
            assert_eq!(slice, e.text);
        }
    }
}
