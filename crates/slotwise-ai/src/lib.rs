//! NLU inference layer: slot decoding and alignment, flat scoring, and the
//! ONNX Runtime backend behind the classifier traits.

pub mod classifier;
pub mod confidence;
pub mod decode;
pub mod locate;
pub mod manifest;
pub mod merge;
pub mod pipeline;
pub mod scorer;

#[cfg(test)]
mod testutil;

#[cfg(feature = "onnx")]
mod onnx;
#[cfg(feature = "onnx")]
pub use onnx::{HfTokenizer, OnnxModel, load_pipeline};

pub use classifier::{SequenceClassifier, SubwordTokenizer, TextClassifier};
pub use manifest::{MANIFEST_FILE, ModelKind, ModelManifest, OutputKind};
pub use pipeline::{JointParser, Pipeline, SlotFiller, TextScorer};
