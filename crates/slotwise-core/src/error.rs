use thiserror::Error;

/// Seconds a client should wait before retrying while models load.
pub const RETRY_AFTER_SECS: u64 = 120;

#[derive(Debug, Error)]
pub enum NluError {
    /// Vocabulary/distribution mismatch, bad manifest, missing model files.
    /// Fatal for the predictor being loaded, never for the process.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Malformed request payload.
    #[error("{0}")]
    Validation(String),

    #[error("Invalid model names: {invalid:?}. Available models: {available:?}.")]
    UnknownModels {
        invalid: Vec<String>,
        available: Vec<String>,
    },

    /// The classifier or tokenizer failed for one predictor.
    #[error("prediction failed: {0}")]
    Prediction(String),

    #[error("Models are still loading, please retry later.")]
    NotReady { retry_after: u64 },
}

impl NluError {
    pub fn not_ready() -> Self {
        Self::NotReady {
            retry_after: RETRY_AFTER_SECS,
        }
    }

    /// True for errors the caller caused (4xx-equivalent).
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::UnknownModels { .. })
    }
}

pub type Result<T, E = NluError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_models_message_lists_both_sets() {
        let err = NluError::UnknownModels {
            invalid: vec!["nope".into()],
            available: vec!["intent".into(), "slots".into()],
        };
        let msg = err.to_string();
        assert!(msg.contains("\"nope\""));
        assert!(msg.contains("\"intent\""));
        assert!(err.is_client_error());
    }

    #[test]
    fn not_ready_uses_fixed_retry_policy() {
        match NluError::not_ready() {
            NluError::NotReady { retry_after } => assert_eq!(retry_after, 120),
            other => panic!("unexpected {other:?}"),
        }
    }
}
