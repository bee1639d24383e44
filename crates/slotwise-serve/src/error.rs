use axum::Json;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde_json::json;
use slotwise_core::NluError;
use thiserror::Error;

/// Body of every request that fails before inference could run.
pub const COULD_NOT_RUN_INFERENCE: &str = "Unexpected Error: could not run inference on model";

/// Errors at the HTTP boundary.
#[derive(Debug, Error)]
pub enum ServeError {
    #[error(transparent)]
    Nlu(#[from] NluError),

    #[error("missing or invalid token")]
    Unauthorized,

    /// The request could not be turned into predictor input.
    #[error("{}", COULD_NOT_RUN_INFERENCE)]
    Inference,
}

impl ServeError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Nlu(NluError::NotReady { .. }) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Nlu(e) if e.is_client_error() => StatusCode::BAD_REQUEST,
            Self::Nlu(_) | Self::Inference => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
        }
    }
}

impl IntoResponse for ServeError {
    fn into_response(self) -> Response {
        let status = self.status();
        match self {
            Self::Nlu(NluError::NotReady { retry_after }) => {
                let mut response = (
                    status,
                    Json(json!({"message": NluError::not_ready().to_string()})),
                )
                    .into_response();
                response
                    .headers_mut()
                    .insert(header::RETRY_AFTER, HeaderValue::from(retry_after));
                response
            }
            other => (status, Json(json!({"error": other.to_string()}))).into_response(),
        }
    }
}
