//! HTTP API.
//!
//! - `GET /`: health, loaded and failed models
//! - `POST /predict`: multipart form, `model` is a comma-separated target list
//! - `POST /batch_predict`: JSON `{"texts": [..], "model": "a,b"}`
//! - `POST /parse`: JSON `{"text": ".."}`, language-routed combined result

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::multipart::{Multipart, MultipartRejection};
use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, Request, State};
use axum::http::{HeaderValue, Method, header};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use slotwise_core::ParseResult;
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, warn};

use crate::dispatch::{BatchPredictionMap, Dispatcher, PredictionMap};
use crate::error::ServeError;
use crate::predictor::PredictInput;

/// Form field and JSON key naming the target models.
pub const MODEL_FIELD: &str = "model";

#[derive(Clone)]
pub struct AppState {
    dispatcher: Dispatcher,
    auth_token: Option<Arc<str>>,
}

impl AppState {
    pub fn new(dispatcher: Dispatcher, auth_token: Option<String>) -> Self {
        Self {
            dispatcher,
            auth_token: auth_token.filter(|t| !t.is_empty()).map(Arc::from),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Health {
    pub message: String,
    pub models: Vec<String>,
    #[serde(default)]
    pub failed: BTreeMap<String, String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BatchRequest {
    pub texts: Vec<String>,
    #[serde(default)]
    pub model: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ParseRequest {
    pub text: String,
}

#[derive(Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

/// Build the router. Prediction routes sit behind token auth when a token
/// is configured; health stays open.
pub fn router(state: AppState, allowed_origins: &[String]) -> Router {
    let protected = Router::new()
        .route("/predict", post(predict))
        .route("/batch_predict", post(batch_predict))
        .route("/parse", post(parse))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_token));

    Router::new()
        .route("/", get(health))
        .merge(protected)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors_layer(allowed_origins)),
        )
        .with_state(state)
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let methods = [Method::GET, Method::POST];
    if allowed_origins.iter().any(|o| o == "*") {
        return CorsLayer::new().allow_origin(Any).allow_methods(methods).allow_headers(Any);
    }
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                warn!(origin = %o, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(methods)
        .allow_headers(Any)
}

async fn require_token(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ServeError> {
    let Some(expected) = state.auth_token.as_deref() else {
        return Ok(next.run(request).await);
    };
    let from_query = Query::<TokenQuery>::try_from_uri(request.uri())
        .ok()
        .and_then(|Query(q)| q.token);
    let from_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_owned);
    if from_query.as_deref() == Some(expected) || from_header.as_deref() == Some(expected) {
        Ok(next.run(request).await)
    } else {
        warn!(path = %request.uri().path(), "rejected request with missing or invalid token");
        Err(ServeError::Unauthorized)
    }
}

async fn health(State(state): State<AppState>) -> Result<Json<Health>, ServeError> {
    let registry = state.dispatcher.registry().require()?;
    Ok(Json(Health {
        message: "slotwise server is up".into(),
        models: registry.names(),
        failed: registry.failed().clone(),
    }))
}

async fn predict(
    State(state): State<AppState>,
    form: Result<Multipart, MultipartRejection>,
) -> Result<Json<PredictionMap>, ServeError> {
    state.dispatcher.registry().require()?;
    let form = form.map_err(|e| {
        error!(error = %e, "predict request is not a multipart form");
        ServeError::Inference
    })?;
    let (input, targets) = read_form(form).await.map_err(|e| {
        error!(error = %format!("{e:#}"), "failed to parse predict form");
        ServeError::Inference
    })?;
    Ok(Json(state.dispatcher.dispatch(input, &targets).await?))
}

async fn batch_predict(
    State(state): State<AppState>,
    body: Result<Json<BatchRequest>, JsonRejection>,
) -> Result<Json<BatchPredictionMap>, ServeError> {
    state.dispatcher.registry().require()?;
    let Json(request) = body.map_err(|e| {
        error!(error = %e, "failed to parse batch_predict body");
        ServeError::Inference
    })?;
    let targets = parse_targets(request.model.as_deref().unwrap_or_default());
    Ok(Json(state.dispatcher.dispatch_batch(request.texts, &targets).await?))
}

async fn parse(
    State(state): State<AppState>,
    body: Result<Json<ParseRequest>, JsonRejection>,
) -> Result<Json<ParseResult>, ServeError> {
    state.dispatcher.registry().require()?;
    let Json(request) = body.map_err(|e| {
        error!(error = %e, "failed to parse parse body");
        ServeError::Inference
    })?;
    Ok(Json(state.dispatcher.parse(request.text).await?))
}

/// Split the form into predictor input and target names. File parts are
/// spooled to temp files owned by the returned input.
async fn read_form(mut form: Multipart) -> anyhow::Result<(PredictInput, Vec<String>)> {
    let mut input = PredictInput::default();
    let mut targets = Vec::new();
    while let Some(field) = form.next_field().await? {
        let Some(name) = field.name().map(str::to_owned) else {
            continue;
        };
        if let Some(file_name) = field.file_name().map(str::to_owned) {
            let bytes = field.bytes().await?;
            input.artifacts.spool(&name, Some(&file_name), &bytes)?;
        } else if name == MODEL_FIELD {
            targets = parse_targets(&field.text().await?);
        } else {
            let value = field.text().await?;
            input.fields.insert(name, value);
        }
    }
    Ok((input, targets))
}

/// `"a, b,,c"` → `["a", "b", "c"]`.
pub fn parse_targets(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect()
}
