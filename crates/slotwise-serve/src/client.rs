//! HTTP client for a running slotwise server.

use reqwest::multipart::Form;
use serde::de::DeserializeOwned;
use slotwise_core::ParseResult;
use thiserror::Error;
use tracing::info;

use crate::dispatch::{BatchPredictionMap, PredictionMap};
use crate::http::{BatchRequest, Health, MODEL_FIELD, ParseRequest};
use crate::predictor::TEXT_FEATURE;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server returned {status}: {body}")]
    Server { status: u16, body: String },
}

pub struct NluClient {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl NluClient {
    /// `base_url` is like `http://localhost:8000`.
    pub fn new(base_url: &str, token: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn read<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, ClientError> {
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ClientError::Server {
                status: status.as_u16(),
                body,
            });
        }
        Ok(resp.json().await?)
    }

    pub async fn health(&self) -> Result<Health, ClientError> {
        let resp = self.client.get(self.url("/")).send().await?;
        Self::read(resp).await
    }

    /// Predict with the named models, or every model when `models` is empty.
    pub async fn predict(
        &self,
        text: &str,
        models: &[String],
    ) -> Result<PredictionMap, ClientError> {
        let mut form = Form::new().text(TEXT_FEATURE, text.to_string());
        if !models.is_empty() {
            form = form.text(MODEL_FIELD, models.join(","));
        }
        info!(url = %self.url("/predict"), models = models.len(), "requesting prediction");
        let resp = self
            .authorize(self.client.post(self.url("/predict")))
            .multipart(form)
            .send()
            .await?;
        Self::read(resp).await
    }

    pub async fn batch_predict(
        &self,
        texts: Vec<String>,
        models: &[String],
    ) -> Result<BatchPredictionMap, ClientError> {
        let body = BatchRequest {
            texts,
            model: (!models.is_empty()).then(|| models.join(",")),
        };
        let resp = self
            .authorize(self.client.post(self.url("/batch_predict")))
            .json(&body)
            .send()
            .await?;
        Self::read(resp).await
    }

    pub async fn parse(&self, text: &str) -> Result<ParseResult, ClientError> {
        let body = ParseRequest { text: text.to_string() };
        let resp = self
            .authorize(self.client.post(self.url("/parse")))
            .json(&body)
            .send()
            .await?;
        Self::read(resp).await
    }
}
