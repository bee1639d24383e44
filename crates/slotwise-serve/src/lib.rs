//! Multi-model NLU server.
//!
//! Binds immediately, loads models in the background, and answers 503 with
//! `Retry-After` until the registry is published.

#[cfg(feature = "client")]
pub mod client;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod http;
pub mod predictor;
pub mod registry;
pub mod upload;

#[cfg(test)]
mod testutil;

pub use config::{ServeConfig, parse_model_paths};
pub use dispatch::{BatchPredictionMap, Dispatcher, PredictionMap};
pub use error::ServeError;
pub use predictor::{ModelPredictor, PredictInput, Predictor};
#[cfg(feature = "onnx")]
pub use registry::onnx_loader;
pub use registry::{ModelLoader, PredictorRegistry, RegistryHandle, spawn_population};

use anyhow::Context;
use tracing::info;

/// Serve `config` until Ctrl-C.
pub async fn serve(config: ServeConfig, loader: ModelLoader) -> anyhow::Result<()> {
    let handle = RegistryHandle::new();
    spawn_population(handle.clone(), config.model_paths.clone(), loader);

    let state = http::AppState::new(Dispatcher::new(handle), config.auth_token.clone());
    let app = http::router(state, &config.allowed_origins);

    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("bind {addr}"))?;
    info!(
        addr = %addr,
        models = config.model_paths.len(),
        auth = config.auth_token.is_some(),
        "server listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;
    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
