//! Server settings.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Context;

#[derive(Debug, Clone)]
pub struct ServeConfig {
    /// Model name → model directory.
    pub model_paths: BTreeMap<String, PathBuf>,
    pub host: String,
    pub port: u16,
    /// Origins allowed to make cross-origin requests; `*` allows any.
    pub allowed_origins: Vec<String>,
    /// When set, prediction routes require `?token=` or a bearer token.
    pub auth_token: Option<String>,
}

impl Default for ServeConfig {
    fn default() -> Self {
        Self {
            model_paths: BTreeMap::new(),
            host: "0.0.0.0".into(),
            port: 8000,
            allowed_origins: Vec::new(),
            auth_token: None,
        }
    }
}

impl ServeConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Parse `{"name": "path", ...}` given inline or as the path of a JSON file.
pub fn parse_model_paths(raw: &str) -> anyhow::Result<BTreeMap<String, PathBuf>> {
    let trimmed = raw.trim();
    let json = if trimmed.starts_with('{') {
        trimmed.to_string()
    } else {
        let path = Path::new(trimmed);
        std::fs::read_to_string(path)
            .with_context(|| format!("read model paths from {}", path.display()))?
    };
    let paths: BTreeMap<String, PathBuf> = serde_json::from_str(&json)
        .context("model paths must be a JSON object of name → directory")?;
    anyhow::ensure!(!paths.is_empty(), "no models configured");
    if let Some(name) = paths.keys().find(|n| n.trim().is_empty() || n.contains(',')) {
        anyhow::bail!("invalid model name {name:?}: names must be non-empty and contain no commas");
    }
    Ok(paths)
}
