use rust_i18n::t;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::constants::{
    DEFAULT_MODEL, DEFAULT_SERVER_ENDPOINT, DEFAULT_TIMEOUT_MS, ENV_CONTEXT_SNIPPETS, ENV_HOST,
    ENV_MODEL,
};

#[derive(Error, Debug, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ConfigError {
    #[error("{}", t!("config.error.read_failed", path = .path, error = .error))]
    ReadFailed { path: String, error: String },

    #[error("{}", t!("config.error.parse_failed", path = .path, error = .error))]
    ParseFailed { path: String, error: String },

    #[error("{}", t!("config.error.invalid_endpoint", endpoint = .endpoint, error = .error))]
    InvalidEndpoint { endpoint: String, error: String },
}

/// Settings of the local completion provider.
///
/// Read from a JSON file with camelCase keys; every key is optional.
///
/// # Example
/// ```json
/// {
///   "serverEndpoint": "http://localhost:11434",
///   "model": "codellama:7b-code",
///   "parameters": { "temperature": 0.1, "num_ctx": 4096 },
///   "timeoutMs": 50000,
///   "contextSnippets": false,
///   "multiline": false
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CompletionConfig {
    pub server_endpoint: String,
    pub model: String,
    /// Sampling option overrides merged onto the model defaults
    pub parameters: Option<Map<String, Value>>,
    pub timeout_ms: u64,
    /// Include ranked context snippets in the prompt
    pub context_snippets: bool,
    pub multiline: bool,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            server_endpoint: DEFAULT_SERVER_ENDPOINT.to_string(),
            model: DEFAULT_MODEL.to_string(),
            parameters: None,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            context_snippets: false,
            multiline: false,
        }
    }
}

impl CompletionConfig {
    /// Loads the config file when given, applies environment overrides and
    /// validates the result.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        let config = config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFailed {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;

        serde_json::from_str(&content).map_err(|e| ConfigError::ParseFailed {
            path: path.display().to_string(),
            error: e.to_string(),
        })
    }

    /// Overlays environment variables read through `lookup`.
    ///
    /// Any non-empty `OLLAMA_CONTEXT_SNIPPETS` enables context snippets.
    pub fn apply_env(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if non_empty(ENV_CONTEXT_SNIPPETS).is_some() {
            self.context_snippets = true;
        }
        if let Some(host) = non_empty(ENV_HOST) {
            self.server_endpoint = if host.contains("://") {
                host
            } else {
                format!("http://{}", host)
            };
        }
        if let Some(model) = non_empty(ENV_MODEL) {
            self.model = model;
        }
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        Url::parse(&self.server_endpoint).map_err(|e| ConfigError::InvalidEndpoint {
            endpoint: self.server_endpoint.clone(),
            error: e.to_string(),
        })?;
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}
