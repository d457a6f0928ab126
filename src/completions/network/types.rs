use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// Sampling parameters understood by the Ollama generate endpoint.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct OllamaOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_predict: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_k: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repeat_penalty: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_ctx: Option<i32>,
}

impl OllamaOptions {
    /// Serializes the options into a JSON object so that caller overrides can
    /// be merged key by key.
    pub fn into_map(self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            Ok(other) => {
                log::warn!("Ollama options serialized to a non-object: {}", other);
                Map::new()
            }
            Err(e) => {
                log::error!("Failed to serialize Ollama options: {}", e);
                Map::new()
            }
        }
    }
}

// Body of `POST /api/generate`.
#[derive(Serialize, Debug, Clone)]
pub struct OllamaGenerateRequest<'a> {
    pub model: &'a str,
    pub prompt: &'a str,
    pub template: &'a str,
    pub options: &'a Map<String, Value>,
    pub stream: bool,
}

// One NDJSON line of a streaming generate response. The final line has
// `done: true` and carries the timing counters.
#[derive(Deserialize, Debug, Clone, Default)]
pub struct OllamaGenerateResponse {
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub response: String,
    pub done: bool,
    #[serde(default)]
    pub done_reason: Option<String>,
    #[serde(default)]
    pub total_duration: Option<u64>,
    #[serde(default)]
    pub load_duration: Option<u64>,
    #[serde(default)]
    pub prompt_eval_count: Option<u64>,
    #[serde(default)]
    pub prompt_eval_duration: Option<u64>,
    #[serde(default)]
    pub eval_count: Option<u64>,
    #[serde(default)]
    pub eval_duration: Option<u64>,
}

// Error body, either as the whole response or as a stream line.
#[derive(Deserialize, Debug, Clone)]
pub struct OllamaErrorResponse {
    pub error: String,
}
