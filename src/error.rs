use serde::Serialize;
use thiserror::Error;

/// The single, unified error type for the crate.
///
/// Wraps the module errors so callers see one consistent structure. The
/// `#[serde(tag = "module", content = "details")]` attribute keeps the JSON
/// form predictable for anything that reports errors as data.
#[derive(Error, Debug, Serialize)]
#[serde(tag = "module", content = "details")]
pub enum AppError {
    #[error(transparent)]
    Completion(#[from] crate::completions::CompletionError),

    #[error(transparent)]
    Config(#[from] crate::config::ConfigError),

    #[error("{message}")]
    General { message: String },
}

impl AppError {
    /// Serializes the error together with its display message.
    pub fn to_json(&self) -> serde_json::Value {
        let mut value = serde_json::to_value(self).unwrap_or_else(|e| {
            serde_json::json!({
                "module": "Internal",
                "details": {
                    "kind": "SerializationFailed",
                    "message": format!("Failed to serialize error: {}", e)
                }
            })
        });
        if let Some(obj) = value.as_object_mut() {
            obj.insert(
                "message".to_string(),
                serde_json::Value::String(self.to_string()),
            );
        }
        value
    }
}
