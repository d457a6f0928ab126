use rust_i18n::t;
use serde::Serialize;
use thiserror::Error;

/// Terminal failure of a single completion slot.
///
/// Every variant is cheap to clone so the aggregator can keep the last known
/// state of each slot inside every snapshot it hands out.
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum CompletionError {
    /// Transport failure or a non-success HTTP status.
    #[error("{}", t!("completion.error.connection", details = .details))]
    Connection { details: String },

    /// The deadline elapsed before the server reported completion.
    #[error("{}", t!("completion.error.timeout", timeout_ms = .timeout_ms))]
    Timeout { timeout_ms: u64 },

    /// The caller cancelled the request.
    #[error("{}", t!("completion.error.cancelled"))]
    Cancelled,

    /// The server sent something that is not a generation event.
    #[error("{}", t!("completion.error.protocol", details = .details))]
    Protocol { details: String },
}

impl CompletionError {
    pub fn connection(details: impl Into<String>) -> Self {
        Self::Connection {
            details: details.into(),
        }
    }

    pub fn protocol(details: impl Into<String>) -> Self {
        Self::Protocol {
            details: details.into(),
        }
    }
}

impl From<reqwest::Error> for CompletionError {
    fn from(err: reqwest::Error) -> Self {
        Self::connection(err.to_string())
    }
}
