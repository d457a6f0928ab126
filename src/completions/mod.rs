//! Local model code completion pipeline.
//!
//! A request flows through prompt assembly, the model-specific helper and
//! request builder, then fans out into `n` streaming generations against an
//! Ollama server. Each stream is guarded by a timeout, shaped by a
//! post-processor and merged into snapshots of all slots.

pub mod cancel;
pub mod error;
pub mod fanout;
pub mod model;
pub mod network;
pub mod postprocess;
pub mod prompt;
pub mod provider;
pub mod request;
pub mod timeout;

pub use cancel::{CancelReason, CancelScope};
pub use error::CompletionError;
pub use fanout::{SlotSnapshot, SlotState};
pub use prompt::{ContextSnippet, DocumentContext};
pub use provider::{CompletionParams, LocalCompletionProvider, ProviderConfig};
