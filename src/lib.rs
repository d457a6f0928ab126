// modules
pub mod completions;
pub mod config;
pub mod constants;
pub mod error;
pub mod logger;

#[cfg(test)]
pub mod test;

use rust_i18n::i18n;

// Translations are looked up in i18n/ at the crate root
i18n!("i18n", fallback = "en");

pub use completions::{
    CancelReason, CancelScope, CompletionError, CompletionParams, ContextSnippet,
    DocumentContext, LocalCompletionProvider, ProviderConfig, SlotSnapshot, SlotState,
};
pub use config::CompletionConfig;
pub use error::AppError;
