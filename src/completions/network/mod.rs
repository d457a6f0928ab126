mod client;
mod stream;
mod types;

pub use client::{CompletionClient, EventStream, OllamaClient, StreamEvent};
pub use stream::{GenerationStats, NdjsonParser, StreamChunk};
pub use types::*;
