use bytes::BytesMut;
use serde::Serialize;

use super::types::{OllamaErrorResponse, OllamaGenerateResponse};
use crate::completions::error::CompletionError;

/// Timing and token counters reported with the final event of a stream.
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct GenerationStats {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    /// Total server-side duration in nanoseconds.
    pub total_duration: u64,
    pub done_reason: Option<String>,
    /// The speed of token generation in tokens per second (tokens/s)
    pub tokens_per_second: f64,
}

impl From<&OllamaGenerateResponse> for GenerationStats {
    fn from(response: &OllamaGenerateResponse) -> Self {
        let completion_tokens = response.eval_count.unwrap_or_default();
        let tokens_per_second = match response.eval_duration {
            Some(ns) if ns > 0 => completion_tokens as f64 / (ns as f64 / 1_000_000_000.0),
            _ => 0.0,
        };

        Self {
            prompt_tokens: response.prompt_eval_count.unwrap_or_default(),
            completion_tokens,
            total_duration: response.total_duration.unwrap_or_default(),
            done_reason: response.done_reason.clone(),
            tokens_per_second,
        }
    }
}

/// One parsed line of a generate stream.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamChunk {
    /// Text produced since the previous line
    pub content: Option<String>,
    /// Present on the final line only
    pub stats: Option<GenerationStats>,
    pub done: bool,
}

/// Incremental NDJSON splitter.
///
/// Network chunks do not respect line boundaries, so a partial trailing line
/// is kept in the buffer until the rest of it arrives.
pub struct NdjsonParser {
    buffer: BytesMut,
}

impl NdjsonParser {
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(8192),
        }
    }

    /// Feeds raw bytes and returns every complete line parsed, in order.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Result<StreamChunk, CompletionError>> {
        self.buffer.extend_from_slice(chunk);

        let mut parsed = Vec::new();
        while let Some(pos) = memchr::memchr(b'\n', &self.buffer) {
            let line = self.buffer.split_to(pos + 1);
            if let Some(result) = parse_line(&line) {
                parsed.push(result);
            }
        }
        parsed
    }

    /// Parses whatever is left once the response body has ended.
    pub fn finish(&mut self) -> Option<Result<StreamChunk, CompletionError>> {
        if self.buffer.is_empty() {
            return None;
        }
        log::debug!("buffer remain: {}", String::from_utf8_lossy(&self.buffer));
        let rest = self.buffer.split();
        parse_line(&rest)
    }
}

impl Default for NdjsonParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Parses a single NDJSON line. Blank lines yield `None`.
fn parse_line(line: &[u8]) -> Option<Result<StreamChunk, CompletionError>> {
    let text = String::from_utf8_lossy(line);
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    match serde_json::from_str::<OllamaGenerateResponse>(text) {
        Ok(response) => {
            let content = (!response.response.is_empty()).then(|| response.response.clone());
            let stats = response.done.then(|| GenerationStats::from(&response));
            Some(Ok(StreamChunk {
                content,
                stats,
                done: response.done,
            }))
        }
        Err(e) => {
            if let Ok(error) = serde_json::from_str::<OllamaErrorResponse>(text) {
                return Some(Err(CompletionError::protocol(error.error)));
            }
            log::error!("Failed to parse Ollama stream line: {}, error: {}", text, e);
            Some(Err(CompletionError::protocol(format!("{}: {}", e, text))))
        }
    }
}
