use async_stream::stream;
use async_trait::async_trait;
use futures::stream::BoxStream;
use reqwest::{Client, Response};
use rust_i18n::t;
use std::time::Duration;

use super::stream::{GenerationStats, NdjsonParser, StreamChunk};
use super::types::{OllamaErrorResponse, OllamaGenerateRequest};
use crate::completions::cancel::CancelScope;
use crate::completions::error::CompletionError;
use crate::completions::request::GenerationRequest;

/// One element of a streaming generation.
///
/// A well-formed stream is any number of `Delta`s followed by exactly one
/// `Done` or `Error`. A stream that is cancelled simply ends.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Delta(String),
    Done(GenerationStats),
    Error(CompletionError),
}

pub type EventStream = BoxStream<'static, StreamEvent>;

#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Opens a streaming generation bound to `scope`.
    ///
    /// # Arguments
    /// * `request` - The generation request to send
    /// * `scope` - Cancellation scope owned by the calling slot
    ///
    /// # Returns
    /// The event stream, or the error that prevented it from opening. Once
    /// `scope` fires the stream releases its connection and ends.
    async fn complete(
        &self,
        request: &GenerationRequest,
        scope: &CancelScope,
    ) -> Result<EventStream, CompletionError>;
}

/// Client for an Ollama server's `/api/generate` endpoint.
#[derive(Clone, Debug)]
pub struct OllamaClient {
    http: Client,
    base_url: String,
}

impl OllamaClient {
    /// Creates a client for the server at `base_url`, e.g.
    /// `http://localhost:11434`. Local servers are always reached directly,
    /// bypassing any system proxy.
    pub fn new(base_url: &str) -> Result<Self, CompletionError> {
        let http = Client::builder()
            .no_proxy()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| {
                CompletionError::connection(
                    t!("completion.error.client_build_error", error = e.to_string()).to_string(),
                )
            })?;

        Ok(Self {
            http,
            base_url: base_url.to_string(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/api/generate", self.base_url.trim_end_matches('/'))
    }

    async fn process_error_response(response: Response) -> CompletionError {
        let status = response.status();
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => return CompletionError::from(e),
        };

        let message = serde_json::from_str::<OllamaErrorResponse>(&body)
            .map(|e| e.error)
            .unwrap_or(body);
        log::warn!(
            "Error response - Status: {}, Message: {}",
            status.as_u16(),
            message
        );

        CompletionError::connection(
            t!(
                "completion.error.request_failed_with_status",
                status = status.as_u16().to_string(),
                message = message
            )
            .to_string(),
        )
    }
}

#[async_trait]
impl CompletionClient for OllamaClient {
    async fn complete(
        &self,
        request: &GenerationRequest,
        scope: &CancelScope,
    ) -> Result<EventStream, CompletionError> {
        // Nothing goes on the wire once the slot is cancelled
        if scope.is_cancelled() {
            return Err(CompletionError::Cancelled);
        }

        let body = OllamaGenerateRequest {
            model: &request.model,
            prompt: &request.prompt,
            template: &request.template,
            options: &request.options,
            stream: true,
        };

        #[cfg(debug_assertions)]
        log::debug!("Request URL: {}", self.endpoint());

        let send = self.http.post(self.endpoint()).json(&body).send();
        let response = tokio::select! {
            biased;
            _ = scope.cancelled() => return Err(CompletionError::Cancelled),
            response = send => response?,
        };

        if !response.status().is_success() {
            return Err(Self::process_error_response(response).await);
        }

        Ok(ndjson_events(response, scope.clone()))
    }
}

enum Read {
    Cancelled,
    Chunk(reqwest::Result<Option<bytes::Bytes>>),
}

/// Turns a streaming NDJSON response into [`StreamEvent`]s.
///
/// Every read races the scope; on cancellation the response is dropped,
/// which closes the connection, and the stream ends without a terminal event.
fn ndjson_events(response: Response, scope: CancelScope) -> EventStream {
    Box::pin(stream! {
        let mut response = response;
        let mut parser = NdjsonParser::new();

        loop {
            let read = tokio::select! {
                biased;
                _ = scope.cancelled() => Read::Cancelled,
                chunk = response.chunk() => Read::Chunk(chunk),
            };

            let parsed = match read {
                Read::Cancelled => {
                    log::debug!("Generation stream cancelled: {:?}", scope.reason());
                    return;
                }
                Read::Chunk(Ok(Some(bytes))) => parser.push(&bytes),
                Read::Chunk(Ok(None)) => {
                    let rest: Vec<_> = parser.finish().into_iter().collect();
                    for event in chunk_events(rest) {
                        let terminal = !matches!(event, StreamEvent::Delta(_));
                        yield event;
                        if terminal {
                            return;
                        }
                    }
                    yield StreamEvent::Error(CompletionError::protocol(
                        t!("completion.error.stream_ended_early").to_string(),
                    ));
                    return;
                }
                Read::Chunk(Err(e)) => {
                    log::error!("Failed to read generation stream: {}", e);
                    yield StreamEvent::Error(CompletionError::from(e));
                    return;
                }
            };

            for event in chunk_events(parsed) {
                let terminal = !matches!(event, StreamEvent::Delta(_));
                yield event;
                if terminal {
                    return;
                }
            }
        }
    })
}

/// Flattens parsed lines into events, stopping after the first terminal one.
fn chunk_events(parsed: Vec<Result<StreamChunk, CompletionError>>) -> Vec<StreamEvent> {
    let mut events = Vec::new();
    for item in parsed {
        match item {
            Ok(chunk) => {
                if let Some(text) = chunk.content {
                    events.push(StreamEvent::Delta(text));
                }
                if chunk.done {
                    events.push(StreamEvent::Done(chunk.stats.unwrap_or_default()));
                    break;
                }
            }
            Err(e) => {
                events.push(StreamEvent::Error(e));
                break;
            }
        }
    }
    events
}
