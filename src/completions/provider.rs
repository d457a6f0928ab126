use futures::stream::{self, BoxStream};
use futures::StreamExt;
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;

use super::cancel::CancelScope;
use super::error::CompletionError;
use super::fanout::{merge_slots, process_slot, SlotSnapshot};
use super::model::helper_for_model;
use super::network::{CompletionClient, EventStream, OllamaClient, StreamEvent};
use super::postprocess::{CompletionMode, PostProcessor, TrimShaper};
use super::prompt::{ContextSnippet, DocumentContext, PromptAssembler};
use super::request::{build_generation_request, GenerationRequest};
use super::timeout::{with_timeout, Deadlines};
use crate::config::CompletionConfig;
use crate::constants::{
    CONTEXT_PREFIX_CHARS, CONTEXT_SUFFIX_CHARS, CONTEXT_TOTAL_CHARS, FIRST_COMPLETION_TIMEOUT_MS,
    PROVIDER_IDENTIFIER,
};

pub fn is_local_completions_provider(identifier: &str) -> bool {
    identifier == PROVIDER_IDENTIFIER
}

/// How much document text the caller should gather around the cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextSizeHints {
    pub total_chars: usize,
    pub prefix_chars: usize,
    pub suffix_chars: usize,
}

impl Default for ContextSizeHints {
    fn default() -> Self {
        Self {
            total_chars: CONTEXT_TOTAL_CHARS,
            prefix_chars: CONTEXT_PREFIX_CHARS,
            suffix_chars: CONTEXT_SUFFIX_CHARS,
        }
    }
}

/// Static description of the provider for the host that schedules it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfig {
    pub identifier: &'static str,
    pub model: String,
    pub n: usize,
    pub context_size_hints: ContextSizeHints,
    /// Limit for the first text of a completion to arrive
    pub first_completion_timeout: Duration,
    /// Hard limit for a whole completion
    pub timeout: Duration,
}

impl ProviderConfig {
    /// Describes a provider for `config`. A local model is asked for a single
    /// completion at a time.
    pub fn create(config: &CompletionConfig) -> Self {
        Self {
            identifier: PROVIDER_IDENTIFIER,
            model: config.model.clone(),
            n: 1,
            context_size_hints: ContextSizeHints::default(),
            first_completion_timeout: Duration::from_millis(FIRST_COMPLETION_TIMEOUT_MS),
            timeout: config.timeout(),
        }
    }

    /// Per-call parameters as the host schedules them for this provider.
    pub fn completion_params(
        &self,
        document: DocumentContext,
        multiline: bool,
    ) -> CompletionParams {
        CompletionParams {
            document,
            n: self.n,
            timeout: self.timeout,
            first_completion_timeout: Some(self.first_completion_timeout),
            multiline,
        }
    }
}

/// Observer for the request sent to the model, used for diagnostics.
pub trait CompletionTracer: Send + Sync {
    fn params(&self, request: &GenerationRequest);
}

/// Per-call parameters of a generation.
#[derive(Debug, Clone)]
pub struct CompletionParams {
    pub document: DocumentContext,
    /// Number of independent completions to request
    pub n: usize,
    /// Hard deadline applied to each slot
    pub timeout: Duration,
    /// Deadline for each slot's first text, disarmed once text arrives
    pub first_completion_timeout: Option<Duration>,
    pub multiline: bool,
}

/// Completion provider backed by a local model server.
pub struct LocalCompletionProvider {
    client: Arc<dyn CompletionClient>,
    model: String,
    parameters: Option<Map<String, Value>>,
    assembler: PromptAssembler,
    tracer: Option<Arc<dyn CompletionTracer>>,
}

impl LocalCompletionProvider {
    pub fn new(
        client: Arc<dyn CompletionClient>,
        model: impl Into<String>,
        parameters: Option<Map<String, Value>>,
        context_snippets: bool,
    ) -> Self {
        Self {
            client,
            model: model.into(),
            parameters,
            assembler: PromptAssembler::new(context_snippets),
            tracer: None,
        }
    }

    /// Creates a provider talking to the Ollama server named in `config`.
    pub fn from_config(config: &CompletionConfig) -> Result<Self, CompletionError> {
        let client = OllamaClient::new(&config.server_endpoint)?;
        Ok(Self::new(
            Arc::new(client),
            config.model.clone(),
            config.parameters.clone(),
            config.context_snippets,
        ))
    }

    pub fn with_tracer(mut self, tracer: Arc<dyn CompletionTracer>) -> Self {
        self.tracer = Some(tracer);
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Starts `params.n` independent generations for the same prompt.
    ///
    /// Every slot runs under its own scope forked from `scope`, so firing
    /// `scope` or dropping the returned stream cancels all of them. The
    /// stream yields a snapshot of all slots each time one of them changes
    /// and ends once every slot reached a terminal state.
    pub fn generate_completions(
        &self,
        params: CompletionParams,
        snippets: &[ContextSnippet],
        scope: &CancelScope,
    ) -> BoxStream<'static, Vec<SlotSnapshot>> {
        let document = &params.document;
        let use_infill = document.wants_infill();
        let helper = helper_for_model(&self.model);

        let prompt = self
            .assembler
            .assemble(document, snippets, use_infill, helper.as_ref());
        let request = Arc::new(build_generation_request(
            &prompt,
            helper.as_ref(),
            &self.model,
            params.multiline,
            self.parameters.as_ref(),
        ));

        if let Some(tracer) = &self.tracer {
            tracer.params(&request);
        }
        log::debug!(
            "Ollama generation: model={}, helper={}, infill={}, snippets={}, n={}, request={}",
            self.model,
            helper.name(),
            use_infill,
            prompt.snippets.len(),
            params.n,
            serde_json::to_string(request.as_ref()).unwrap_or_default()
        );

        let mode = if params.multiline {
            CompletionMode::Multiline
        } else {
            CompletionMode::SingleLine
        };
        let base_indent = document.block_indent();
        let mut deadlines = Deadlines::new(params.timeout);
        if let Some(first) = params.first_completion_timeout {
            deadlines = deadlines.with_first_delta(first);
        }

        let aggregate = scope.fork();
        let slots = (0..params.n)
            .map(|_| {
                let slot_scope = aggregate.fork();
                let events = self.open_slot(request.clone(), slot_scope.clone());
                let guarded = with_timeout(events, deadlines, slot_scope);
                let mut processor = PostProcessor::new(mode, Arc::new(TrimShaper));
                if let Some(indent) = base_indent {
                    processor = processor.with_base_indent(indent);
                }
                process_slot(guarded, processor)
            })
            .collect();

        merge_slots(slots, aggregate)
    }

    /// The request is only sent once the slot is first polled. A failure to
    /// open it becomes the slot's terminal event.
    fn open_slot(&self, request: Arc<GenerationRequest>, scope: CancelScope) -> EventStream {
        let client = self.client.clone();
        let opened = async move {
            match client.complete(&request, &scope).await {
                Ok(events) => events,
                Err(e) => {
                    if !matches!(e, CompletionError::Cancelled) {
                        log::error!("Failed to start Ollama generation: {}", e);
                    }
                    Box::pin(stream::once(async move { StreamEvent::Error(e) })) as EventStream
                }
            }
        };
        Box::pin(stream::once(opened).flatten())
    }
}
