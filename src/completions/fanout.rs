use async_stream::stream;
use futures::stream::{BoxStream, FuturesUnordered};
use futures::StreamExt;
use rust_i18n::t;
use serde::Serialize;

use super::cancel::{CancelReason, CancelScope};
use super::error::CompletionError;
use super::network::GenerationStats;
use super::postprocess::{CompletionCandidate, PostProcessor};
use super::timeout::{GuardedEvent, Termination};

/// Lifecycle of one slot as seen by the caller.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum SlotState {
    Streaming,
    Completed,
    CancelledByCaller,
    TimedOut { timeout_ms: u64 },
    Failed { error: CompletionError },
}

impl SlotState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SlotState::Streaming)
    }

    /// The error a caller should surface for this state, if any.
    pub fn error(&self) -> Option<CompletionError> {
        match self {
            SlotState::Streaming | SlotState::Completed => None,
            SlotState::CancelledByCaller => Some(CompletionError::Cancelled),
            SlotState::TimedOut { timeout_ms } => Some(CompletionError::Timeout {
                timeout_ms: *timeout_ms,
            }),
            SlotState::Failed { error } => Some(error.clone()),
        }
    }
}

/// Latest known state of one slot.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotUpdate {
    pub candidate: CompletionCandidate,
    pub state: SlotState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<GenerationStats>,
}

/// A slot's update together with its index, as handed to the caller.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotSnapshot {
    pub index: usize,
    #[serde(flatten)]
    pub update: SlotUpdate,
}

impl SlotSnapshot {
    fn pending(index: usize) -> Self {
        Self {
            index,
            update: SlotUpdate {
                candidate: CompletionCandidate::default(),
                state: SlotState::Streaming,
                stats: None,
            },
        }
    }

    pub fn candidate(&self) -> &CompletionCandidate {
        &self.update.candidate
    }

    pub fn state(&self) -> &SlotState {
        &self.update.state
    }
}

pub type SlotStream = BoxStream<'static, SlotUpdate>;

/// Drives one guarded stream through its post-processor.
///
/// Yields an update whenever the candidate changes and always finishes with
/// exactly one terminal update carrying the last candidate. When the
/// post-processor reports the completion complete, the stream stops reading
/// and the dropped connection is closed.
pub fn process_slot(
    guarded: BoxStream<'static, GuardedEvent>,
    mut processor: PostProcessor,
) -> SlotStream {
    Box::pin(stream! {
        let mut guarded = guarded;

        while let Some(event) = guarded.next().await {
            match event {
                GuardedEvent::Delta(text) => {
                    if let Some(candidate) = processor.push(&text) {
                        yield SlotUpdate {
                            candidate,
                            state: SlotState::Streaming,
                            stats: None,
                        };
                    }
                    if processor.is_complete() {
                        yield SlotUpdate {
                            candidate: processor.finish(),
                            state: SlotState::Completed,
                            stats: None,
                        };
                        return;
                    }
                }
                GuardedEvent::End(end) => {
                    let (state, stats) = match end {
                        Termination::Completed(stats) => (SlotState::Completed, Some(stats)),
                        Termination::CancelledByCaller => (SlotState::CancelledByCaller, None),
                        Termination::TimedOut { timeout_ms } => {
                            (SlotState::TimedOut { timeout_ms }, None)
                        }
                        Termination::Failed(error) => (SlotState::Failed { error }, None),
                    };
                    yield SlotUpdate {
                        candidate: processor.finish(),
                        state,
                        stats,
                    };
                    return;
                }
            }
        }
    })
}

/// Merges K slot streams into one stream of K-length snapshots.
///
/// A ready-queue holds one pending "next update" future per live slot.
/// Whichever resolves first is applied to its slot, a snapshot of all slots
/// is yielded, and the slot is re-armed unless it reached a terminal state.
/// The stream ends once every slot is terminal. Dropping it early fires
/// `scope`, which the slots are expected to be forked from. A failing slot
/// never cancels its siblings.
pub fn merge_slots(
    slots: Vec<SlotStream>,
    scope: CancelScope,
) -> BoxStream<'static, Vec<SlotSnapshot>> {
    Box::pin(stream! {
        let _cancel_on_drop = scopeguard::guard(scope, |scope| {
            scope.cancel(CancelReason::Caller);
        });

        let mut snapshots: Vec<SlotSnapshot> =
            (0..slots.len()).map(SlotSnapshot::pending).collect();
        let mut ready = FuturesUnordered::new();
        for (index, slot) in slots.into_iter().enumerate() {
            ready.push(next_update(index, slot));
        }

        while let Some((index, update, slot)) = ready.next().await {
            match update {
                Some(update) => {
                    let terminal = update.state.is_terminal();
                    snapshots[index].update = update;
                    if !terminal {
                        ready.push(next_update(index, slot));
                    }
                }
                None => {
                    if snapshots[index].update.state.is_terminal() {
                        continue;
                    }
                    log::warn!("Completion slot {} ended without a terminal state", index);
                    snapshots[index].update.state = SlotState::Failed {
                        error: CompletionError::protocol(
                            t!("completion.error.slot_ended_early", index = index.to_string())
                                .to_string(),
                        ),
                    };
                }
            }
            yield snapshots.clone();
        }
    })
}

async fn next_update(index: usize, slot: SlotStream) -> (usize, Option<SlotUpdate>, SlotStream) {
    let (update, slot) = slot.into_future().await;
    (index, update, slot)
}
