use async_stream::stream;
use futures::stream::BoxStream;
use futures::StreamExt;
use rust_i18n::t;
use std::time::Duration;

use super::cancel::{CancelReason, CancelScope};
use super::error::CompletionError;
use super::network::{EventStream, GenerationStats, StreamEvent};

/// How a guarded stream ended.
#[derive(Debug, Clone, PartialEq)]
pub enum Termination {
    Completed(GenerationStats),
    CancelledByCaller,
    /// Carries the limit that elapsed.
    TimedOut { timeout_ms: u64 },
    Failed(CompletionError),
}

/// Output of [`with_timeout`]: deltas followed by exactly one `End`.
#[derive(Debug, Clone, PartialEq)]
pub enum GuardedEvent {
    Delta(String),
    End(Termination),
}

/// Time limits applied to one guarded stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadlines {
    /// Hard limit for the whole stream
    pub total: Duration,
    /// Limit for the first delta to arrive
    pub first_delta: Option<Duration>,
}

impl Deadlines {
    pub fn new(total: Duration) -> Self {
        Self {
            total,
            first_delta: None,
        }
    }

    pub fn with_first_delta(mut self, first_delta: Duration) -> Self {
        self.first_delta = Some(first_delta);
        self
    }
}

impl From<Duration> for Deadlines {
    fn from(total: Duration) -> Self {
        Self::new(total)
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

enum Step {
    Cancelled,
    Deadline(Duration),
    Event(Option<StreamEvent>),
}

fn cancelled_by(reason: Option<CancelReason>, limit: Duration) -> Termination {
    match reason {
        Some(CancelReason::Timeout) => Termination::TimedOut {
            timeout_ms: millis(limit),
        },
        _ => Termination::CancelledByCaller,
    }
}

/// Guards `inner` with `deadlines` and the cancellation `scope`.
///
/// Both deadlines run from the moment the stream is first polled. The
/// first-delta limit is disarmed once any text arrives. When a limit elapses
/// first, `scope` is fired with [`CancelReason::Timeout`] and the sequence
/// ends in `TimedOut`. When `scope` is fired from above, the sequence ends
/// in `CancelledByCaller`. The timers are owned by the stream state and are
/// released as soon as the sequence ends or is dropped.
pub fn with_timeout(
    inner: EventStream,
    deadlines: impl Into<Deadlines>,
    scope: CancelScope,
) -> BoxStream<'static, GuardedEvent> {
    let deadlines = deadlines.into();
    let total = deadlines.total;
    let first_limit = deadlines.first_delta.map_or(total, |d| d.min(total));

    Box::pin(stream! {
        let mut inner = inner;
        let deadline = tokio::time::sleep(total);
        let first_deadline = tokio::time::sleep(first_limit);
        tokio::pin!(deadline);
        tokio::pin!(first_deadline);
        let mut awaiting_first = first_limit < total;

        loop {
            let step = tokio::select! {
                biased;
                _ = scope.cancelled() => Step::Cancelled,
                _ = &mut deadline => Step::Deadline(total),
                _ = &mut first_deadline, if awaiting_first => Step::Deadline(first_limit),
                event = inner.next() => Step::Event(event),
            };

            match step {
                Step::Cancelled => {
                    yield GuardedEvent::End(cancelled_by(scope.reason(), total));
                    return;
                }
                Step::Deadline(limit) => {
                    // A caller cancellation that raced the timer keeps its reason
                    let end = if scope.cancel(CancelReason::Timeout) {
                        log::warn!("Completion stream timed out after {:?}", limit);
                        Termination::TimedOut {
                            timeout_ms: millis(limit),
                        }
                    } else {
                        cancelled_by(scope.reason(), limit)
                    };
                    yield GuardedEvent::End(end);
                    return;
                }
                Step::Event(Some(StreamEvent::Delta(text))) => {
                    awaiting_first = false;
                    yield GuardedEvent::Delta(text);
                }
                Step::Event(Some(StreamEvent::Done(stats))) => {
                    yield GuardedEvent::End(Termination::Completed(stats));
                    return;
                }
                Step::Event(Some(StreamEvent::Error(e))) => {
                    let end = match e {
                        CompletionError::Cancelled => cancelled_by(scope.reason(), total),
                        other => Termination::Failed(other),
                    };
                    yield GuardedEvent::End(end);
                    return;
                }
                Step::Event(None) => {
                    let end = match scope.reason() {
                        Some(reason) => cancelled_by(Some(reason), total),
                        None => Termination::Failed(CompletionError::protocol(
                            t!("completion.error.stream_ended_early").to_string(),
                        )),
                    };
                    yield GuardedEvent::End(end);
                    return;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    fn events(items: Vec<StreamEvent>) -> EventStream {
        Box::pin(stream::iter(items))
    }

    fn silent() -> EventStream {
        Box::pin(stream::pending())
    }

    async fn collect(s: BoxStream<'static, GuardedEvent>) -> Vec<GuardedEvent> {
        s.collect().await
    }

    #[tokio::test]
    async fn test_completed_stream_passes_through() {
        let scope = CancelScope::new();
        let out = collect(with_timeout(
            events(vec![
                StreamEvent::Delta("a".to_string()),
                StreamEvent::Delta("b".to_string()),
                StreamEvent::Done(GenerationStats::default()),
                StreamEvent::Delta("ignored".to_string()),
            ]),
            Duration::from_secs(5),
            scope.clone(),
        ))
        .await;

        assert_eq!(
            out,
            vec![
                GuardedEvent::Delta("a".to_string()),
                GuardedEvent::Delta("b".to_string()),
                GuardedEvent::End(Termination::Completed(GenerationStats::default())),
            ]
        );
        assert!(!scope.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_fires_timeout() {
        let scope = CancelScope::new();
        let inner: EventStream = Box::pin(
            stream::iter(vec![StreamEvent::Delta("partial".to_string())]).chain(stream::pending()),
        );

        let out = collect(with_timeout(inner, Duration::from_millis(500), scope.clone())).await;

        assert_eq!(
            out,
            vec![
                GuardedEvent::Delta("partial".to_string()),
                GuardedEvent::End(Termination::TimedOut { timeout_ms: 500 }),
            ]
        );
        assert_eq!(scope.reason(), Some(CancelReason::Timeout));
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_delta_deadline() {
        let scope = CancelScope::new();
        let deadlines =
            Deadlines::new(Duration::from_secs(50)).with_first_delta(Duration::from_secs(30));

        let out = collect(with_timeout(silent(), deadlines, scope.clone())).await;
        assert_eq!(
            out,
            vec![GuardedEvent::End(Termination::TimedOut { timeout_ms: 30_000 })]
        );
        assert_eq!(scope.reason(), Some(CancelReason::Timeout));
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_delta_disarms_its_deadline() {
        let inner: EventStream = Box::pin(
            stream::iter(vec![StreamEvent::Delta("x".to_string())]).chain(stream::pending()),
        );
        let deadlines =
            Deadlines::new(Duration::from_secs(50)).with_first_delta(Duration::from_secs(30));

        let start = tokio::time::Instant::now();
        let out = collect(with_timeout(inner, deadlines, CancelScope::new())).await;

        // Only the hard limit can end a stream that already produced text
        assert_eq!(
            out.last(),
            Some(&GuardedEvent::End(Termination::TimedOut { timeout_ms: 50_000 }))
        );
        assert!(start.elapsed() >= Duration::from_secs(50));
    }

    #[tokio::test(start_paused = true)]
    async fn test_caller_cancel_is_not_a_timeout() {
        let parent = CancelScope::new();
        let scope = parent.fork();
        let guarded = with_timeout(silent(), Duration::from_secs(60), scope.clone());

        let handle = tokio::spawn(collect(guarded));
        tokio::time::sleep(Duration::from_millis(10)).await;
        parent.cancel(CancelReason::Caller);

        let out = handle.await.unwrap();
        assert_eq!(out, vec![GuardedEvent::End(Termination::CancelledByCaller)]);
        assert_eq!(scope.reason(), Some(CancelReason::Caller));
    }

    #[tokio::test]
    async fn test_errors_and_early_end() {
        let failed = collect(with_timeout(
            events(vec![StreamEvent::Error(CompletionError::connection("refused"))]),
            Duration::from_secs(5),
            CancelScope::new(),
        ))
        .await;
        assert_eq!(
            failed,
            vec![GuardedEvent::End(Termination::Failed(
                CompletionError::connection("refused")
            ))]
        );

        let truncated = collect(with_timeout(
            events(vec![StreamEvent::Delta("x".to_string())]),
            Duration::from_secs(5),
            CancelScope::new(),
        ))
        .await;
        assert!(matches!(
            truncated.last(),
            Some(GuardedEvent::End(Termination::Failed(CompletionError::Protocol { .. })))
        ));
    }
}
