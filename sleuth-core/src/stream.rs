//! Live progress streaming with a liveness watchdog.
//!
//! A [`ProgressStream`] runs one pipeline in a background task and relays its
//! events over an unbounded channel. A supervisor task watches three things:
//! the pipeline finishing, the consumer going away, and the gap since the last
//! event. Each event restarts the watchdog. When it fires, the pipeline is
//! cancelled through a [`CancellationToken`], one timeout error is sent and
//! the stream closes.
//!
//! After close every emission is dropped and logged at debug level.

use crate::error::{LlmError, ResearchError};
use crate::research::{ProgressEvent, ProgressSink, RunOutcome};
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{Notify, mpsc};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub const TIMEOUT_MESSAGE: &str = "Research process timed out";
pub const RESEARCH_FAILED: &str = "Research failed";
pub const FOLLOWUP_FAILED: &str = "Follow-up processing failed";

/// Receiving end of a progress stream. Ends after the terminal event.
pub type ProgressEvents = UnboundedReceiverStream<ProgressEvent>;

struct Shared {
    tx: Mutex<Option<mpsc::UnboundedSender<ProgressEvent>>>,
    heartbeat: Notify,
}

/// Sending half handed to the pipeline. Implements [`ProgressSink`].
#[derive(Clone)]
pub struct StreamEmitter {
    shared: Arc<Shared>,
}

impl StreamEmitter {
    fn new(tx: mpsc::UnboundedSender<ProgressEvent>) -> Self {
        Self {
            shared: Arc::new(Shared {
                tx: Mutex::new(Some(tx)),
                heartbeat: Notify::new(),
            }),
        }
    }

    /// Send `event` if the stream is still open. Returns whether it was sent.
    pub fn send(&self, event: ProgressEvent) -> bool {
        let guard = self.shared.tx.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(tx) = guard.as_ref() else {
            debug!(kind = event.kind(), "Dropping event for closed stream");
            return false;
        };
        let kind = event.kind();
        if tx.send(event).is_err() {
            debug!(kind, "Dropping event, receiver is gone");
            return false;
        }
        drop(guard);
        self.shared.heartbeat.notify_one();
        true
    }

    /// Close the stream, sending `terminal` first when given.
    ///
    /// Both happen under one lock, so no emission can land between the
    /// terminal event and the close.
    fn finish(&self, terminal: Option<ProgressEvent>) -> bool {
        let mut guard = self.shared.tx.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(tx) = guard.take() else {
            return false;
        };
        match terminal {
            Some(event) => {
                debug_assert!(event.is_terminal());
                tx.send(event).is_ok()
            }
            None => false,
        }
    }
}

impl ProgressSink for StreamEmitter {
    fn emit(&self, event: ProgressEvent) {
        self.send(event);
    }
}

enum Supervised<T> {
    Finished(Result<Option<Result<T, LlmError>>, tokio::task::JoinError>),
    TimedOut,
    Disconnected,
}

/// Runs pipelines under a liveness watchdog.
#[derive(Debug, Clone, Copy)]
pub struct ProgressStream {
    liveness: Duration,
}

impl ProgressStream {
    pub fn new(liveness: Duration) -> Self {
        Self { liveness }
    }

    /// Start `pipeline` in the background and return its event stream.
    ///
    /// The stream carries whatever the pipeline emits, then exactly one
    /// terminal event: `complete` with the pipeline's result, or `error` with
    /// `failure_message` on failure or the timeout message when the watchdog
    /// fires.
    pub fn start<F, Fut, T>(&self, failure_message: &'static str, pipeline: F) -> ProgressEvents
    where
        F: FnOnce(StreamEmitter) -> Fut,
        Fut: Future<Output = Result<T, LlmError>> + Send + 'static,
        T: Into<RunOutcome> + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let watch = tx.clone();
        let emitter = StreamEmitter::new(tx);
        let cancel = CancellationToken::new();

        let run = pipeline(emitter.clone());
        let token = cancel.clone();
        let mut task = tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => None,
                result = run => Some(result),
            }
        });

        let liveness = self.liveness;
        tokio::spawn(async move {
            let outcome = loop {
                tokio::select! {
                    biased;
                    joined = &mut task => break Supervised::Finished(joined),
                    _ = watch.closed() => break Supervised::Disconnected,
                    _ = emitter.shared.heartbeat.notified() => continue,
                    _ = tokio::time::sleep(liveness) => break Supervised::TimedOut,
                }
            };
            drop(watch);

            let terminal = match outcome {
                Supervised::Finished(Ok(Some(Ok(value)))) => {
                    Some(ProgressEvent::Complete(value.into()))
                }
                Supervised::Finished(Ok(Some(Err(err)))) => {
                    warn!(error = %err, "Streaming run failed");
                    Some(ProgressEvent::error(failure_message, err.to_string()))
                }
                Supervised::Finished(Ok(None)) => None,
                Supervised::Finished(Err(err)) => {
                    warn!(error = %err, "Streaming run aborted");
                    Some(ProgressEvent::error(failure_message, err.to_string()))
                }
                Supervised::TimedOut => {
                    let idle_secs = liveness.as_secs();
                    warn!(idle_secs, "Stream timeout reached, cancelling run");
                    cancel.cancel();
                    Some(ProgressEvent::error(
                        TIMEOUT_MESSAGE,
                        ResearchError::TimedOut { idle_secs }.to_string(),
                    ))
                }
                Supervised::Disconnected => {
                    info!("Stream consumer disconnected, cancelling run");
                    cancel.cancel();
                    None
                }
            };
            emitter.finish(terminal);
        });

        UnboundedReceiverStream::new(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::research::FollowUpAnswer;
    use futures::StreamExt;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn answer() -> FollowUpAnswer {
        FollowUpAnswer {
            question: "q".into(),
            answer: "a".into(),
            sources: vec![],
            context_used: vec!["c...".into()],
            method: "Context + LLM analysis".into(),
            timestamp: "2026-01-01T00:00:00.000Z".into(),
        }
    }

    fn kinds(events: &[ProgressEvent]) -> Vec<&'static str> {
        events.iter().map(ProgressEvent::kind).collect()
    }

    #[tokio::test]
    async fn test_complete_is_last() {
        let stream = ProgressStream::new(Duration::from_secs(60));
        let events: Vec<_> = stream
            .start(FOLLOWUP_FAILED, |sink| async move {
                sink.activity("one");
                sink.activity("two");
                Ok(answer())
            })
            .collect()
            .await;

        assert_eq!(kinds(&events), vec!["activity", "activity", "complete"]);
        assert!(matches!(
            &events[2],
            ProgressEvent::Complete(RunOutcome::FollowUp(a)) if a.answer == "a"
        ));
    }

    #[tokio::test]
    async fn test_failure_emits_single_error() {
        let stream = ProgressStream::new(Duration::from_secs(60));
        let events: Vec<_> = stream
            .start(RESEARCH_FAILED, |sink| async move {
                sink.activity("started");
                Err::<FollowUpAnswer, _>(LlmError::AuthFailed {
                    provider: "Anthropic".into(),
                })
            })
            .collect()
            .await;

        assert_eq!(kinds(&events), vec!["activity", "error"]);
        let ProgressEvent::Error(data) = &events[1] else {
            panic!("expected error frame");
        };
        assert_eq!(data.message, "Research failed");
        assert_eq!(data.error, "Authentication failed for provider Anthropic");
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_pipeline_times_out_and_is_cancelled() {
        let finished = Arc::new(AtomicBool::new(false));
        let flag = finished.clone();
        let stream = ProgressStream::new(Duration::from_secs(60));

        let events: Vec<_> = stream
            .start(RESEARCH_FAILED, move |sink| async move {
                sink.activity("analyzing");
                tokio::time::sleep(Duration::from_secs(600)).await;
                flag.store(true, Ordering::SeqCst);
                Ok(answer())
            })
            .collect()
            .await;

        assert_eq!(kinds(&events), vec!["activity", "error"]);
        let ProgressEvent::Error(data) = &events[1] else {
            panic!("expected error frame");
        };
        assert_eq!(data.message, "Research process timed out");
        assert_eq!(data.error, "No activity for 60 seconds");
        assert!(!finished.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_activity_resets_watchdog() {
        let stream = ProgressStream::new(Duration::from_secs(60));
        let events: Vec<_> = stream
            .start(RESEARCH_FAILED, |sink| async move {
                // 150 seconds in total, never more than 50 without an event.
                for i in 0..3 {
                    tokio::time::sleep(Duration::from_secs(50)).await;
                    sink.activity(&format!("step {i}"));
                }
                Ok(answer())
            })
            .collect()
            .await;

        assert_eq!(
            kinds(&events),
            vec!["activity", "activity", "activity", "complete"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_emits_after_close_are_dropped() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let emitter = StreamEmitter::new(tx);
        assert!(emitter.send(ProgressEvent::activity("before")));
        assert!(!emitter.finish(None));
        assert!(!emitter.send(ProgressEvent::activity("after")));
        assert!(rx.recv().await.is_some());
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_finish_sends_terminal_then_closes_every_clone() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let emitter = StreamEmitter::new(tx);
        let pipeline_side = emitter.clone();
        assert!(pipeline_side.send(ProgressEvent::activity("working")));

        assert!(emitter.finish(Some(ProgressEvent::error(
            TIMEOUT_MESSAGE,
            "No activity for 60 seconds"
        ))));
        assert!(!pipeline_side.send(ProgressEvent::activity("late")));
        assert!(!emitter.finish(Some(ProgressEvent::error(RESEARCH_FAILED, "again"))));

        let mut received = Vec::new();
        while let Some(event) = rx.recv().await {
            received.push(event);
        }
        assert_eq!(kinds(&received), vec!["activity", "error"]);
        assert!(received[1].is_terminal());
    }

    #[tokio::test(start_paused = true)]
    async fn test_consumer_disconnect_cancels_run() {
        let finished = Arc::new(AtomicBool::new(false));
        let flag = finished.clone();
        let stream = ProgressStream::new(Duration::from_secs(60));

        let mut events = stream.start(RESEARCH_FAILED, move |sink| async move {
            sink.activity("working");
            tokio::time::sleep(Duration::from_secs(30)).await;
            flag.store(true, Ordering::SeqCst);
            Ok(answer())
        });
        assert!(events.next().await.is_some());
        drop(events);

        tokio::time::sleep(Duration::from_secs(45)).await;
        assert!(!finished.load(Ordering::SeqCst));
    }
}
