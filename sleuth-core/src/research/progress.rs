//! Progress events emitted while a research run is underway.

use super::types::{FollowUpAnswer, QueryAnalysis, ResearchReport, timestamp};
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, PoisonError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityData {
    pub message: String,
    pub timestamp: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorData {
    pub message: String,
    pub error: String,
}

/// Final payload of a run; matches the synchronous response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RunOutcome {
    Research(Box<ResearchReport>),
    FollowUp(FollowUpAnswer),
}

/// One frame of the progress protocol, serialized as `{"type":..,"data":..}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ProgressEvent {
    Activity(ActivityData),
    Analysis(QueryAnalysis),
    Complete(RunOutcome),
    Error(ErrorData),
}

impl ProgressEvent {
    pub fn activity(message: impl Into<String>) -> Self {
        ProgressEvent::Activity(ActivityData {
            message: message.into(),
            timestamp: timestamp(),
        })
    }

    pub fn error(message: impl Into<String>, error: impl Into<String>) -> Self {
        ProgressEvent::Error(ErrorData {
            message: message.into(),
            error: error.into(),
        })
    }

    /// Wire name of the event type.
    pub fn kind(&self) -> &'static str {
        match self {
            ProgressEvent::Activity(_) => "activity",
            ProgressEvent::Analysis(_) => "analysis",
            ProgressEvent::Complete(_) => "complete",
            ProgressEvent::Error(_) => "error",
        }
    }

    /// Whether the stream ends after this event.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ProgressEvent::Complete(_) | ProgressEvent::Error(_))
    }
}

/// Receiver of progress events from the research stages.
pub trait ProgressSink: Send + Sync {
    fn emit(&self, event: ProgressEvent);

    fn activity(&self, message: &str) {
        self.emit(ProgressEvent::activity(message));
    }
}

/// Discards every event. Used by the synchronous entry points.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl ProgressSink for NoopSink {
    fn emit(&self, _event: ProgressEvent) {}
}

/// Keeps every event in memory.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<ProgressEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Messages of the activity events, in order.
    pub fn activity_messages(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                ProgressEvent::Activity(data) => Some(data.message),
                _ => None,
            })
            .collect()
    }
}

impl ProgressSink for RecordingSink {
    fn emit(&self, event: ProgressEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_activity_frame_shape() {
        let event = ProgressEvent::activity("🔍 Analyzing your query...");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "activity");
        assert_eq!(json["data"]["message"], "🔍 Analyzing your query...");
        assert!(json["data"]["timestamp"].is_string());
        assert!(!event.is_terminal());
    }

    #[test]
    fn test_error_frame_shape() {
        let event = ProgressEvent::error("Research process timed out", "No activity for 60 seconds");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "type": "error",
                "data": {
                    "message": "Research process timed out",
                    "error": "No activity for 60 seconds"
                }
            })
        );
        assert!(event.is_terminal());
        assert_eq!(event.kind(), "error");
    }

    #[test]
    fn test_analysis_frame_shape() {
        let event = ProgressEvent::Analysis(QueryAnalysis {
            original_query: "q".into(),
            sub_questions: vec!["a".into(), "b".into()],
            analysis_method: "LLM decomposition".into(),
        });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "analysis");
        assert_eq!(json["data"]["subQuestions"][1], "b");
        assert_eq!(json["data"]["originalQuery"], "q");
    }

    #[test]
    fn test_recording_sink() {
        let sink = RecordingSink::new();
        sink.activity("one");
        sink.emit(ProgressEvent::error("x", "y"));
        sink.activity("two");
        assert_eq!(sink.events().len(), 3);
        assert_eq!(sink.activity_messages(), vec!["one", "two"]);
    }
}
