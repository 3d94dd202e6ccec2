//! # Sleuth Core
//!
//! Core library for the Sleuth research service.
//! Provides the research pipeline, the shared model gateway (brain), web
//! evidence gathering, progress streaming, the HTTP gateway, configuration,
//! and fundamental types.

pub mod brain;
pub mod config;
pub mod error;
pub mod evidence;
pub mod gateway;
pub mod providers;
pub mod research;
pub mod stream;
pub mod types;

// Re-export commonly used types at the crate root.
pub use brain::{LlmProvider, MockLlmProvider, ModelGateway};
pub use config::{SleuthConfig, load_config};
pub use error::{ConfigError, LlmError, ResearchError, Result, SleuthError};
pub use evidence::{EvidenceSource, ScrapedPage, SearchResult, SourceRef};
pub use research::{
    FollowUpAnswer, ProgressEvent, ProgressSink, ResearchEngine, ResearchQuery, ResearchReport,
};
pub use stream::{ProgressEvents, ProgressStream};
pub use types::{CompletionRequest, CompletionResponse, Message, Role, TokenUsage};
