//! Research pipeline: from a free-text query to a synthesized answer.
//!
//! Stages run strictly in sequence, each issuing its model calls through the
//! shared [`ModelGateway`](crate::brain::ModelGateway):
//! 1. **Analyze**: split the query into sub-questions
//! 2. **Gather**: search, scrape and answer each sub-question in order
//! 3. **Filter**: score every finding against the original query
//! 4. **Format**: choose a presentation shape for the relevant findings
//! 5. **Synthesize**: combine the relevant findings into one answer
//!
//! Follow-up questions reuse the same primitives against caller-supplied
//! context.

pub mod analyzer;
pub mod engine;
pub mod followup;
pub mod format;
pub mod gatherer;
pub mod progress;
pub mod relevance;
pub mod synthesis;
pub mod types;

pub use analyzer::QueryAnalyzer;
pub use engine::ResearchEngine;
pub use followup::{FollowUpResearcher, should_search_web};
pub use format::FormatSelector;
pub use gatherer::EvidenceGatherer;
pub use progress::{NoopSink, ProgressEvent, ProgressSink, RecordingSink, RunOutcome};
pub use relevance::RelevanceFilter;
pub use synthesis::Synthesizer;
pub use types::{
    Confidence, EvidenceMethod, FilteredFinding, Finding, FollowUpAnswer, FormatMetadata,
    PresentationFormat, QueryAnalysis, RelevanceScore, ResearchQuery, ResearchReport,
    SynthesisResult,
};

impl From<ResearchReport> for RunOutcome {
    fn from(report: ResearchReport) -> Self {
        RunOutcome::Research(Box::new(report))
    }
}

impl From<FollowUpAnswer> for RunOutcome {
    fn from(answer: FollowUpAnswer) -> Self {
        RunOutcome::FollowUp(answer)
    }
}
