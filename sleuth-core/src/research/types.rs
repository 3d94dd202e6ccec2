//! Data carried between research stages and returned to callers.
//!
//! Everything here serializes with camelCase field names, which is the shape
//! HTTP clients see.

use crate::evidence::SourceRef;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Default relevance cut-off for a research query.
pub const DEFAULT_RELEVANCE_THRESHOLD: u32 = 70;

/// One research request as submitted by a caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResearchQuery {
    #[serde(rename = "query")]
    pub text: String,
    #[serde(default = "default_threshold")]
    pub relevance_threshold: u32,
    #[serde(default = "default_true")]
    pub enable_formatting: bool,
}

fn default_threshold() -> u32 {
    DEFAULT_RELEVANCE_THRESHOLD
}

fn default_true() -> bool {
    true
}

impl ResearchQuery {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            relevance_threshold: DEFAULT_RELEVANCE_THRESHOLD,
            enable_formatting: true,
        }
    }

    pub fn with_threshold(mut self, threshold: u32) -> Self {
        self.relevance_threshold = threshold;
        self
    }

    pub fn with_formatting(mut self, enabled: bool) -> Self {
        self.enable_formatting = enabled;
        self
    }
}

/// Decomposition of a query into ordered sub-questions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryAnalysis {
    pub original_query: String,
    pub sub_questions: Vec<String>,
    pub analysis_method: String,
}

/// How a finding's answer was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EvidenceMethod {
    #[serde(rename = "web+scrape+LLM")]
    WebScrapeLlm,
    #[serde(rename = "LLM-only")]
    LlmOnly,
}

impl EvidenceMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            EvidenceMethod::WebScrapeLlm => "web+scrape+LLM",
            EvidenceMethod::LlmOnly => "LLM-only",
        }
    }
}

/// The answer to one sub-question plus where it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Finding {
    pub question: String,
    pub answer: String,
    pub sources: Vec<SourceRef>,
    /// Pages fetched without error while researching this question.
    pub scraped_sources: usize,
    pub method: EvidenceMethod,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelevanceScore {
    pub score: u32,
    pub reasoning: String,
}

/// A finding after relevance scoring against the original query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilteredFinding {
    #[serde(flatten)]
    pub finding: Finding,
    pub relevance_score: RelevanceScore,
    pub is_relevant: bool,
}

impl FilteredFinding {
    pub fn new(finding: Finding, relevance_score: RelevanceScore, threshold: u32) -> Self {
        let is_relevant = relevance_score.score >= threshold;
        Self {
            finding,
            relevance_score,
            is_relevant,
        }
    }
}

/// Presentation shape for the final synthesis.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresentationFormat {
    Table,
    Bullets,
    Mixed,
    #[default]
    Narrative,
}

impl PresentationFormat {
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "table" => Some(Self::Table),
            "bullets" => Some(Self::Bullets),
            "mixed" => Some(Self::Mixed),
            "narrative" => Some(Self::Narrative),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Table => "table",
            Self::Bullets => "bullets",
            Self::Mixed => "mixed",
            Self::Narrative => "narrative",
        }
    }
}

impl fmt::Display for PresentationFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormatMetadata {
    pub format: PresentationFormat,
    pub has_comparisons: bool,
    pub has_lists: bool,
    pub has_data: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl Confidence {
    /// Tier for an average relevance score: 80 and up is High, 60 and up Medium.
    pub fn from_average(average: u32) -> Self {
        match average {
            80.. => Confidence::High,
            60..80 => Confidence::Medium,
            _ => Confidence::Low,
        }
    }
}

/// Sources behind one relevant finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceBreakdown {
    pub question: String,
    pub source_count: usize,
    pub sources: Vec<SourceRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relevance_score: Option<u32>,
}

/// Why a finding was left out of the synthesis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExcludedFinding {
    pub question: String,
    pub relevance_score: u32,
    pub reasoning: String,
}

/// The synthesized answer and its bookkeeping.
///
/// Fields marked optional are only filled by the formatted path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SynthesisResult {
    pub summary: String,
    pub methodology: String,
    pub confidence: Confidence,
    pub total_sources: usize,
    pub total_scraped_sources: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relevant_findings: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filtered_out_findings: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub average_relevance_score: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format_metadata: Option<FormatMetadata>,
    pub source_breakdown: Vec<SourceBreakdown>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filtered_findings: Option<Vec<ExcludedFinding>>,
}

/// Full result of a research run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResearchReport {
    pub analysis: QueryAnalysis,
    pub findings: Vec<FilteredFinding>,
    pub synthesis: SynthesisResult,
    pub timestamp: String,
}

/// Answer to a question asked about earlier research.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FollowUpAnswer {
    pub question: String,
    pub answer: String,
    pub sources: Vec<SourceRef>,
    pub context_used: Vec<String>,
    pub method: String,
    pub timestamp: String,
}

/// Current time as an RFC 3339 UTC string with millisecond precision.
pub fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// First `max_chars` characters of `text`, with "..." appended when cut.
pub fn preview(text: &str, max_chars: usize) -> String {
    if text.chars().count() > max_chars {
        let head: String = text.chars().take(max_chars).collect();
        format!("{head}...")
    } else {
        text.to_string()
    }
}

/// First `max_chars` characters of `text`.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
