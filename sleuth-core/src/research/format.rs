//! Presentation format detection over the relevant findings.

use super::types::{FilteredFinding, FormatMetadata, PresentationFormat, truncate_chars};
use crate::brain::ModelGateway;
use crate::error::LlmError;
use regex::Regex;
use std::sync::LazyLock;
use tracing::info;

const MAX_TOKENS: usize = 200;
const TEMPERATURE: f32 = 0.1;
const SAMPLE_FINDINGS: usize = 2;
const SAMPLE_ANSWER_CHARS: usize = 200;

static FORMAT: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)Format:\s*(table|bullets|mixed|narrative)").ok());
static HAS_COMPARISONS: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)HasComparisons:\s*(true|false)").ok());
static HAS_LISTS: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)HasLists:\s*(true|false)").ok());
static HAS_DATA: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)HasData:\s*(true|false)").ok());

pub struct FormatSelector<'a> {
    gateway: &'a ModelGateway,
}

impl<'a> FormatSelector<'a> {
    pub fn new(gateway: &'a ModelGateway) -> Self {
        Self { gateway }
    }

    /// Pick a presentation shape for `relevant`. Never fails on the reply
    /// itself; an unreadable reply yields the narrative default.
    pub async fn detect(
        &self,
        relevant: &[&FilteredFinding],
        original_query: &str,
    ) -> Result<FormatMetadata, LlmError> {
        let reply = self
            .gateway
            .generate(
                &format_prompt(relevant, original_query),
                MAX_TOKENS,
                Some(TEMPERATURE),
                "detectOptimalFormat",
            )
            .await?;
        let metadata = parse_format(&reply);
        info!(format = %metadata.format, "Detected presentation format");
        Ok(metadata)
    }
}

pub fn format_prompt(relevant: &[&FilteredFinding], original_query: &str) -> String {
    let sample = relevant
        .iter()
        .take(SAMPLE_FINDINGS)
        .map(|f| {
            format!(
                "Q: {}\nA: {}...",
                f.finding.question,
                truncate_chars(&f.finding.answer, SAMPLE_ANSWER_CHARS)
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "Analyze these research findings and determine the optimal presentation format.

Original Query: \"{original_query}\"

Number of findings: {}
Sample findings: {sample}

Determine the best format based on content type:
- \"table\" if findings contain comparisons, data, or structured information that would benefit from tabular presentation
- \"bullets\" if findings are best presented as lists or key points
- \"mixed\" if some findings need tables and others need bullets
- \"narrative\" if findings are best presented as flowing text

Also identify:
- hasComparisons: true if content compares different items/options
- hasLists: true if content contains enumerated items or lists
- hasData: true if content contains numbers, statistics, or data points

Respond in this exact format:
Format: [table|bullets|mixed|narrative]
HasComparisons: [true|false]
HasLists: [true|false]
HasData: [true|false]",
        relevant.len()
    )
}

fn capture<'t>(re: &LazyLock<Option<Regex>>, text: &'t str) -> Option<&'t str> {
    re.as_ref()
        .and_then(|re| re.captures(text))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

fn flag(re: &LazyLock<Option<Regex>>, text: &str) -> bool {
    capture(re, text).is_some_and(|v| v.eq_ignore_ascii_case("true"))
}

/// Decode the four-line format reply. Each field is read on its own.
pub fn parse_format(reply: &str) -> FormatMetadata {
    FormatMetadata {
        format: capture(&FORMAT, reply)
            .and_then(PresentationFormat::parse)
            .unwrap_or_default(),
        has_comparisons: flag(&HAS_COMPARISONS, reply),
        has_lists: flag(&HAS_LISTS, reply),
        has_data: flag(&HAS_DATA, reply),
    }
}
