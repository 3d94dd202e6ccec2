//! Final synthesis of the relevant findings into one answer.
//!
//! Two paths exist. The formatted path reports relevance statistics and
//! derives confidence from the average score. The plain path is used when
//! formatting is off or nothing passed the relevance filter; it always
//! reports High confidence and carries no format metadata.

use super::types::{
    Confidence, ExcludedFinding, FilteredFinding, FormatMetadata, PresentationFormat,
    SourceBreakdown, SynthesisResult,
};
use crate::brain::ModelGateway;
use crate::error::LlmError;
use tracing::info;

const ENHANCED_MAX_TOKENS: usize = 2500;
const PLAIN_MAX_TOKENS: usize = 2000;
const TEMPERATURE: f32 = 0.2;

pub const ENHANCED_METHODOLOGY: &str =
    "Enhanced LLM analysis with relevance filtering and structured formatting";
pub const PLAIN_METHODOLOGY: &str = "LLM analysis with web search and content scraping";

pub struct Synthesizer<'a> {
    gateway: &'a ModelGateway,
}

impl<'a> Synthesizer<'a> {
    pub fn new(gateway: &'a ModelGateway) -> Self {
        Self { gateway }
    }

    /// Formatted synthesis over the relevant part of `findings`; the rest are
    /// listed in `filtered_findings`.
    pub async fn synthesize_formatted(
        &self,
        original_query: &str,
        findings: &[FilteredFinding],
        format: FormatMetadata,
    ) -> Result<SynthesisResult, LlmError> {
        let (relevant, excluded): (Vec<&FilteredFinding>, Vec<&FilteredFinding>) =
            findings.iter().partition(|f| f.is_relevant);

        let summary = self
            .gateway
            .generate(
                &enhanced_prompt(original_query, &relevant, &format),
                ENHANCED_MAX_TOKENS,
                Some(TEMPERATURE),
                "enhancedSynthesizeFindings",
            )
            .await?;

        let average = average_score(&relevant);
        let confidence = Confidence::from_average(average);
        info!(
            relevant = relevant.len(),
            average,
            ?confidence,
            "Formatted synthesis complete"
        );

        Ok(SynthesisResult {
            summary,
            methodology: ENHANCED_METHODOLOGY.to_string(),
            confidence,
            total_sources: relevant.iter().map(|f| f.finding.sources.len()).sum(),
            total_scraped_sources: relevant.iter().map(|f| f.finding.scraped_sources).sum(),
            relevant_findings: Some(relevant.len()),
            filtered_out_findings: Some(excluded.len()),
            average_relevance_score: Some(average),
            format_metadata: Some(format),
            source_breakdown: relevant
                .iter()
                .map(|f| SourceBreakdown {
                    question: f.finding.question.clone(),
                    source_count: f.finding.sources.len(),
                    sources: f.finding.sources.clone(),
                    relevance_score: Some(f.relevance_score.score),
                })
                .collect(),
            filtered_findings: Some(
                excluded
                    .iter()
                    .map(|f| ExcludedFinding {
                        question: f.finding.question.clone(),
                        relevance_score: f.relevance_score.score,
                        reasoning: f.relevance_score.reasoning.clone(),
                    })
                    .collect(),
            ),
        })
    }

    /// Source-attributed synthesis over `relevant` with no format guidance.
    pub async fn synthesize_plain(
        &self,
        original_query: &str,
        relevant: &[&FilteredFinding],
    ) -> Result<SynthesisResult, LlmError> {
        let summary = self
            .gateway
            .generate(
                &plain_prompt(original_query, relevant),
                PLAIN_MAX_TOKENS,
                Some(TEMPERATURE),
                "synthesizeFindings",
            )
            .await?;
        info!(findings = relevant.len(), "Plain synthesis complete");

        Ok(SynthesisResult {
            summary,
            methodology: PLAIN_METHODOLOGY.to_string(),
            confidence: Confidence::High,
            total_sources: relevant.iter().map(|f| f.finding.sources.len()).sum(),
            total_scraped_sources: relevant.iter().map(|f| f.finding.scraped_sources).sum(),
            relevant_findings: None,
            filtered_out_findings: None,
            average_relevance_score: None,
            format_metadata: None,
            source_breakdown: relevant
                .iter()
                .map(|f| SourceBreakdown {
                    question: f.finding.question.clone(),
                    source_count: f.finding.sources.len(),
                    sources: f.finding.sources.clone(),
                    relevance_score: None,
                })
                .collect(),
            filtered_findings: None,
        })
    }
}

/// Mean score of `relevant`, rounded half away from zero; 0 when empty.
pub fn average_score(relevant: &[&FilteredFinding]) -> u32 {
    if relevant.is_empty() {
        return 0;
    }
    let total: u64 = relevant
        .iter()
        .map(|f| u64::from(f.relevance_score.score))
        .sum();
    (total as f64 / relevant.len() as f64).round() as u32
}

fn format_instructions(format: PresentationFormat) -> &'static str {
    match format {
        PresentationFormat::Table => {
            "Present the synthesis using markdown tables where appropriate. Use proper markdown table syntax with clear headers and organized data. Include comparison tables if the content involves comparing different options, features, or data points."
        }
        PresentationFormat::Bullets => {
            "Present the synthesis using markdown bullet points and numbered lists. Organize information hierarchically with main points and sub-points. Use clear, concise bullet points for easy scanning."
        }
        PresentationFormat::Mixed => {
            "Use a combination of markdown tables and bullet points as appropriate. Use tables for comparative data and structured information, and bullet points for lists and key takeaways. Choose the format that best presents each piece of information."
        }
        PresentationFormat::Narrative => {
            "Present the synthesis as well-structured markdown text with clear paragraphs and logical flow. Use markdown headings (##, ###) and subheadings to organize the content."
        }
    }
}

pub fn enhanced_prompt(
    original_query: &str,
    relevant: &[&FilteredFinding],
    format: &FormatMetadata,
) -> String {
    let combined = relevant
        .iter()
        .map(|f| {
            format!(
                "Q: {}\nA: {}\nSources: {}\nRelevance: {}/100",
                f.finding.question,
                f.finding.answer,
                source_titles(f),
                f.relevance_score.score
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    let comparisons = if format.has_comparisons {
        "Include comparison tables using markdown table syntax where relevant"
    } else {
        ""
    };
    let lists = if format.has_lists {
        "Use markdown lists to organize information clearly"
    } else {
        ""
    };
    let data = if format.has_data {
        "Present data and statistics in markdown tables or formatted lists"
    } else {
        ""
    };

    format!(
        "You are a research synthesizer with enhanced markdown formatting capabilities. Combine the research findings into a comprehensive, well-structured markdown answer to the original query.

Original Query: {original_query}

Relevant Research Findings ({count} findings):
{combined}

MARKDOWN FORMATTING INSTRUCTIONS:
{instructions}

Additional markdown formatting guidelines:
- Use proper markdown syntax throughout (##, ###, -, *, |, etc.)
- Use markdown headings (## Main Topic, ### Subtopic) to structure content
- Include source attribution using markdown links where possible
- Use **bold** and *italic* text for emphasis
- Create markdown tables with proper | syntax for tabular data
- Use markdown lists (- or 1.) for organized information
- Ensure the response directly answers the original query
- Make the content easy to scan and digest with proper markdown structure
- {comparisons}
- {lists}
- {data}

IMPORTANT: Return ONLY properly formatted markdown content. Do not include any explanatory text about the formatting - just the formatted research synthesis.

Please provide a comprehensive synthesis with enhanced markdown formatting that directly answers the original query.",
        count = relevant.len(),
        instructions = format_instructions(format.format),
    )
}

pub fn plain_prompt(original_query: &str, relevant: &[&FilteredFinding]) -> String {
    let combined = relevant
        .iter()
        .map(|f| {
            format!(
                "Q: {}\nA: {}\nSources: {}",
                f.finding.question,
                f.finding.answer,
                source_titles(f)
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "You are a research synthesizer. Combine the research findings into a comprehensive, well-structured answer to the original query. Include source attribution and ensure the response is accurate and up-to-date based on the provided research.

Original Query: {original_query}

Research Findings:
{combined}

Please provide a comprehensive synthesis with proper source attribution that directly answers the original query."
    )
}

fn source_titles(finding: &FilteredFinding) -> String {
    finding
        .finding
        .sources
        .iter()
        .map(|s| s.title.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}
