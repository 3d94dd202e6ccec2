//! Relevance scoring of findings against the original query.

use super::types::{FilteredFinding, Finding, RelevanceScore};
use crate::brain::ModelGateway;
use crate::error::LlmError;
use regex::Regex;
use std::sync::LazyLock;
use tracing::{debug, info};

const MAX_TOKENS: usize = 300;
const TEMPERATURE: f32 = 0.1;
pub const DEFAULT_SCORE: u32 = 50;
pub const DEFAULT_REASONING: &str = "Unable to determine relevance";

static SCORE: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"Score:\s*(\d+)").ok());
static REASONING: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"Reasoning:\s*([\s\S]+)").ok());

pub struct RelevanceFilter<'a> {
    gateway: &'a ModelGateway,
}

impl<'a> RelevanceFilter<'a> {
    pub fn new(gateway: &'a ModelGateway) -> Self {
        Self { gateway }
    }

    /// Score one finding. Malformed replies fall back to the defaults; only a
    /// failed model call is an error.
    pub async fn score(
        &self,
        finding: &Finding,
        original_query: &str,
    ) -> Result<RelevanceScore, LlmError> {
        let reply = self
            .gateway
            .generate(
                &relevance_prompt(finding, original_query),
                MAX_TOKENS,
                Some(TEMPERATURE),
                "scoreRelevance",
            )
            .await?;
        Ok(parse_relevance(&reply))
    }

    /// Score every finding in order and mark those at or above `threshold`.
    pub async fn filter(
        &self,
        findings: Vec<Finding>,
        original_query: &str,
        threshold: u32,
    ) -> Result<Vec<FilteredFinding>, LlmError> {
        let mut filtered = Vec::with_capacity(findings.len());
        for finding in findings {
            let score = self.score(&finding, original_query).await?;
            debug!(score = score.score, threshold, "Scored finding");
            filtered.push(FilteredFinding::new(finding, score, threshold));
        }
        let relevant = filtered.iter().filter(|f| f.is_relevant).count();
        info!(
            relevant,
            filtered_out = filtered.len() - relevant,
            "Relevance filtering done"
        );
        Ok(filtered)
    }
}

pub fn relevance_prompt(finding: &Finding, original_query: &str) -> String {
    format!(
        "You are a relevance evaluator. Score how relevant this research finding is to the original query on a scale of 0-100.

Original Query: \"{original_query}\"

Research Finding:
Question: {}
Answer: {}

Provide a relevance score (0-100) and brief reasoning. Focus on:
- Direct relevance to the original query
- Quality and specificity of information
- Usefulness for answering the original question

Respond in this exact format:
Score: [number]
Reasoning: [brief explanation]",
        finding.question, finding.answer
    )
}

/// Decode a `Score:` / `Reasoning:` reply.
///
/// A missing or unreadable score becomes 50 and missing reasoning becomes a
/// fixed placeholder. Scores are taken as written, without clamping.
pub fn parse_relevance(reply: &str) -> RelevanceScore {
    let score = SCORE
        .as_ref()
        .and_then(|re| re.captures(reply))
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<u32>().ok())
        .unwrap_or(DEFAULT_SCORE);
    let reasoning = REASONING
        .as_ref()
        .and_then(|re| re.captures(reply))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_else(|| DEFAULT_REASONING.to_string());
    RelevanceScore { score, reasoning }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brain::MockLlmProvider;
    use crate::providers::RateLimitConfig;
    use crate::research::types::EvidenceMethod;
    use proptest::prelude::*;
    use std::sync::Arc;

    fn finding(question: &str) -> Finding {
        Finding {
            question: question.into(),
            answer: "answer".into(),
            sources: vec![],
            scraped_sources: 0,
            method: EvidenceMethod::LlmOnly,
        }
    }

    #[test]
    fn test_parse_well_formed() {
        let score = parse_relevance("Score: 85\nReasoning: Directly answers the price question.\n");
        assert_eq!(score.score, 85);
        assert_eq!(score.reasoning, "Directly answers the price question.");
    }

    #[test]
    fn test_parse_multiline_reasoning() {
        let score = parse_relevance("Score:92\nReasoning:\n  Line one.\n  Line two.  ");
        assert_eq!(score.score, 92);
        assert_eq!(score.reasoning, "Line one.\n  Line two.");
    }

    #[test]
    fn test_parse_defaults() {
        let score = parse_relevance("I think this is quite relevant.");
        assert_eq!(score.score, 50);
        assert_eq!(score.reasoning, "Unable to determine relevance");

        let score = parse_relevance("Score: high\nReasoning: good");
        assert_eq!(score.score, 50);
        assert_eq!(score.reasoning, "good");
    }

    #[test]
    fn test_parse_does_not_clamp() {
        assert_eq!(parse_relevance("Score: 150").score, 150);
        assert_eq!(parse_relevance("Score: 99999999999999999999").score, 50);
    }

    #[tokio::test]
    async fn test_filter_preserves_order_and_marks_relevance() {
        let mock = Arc::new(MockLlmProvider::new());
        mock.queue_response("Score: 85\nReasoning: strong");
        mock.queue_response("Score: 60\nReasoning: weak");
        mock.queue_response("garbage");
        let gateway = ModelGateway::new(mock.clone(), RateLimitConfig::unlimited());

        let filtered = RelevanceFilter::new(&gateway)
            .filter(
                vec![finding("a"), finding("b"), finding("c")],
                "current price of gold",
                70,
            )
            .await
            .unwrap();

        let summary: Vec<(&str, u32, bool)> = filtered
            .iter()
            .map(|f| (f.finding.question.as_str(), f.relevance_score.score, f.is_relevant))
            .collect();
        assert_eq!(summary, vec![("a", 85, true), ("b", 60, false), ("c", 50, false)]);

        let request = &mock.requests()[0];
        assert_eq!(request.max_tokens, 300);
        assert_eq!(request.temperature, Some(0.1));
        assert!(request.prompt_text().contains("Original Query: \"current price of gold\""));
        assert!(request.prompt_text().contains("Question: a\nAnswer: answer"));
    }

    #[tokio::test]
    async fn test_filter_propagates_model_failure() {
        let mock = MockLlmProvider::new();
        mock.queue_error(LlmError::AuthFailed {
            provider: "Anthropic".into(),
        });
        let gateway = ModelGateway::new(Arc::new(mock), RateLimitConfig::unlimited());
        let err = RelevanceFilter::new(&gateway)
            .filter(vec![finding("a")], "q", 70)
            .await
            .unwrap_err();
        assert!(err.is_auth());
    }

    proptest! {
        #[test]
        fn prop_is_relevant_matches_threshold(score in 0u32..=100, threshold in 0u32..=100) {
            let reply = format!("Score: {score}\nReasoning: r");
            let parsed = parse_relevance(&reply);
            prop_assert_eq!(parsed.score, score);
            let filtered = FilteredFinding::new(finding("q"), parsed, threshold);
            prop_assert_eq!(filtered.is_relevant, score >= threshold);
        }

        #[test]
        fn prop_parse_never_panics(reply in ".*") {
            let parsed = parse_relevance(&reply);
            prop_assert!(!parsed.reasoning.is_empty() || reply.contains("Reasoning:"));
        }
    }
}
