//! Query decomposition into research sub-questions.

use super::types::QueryAnalysis;
use crate::brain::ModelGateway;
use crate::error::LlmError;
use tracing::info;

const MAX_TOKENS: usize = 1000;
const TEMPERATURE: f32 = 0.3;
pub const ANALYSIS_METHOD: &str = "LLM decomposition";

/// Asks the model to break a query into 3 to 5 sub-questions.
pub struct QueryAnalyzer<'a> {
    gateway: &'a ModelGateway,
}

impl<'a> QueryAnalyzer<'a> {
    pub fn new(gateway: &'a ModelGateway) -> Self {
        Self { gateway }
    }

    /// One model call. Whatever non-blank lines come back are the
    /// sub-questions; their count is not checked.
    pub async fn analyze(&self, query: &str) -> Result<QueryAnalysis, LlmError> {
        let reply = self
            .gateway
            .generate(&analysis_prompt(query), MAX_TOKENS, Some(TEMPERATURE), "analyzeQuery")
            .await?;
        let sub_questions = split_sub_questions(&reply);
        info!(count = sub_questions.len(), "Generated sub-questions");

        Ok(QueryAnalysis {
            original_query: query.to_string(),
            sub_questions,
            analysis_method: ANALYSIS_METHOD.to_string(),
        })
    }
}

pub fn analysis_prompt(query: &str) -> String {
    format!(
        "You are a research analyst. Break down the user's query into 3-5 specific sub-questions that need to be researched to provide a comprehensive answer. Focus on questions that would benefit from current, real-time information.

Query to analyze: {query}

Please provide 3-5 specific sub-questions, each on a new line, that would help research this topic comprehensively."
    )
}

/// Non-blank lines of `reply`, trimmed, in order.
pub fn split_sub_questions(reply: &str) -> Vec<String> {
    reply
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brain::MockLlmProvider;
    use crate::providers::RateLimitConfig;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    #[test]
    fn test_split_discards_blank_lines() {
        let reply = "1. What is the spot price?\n\n   \n2. What moved it this week?\r\n3. What do analysts expect?\n";
        assert_eq!(
            split_sub_questions(reply),
            vec![
                "1. What is the spot price?",
                "2. What moved it this week?",
                "3. What do analysts expect?"
            ]
        );
    }

    #[test]
    fn test_split_accepts_any_count() {
        assert!(split_sub_questions("\n \n").is_empty());
        let many = (1..=8).map(|i| format!("Q{i}")).collect::<Vec<_>>().join("\n");
        assert_eq!(split_sub_questions(&many).len(), 8);
    }

    #[tokio::test]
    async fn test_analyze() {
        let mock = Arc::new(MockLlmProvider::with_response("First?\nSecond?"));
        let gateway = ModelGateway::new(mock.clone(), RateLimitConfig::unlimited());

        let analysis = QueryAnalyzer::new(&gateway)
            .analyze("current price of gold")
            .await
            .unwrap();
        assert_eq!(analysis.original_query, "current price of gold");
        assert_eq!(analysis.sub_questions, vec!["First?", "Second?"]);
        assert_eq!(analysis.analysis_method, "LLM decomposition");

        let request = &mock.requests()[0];
        assert_eq!(request.max_tokens, 1000);
        assert_eq!(request.temperature, Some(0.3));
        assert!(request.prompt_text().contains("Query to analyze: current price of gold"));
    }

    #[tokio::test]
    async fn test_analyze_propagates_model_failure() {
        let mock = MockLlmProvider::new();
        mock.queue_error(LlmError::Connection {
            message: "refused".into(),
        });
        let gateway = ModelGateway::new(Arc::new(mock), RateLimitConfig::unlimited());
        assert!(QueryAnalyzer::new(&gateway).analyze("q").await.is_err());
    }
}
