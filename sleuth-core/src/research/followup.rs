//! Follow-up questions answered against earlier research context.

use super::progress::ProgressSink;
use super::types::{FollowUpAnswer, preview, timestamp, truncate_chars};
use crate::brain::ModelGateway;
use crate::config::FollowUpConfig;
use crate::error::LlmError;
use crate::evidence::{EvidenceSource, SearchResult, SourceRef};
use tracing::info;

const MAX_TOKENS: usize = 1500;
const TEMPERATURE: f32 = 0.3;
const QUESTION_PREVIEW_CHARS: usize = 50;
const CONTEXT_PREVIEW_CHARS: usize = 200;

pub const WEB_METHOD: &str = "Context + Web research + LLM analysis";
pub const CONTEXT_METHOD: &str = "Context + LLM analysis";

/// Words suggesting the question needs fresher data than the context holds.
const FRESHNESS_KEYWORDS: [&str; 13] = [
    "latest",
    "recent",
    "current",
    "new",
    "update",
    "today",
    "now",
    "price",
    "cost",
    "market",
    "stock",
    "news",
    "development",
];

pub fn should_search_web(question: &str) -> bool {
    let lower = question.to_lowercase();
    FRESHNESS_KEYWORDS.iter().any(|k| lower.contains(k))
}

pub struct FollowUpResearcher<'a> {
    gateway: &'a ModelGateway,
    source: &'a dyn EvidenceSource,
    pages: usize,
}

impl<'a> FollowUpResearcher<'a> {
    pub fn new(
        gateway: &'a ModelGateway,
        source: &'a dyn EvidenceSource,
        settings: &FollowUpConfig,
    ) -> Self {
        Self {
            gateway,
            source,
            pages: settings.pages,
        }
    }

    /// Answer `question` using `context`, adding web evidence when the
    /// question asks for something current.
    pub async fn answer(
        &self,
        question: &str,
        context: &str,
        sink: &dyn ProgressSink,
    ) -> Result<FollowUpAnswer, LlmError> {
        sink.activity(&format!(
            "🤔 Processing follow-up question: \"{}\"",
            preview(question, QUESTION_PREVIEW_CHARS)
        ));

        let mut web = String::new();
        let mut sources: Vec<SourceRef> = Vec::new();
        if should_search_web(question) {
            sink.activity("🌐 Searching for additional information...");
            let results = self.source.search(question).await;
            if !results.is_empty() {
                sink.activity(&format!(
                    "📄 Found {} additional sources, analyzing...",
                    results.len()
                ));
                web = self.web_context(&results).await;
                sources = results.iter().map(SearchResult::source_ref).collect();
            }
        }

        sink.activity("🤖 Generating contextual response...");
        let answer = self
            .gateway
            .generate(
                &followup_prompt(question, context, &web),
                MAX_TOKENS,
                Some(TEMPERATURE),
                "processFollowupQuestion",
            )
            .await?;
        sink.activity("✅ Follow-up response generated successfully!");
        info!(web_sources = sources.len(), "Follow-up answered");

        Ok(FollowUpAnswer {
            question: question.to_string(),
            answer,
            sources,
            context_used: vec![format!(
                "{}...",
                truncate_chars(context, CONTEXT_PREVIEW_CHARS)
            )],
            method: if web.is_empty() {
                CONTEXT_METHOD
            } else {
                WEB_METHOD
            }
            .to_string(),
            timestamp: timestamp(),
        })
    }

    async fn web_context(&self, results: &[SearchResult]) -> String {
        let mut blocks = Vec::new();
        for result in results.iter().take(self.pages) {
            let page = self.source.scrape(&result.link).await;
            if page.is_usable() {
                blocks.push(format!("Source: {}\nContent: {}", page.url, page.content));
            }
        }
        blocks.join("\n\n")
    }
}

pub fn followup_prompt(question: &str, context: &str, web: &str) -> String {
    let web_block = if web.is_empty() {
        String::new()
    } else {
        format!("ADDITIONAL WEB RESEARCH:\n{web}")
    };
    format!(
        "You are a research assistant providing a follow-up answer based on previous research context and the user's specific question.

PREVIOUS RESEARCH CONTEXT:
{context}

{web_block}

USER'S FOLLOW-UP QUESTION: {question}

Please provide a comprehensive, contextual answer that:
1. References relevant information from the previous research
2. Directly addresses the specific follow-up question
3. Incorporates any additional web research if available
4. Maintains continuity with the conversation thread
5. Provides specific, actionable insights

Focus on being precise and helpful while building upon the established research context."
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brain::MockLlmProvider;
    use crate::evidence::CannedEvidence;
    use crate::providers::RateLimitConfig;
    use crate::research::progress::{NoopSink, RecordingSink};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    const CONTEXT: &str = "Gold traded near $2,400 an ounce after central bank buying.";

    #[test]
    fn test_should_search_web() {
        assert!(should_search_web("What is the LATEST forecast?"));
        assert!(should_search_web("How much does it cost?"));
        assert!(!should_search_web("Why did central banks buy gold?"));
        // Substring match, as with "renewal" containing "new".
        assert!(should_search_web("Explain the renewal terms"));
    }

    #[tokio::test]
    async fn test_context_only_answer() {
        let mock = Arc::new(MockLlmProvider::with_response("Because of reserves."));
        let gateway = ModelGateway::new(mock.clone(), RateLimitConfig::unlimited());
        let source = CannedEvidence::new().with_result("x", "https://x.example", "");
        let researcher =
            FollowUpResearcher::new(&gateway, &source, &FollowUpConfig::default());
        let sink = RecordingSink::new();

        let answer = researcher
            .answer("Why did central banks buy gold?", CONTEXT, &sink)
            .await
            .unwrap();

        assert_eq!(answer.method, CONTEXT_METHOD);
        assert!(answer.sources.is_empty());
        assert_eq!(answer.context_used, vec![format!("{CONTEXT}...")]);
        assert!(source.searches().is_empty());
        assert_eq!(
            sink.activity_messages(),
            vec![
                "🤔 Processing follow-up question: \"Why did central banks buy gold?\"",
                "🤖 Generating contextual response...",
                "✅ Follow-up response generated successfully!",
            ]
        );

        let request = &mock.requests()[0];
        assert_eq!(request.max_tokens, 1500);
        assert_eq!(request.temperature, Some(0.3));
        assert!(!request.prompt_text().contains("ADDITIONAL WEB RESEARCH"));
        assert!(request.prompt_text().contains(&format!("PREVIOUS RESEARCH CONTEXT:\n{CONTEXT}")));
    }

    #[tokio::test]
    async fn test_web_research_answer() {
        let mock = Arc::new(MockLlmProvider::with_response("Now $2,450."));
        let gateway = ModelGateway::new(mock.clone(), RateLimitConfig::unlimited());
        let source = CannedEvidence::new()
            .with_result("Kitco", "https://www.kitco.com", "Live")
            .with_result("Down", "https://down.example", "")
            .with_result("Third", "https://third.example", "")
            .with_page("https://www.kitco.com", "Kitco", "Spot gold $2,450")
            .with_page("https://third.example", "Third", "never scraped");
        let researcher =
            FollowUpResearcher::new(&gateway, &source, &FollowUpConfig::default());
        let sink = RecordingSink::new();

        let answer = researcher
            .answer("What is the price today?", CONTEXT, &sink)
            .await
            .unwrap();

        assert_eq!(answer.method, WEB_METHOD);
        assert_eq!(answer.sources.len(), 3);
        assert_eq!(source.scrapes(), vec!["https://www.kitco.com", "https://down.example"]);
        let prompt = mock.requests()[0].prompt_text().to_string();
        assert!(prompt.contains(
            "ADDITIONAL WEB RESEARCH:\nSource: https://www.kitco.com\nContent: Spot gold $2,450\n\nUSER'S FOLLOW-UP QUESTION: What is the price today?"
        ));
        assert!(!prompt.contains("never scraped"));
        assert!(sink
            .activity_messages()
            .contains(&"📄 Found 3 additional sources, analyzing...".to_string()));
    }

    #[tokio::test]
    async fn test_web_search_with_no_results() {
        let mock = Arc::new(MockLlmProvider::with_response("ok"));
        let gateway = ModelGateway::new(mock, RateLimitConfig::unlimited());
        let source = CannedEvidence::new();
        let researcher =
            FollowUpResearcher::new(&gateway, &source, &FollowUpConfig::default());

        let answer = researcher
            .answer("latest news?", CONTEXT, &NoopSink)
            .await
            .unwrap();
        assert_eq!(answer.method, CONTEXT_METHOD);
        assert_eq!(source.searches(), vec!["latest news?"]);
    }

    #[tokio::test]
    async fn test_long_context_is_cut_in_report_only() {
        let mock = Arc::new(MockLlmProvider::with_response("ok"));
        let gateway = ModelGateway::new(mock.clone(), RateLimitConfig::unlimited());
        let source = CannedEvidence::new();
        let researcher =
            FollowUpResearcher::new(&gateway, &source, &FollowUpConfig::default());
        let context = "c".repeat(500);

        let answer = researcher.answer("why?", &context, &NoopSink).await.unwrap();
        assert_eq!(answer.context_used, vec![format!("{}...", "c".repeat(200))]);
        assert!(mock.requests()[0].prompt_text().contains(&context));
    }
}
