//! Per-question evidence gathering: search, scrape, then one grounded model call.

use super::progress::ProgressSink;
use super::types::{EvidenceMethod, Finding, preview, truncate_chars};
use crate::brain::ModelGateway;
use crate::config::ResearchConfig;
use crate::error::LlmError;
use crate::evidence::{EvidenceSource, ScrapedPage, SearchResult};
use tracing::{debug, info};

const MAX_TOKENS: usize = 1500;
const QUESTION_PREVIEW_CHARS: usize = 60;

/// Researches sub-questions one at a time, in order.
pub struct EvidenceGatherer<'a> {
    gateway: &'a ModelGateway,
    source: &'a dyn EvidenceSource,
    pages_per_question: usize,
    excerpt_limit: usize,
}

impl<'a> EvidenceGatherer<'a> {
    pub fn new(
        gateway: &'a ModelGateway,
        source: &'a dyn EvidenceSource,
        settings: &ResearchConfig,
    ) -> Self {
        Self {
            gateway,
            source,
            pages_per_question: settings.pages_per_question,
            excerpt_limit: settings.excerpt_limit,
        }
    }

    /// One finding per question, in question order. A model failure on any
    /// question aborts the whole gather.
    pub async fn gather(
        &self,
        questions: &[String],
        sink: &dyn ProgressSink,
    ) -> Result<Vec<Finding>, LlmError> {
        let mut findings = Vec::with_capacity(questions.len());
        for (index, question) in questions.iter().enumerate() {
            let finding = self
                .research_question(index + 1, questions.len(), question, sink)
                .await?;
            findings.push(finding);
        }
        Ok(findings)
    }

    async fn research_question(
        &self,
        number: usize,
        total: usize,
        question: &str,
        sink: &dyn ProgressSink,
    ) -> Result<Finding, LlmError> {
        info!(question_index = number, total, "Researching sub-question");
        sink.activity(&format!(
            "🌐 Searching web for question {number}/{total}: \"{}\"",
            preview(question, QUESTION_PREVIEW_CHARS)
        ));

        let results = self.source.search(question).await;
        sink.activity(&format!(
            "📄 Found {} web sources, scraping content...",
            results.len()
        ));

        let mut pages = Vec::new();
        for result in results.iter().take(self.pages_per_question) {
            let page = self.source.scrape(&result.link).await;
            if page.is_ok() {
                sink.activity(&format!("📄 Scraped content from {}", page.host()));
            } else {
                debug!(url = page.url.as_str(), "Skipping failed page");
            }
            pages.push(page);
        }

        sink.activity(&format!(
            "🤖 Analyzing findings for question {number}/{total}..."
        ));

        let web = web_context(&results);
        let scraped = scraped_context(&pages, self.excerpt_limit);
        let (prompt, method) = if web.is_empty() && scraped.is_empty() {
            (knowledge_prompt(question), EvidenceMethod::LlmOnly)
        } else {
            (
                grounded_prompt(question, &web, &scraped),
                EvidenceMethod::WebScrapeLlm,
            )
        };

        let stage = format!("gatherInformation-question-{number}");
        let answer = self.gateway.generate(&prompt, MAX_TOKENS, None, &stage).await?;

        sink.activity(&format!("✅ Completed research for question {number}/{total}"));

        Ok(Finding {
            question: question.to_string(),
            answer,
            sources: results.iter().map(SearchResult::source_ref).collect(),
            scraped_sources: pages.iter().filter(|p| p.is_ok()).count(),
            method,
        })
    }
}

/// Search snippets, one block per result.
pub fn web_context(results: &[SearchResult]) -> String {
    results
        .iter()
        .map(|r| format!("Title: {}\nSnippet: {}\nURL: {}", r.title, r.snippet, r.link))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Excerpts of the usable pages. Failed or empty pages are left out.
pub fn scraped_context(pages: &[ScrapedPage], excerpt_limit: usize) -> String {
    pages
        .iter()
        .filter(|p| p.is_usable())
        .map(|p| {
            format!(
                "Source: {}\nTitle: {}\nContent: {}...",
                p.url,
                p.title,
                truncate_chars(&p.content, excerpt_limit)
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn grounded_prompt(question: &str, web: &str, scraped: &str) -> String {
    format!(
        "Research Question: {question}

Web Search Results:
{web}

Scraped Content:
{scraped}

Based on the above web search results and scraped content, provide a comprehensive and accurate answer to the research question. Focus on the most current and relevant information. If the sources don't contain sufficient information, mention that and provide what context you can from your training data."
    )
}

pub fn knowledge_prompt(question: &str) -> String {
    format!(
        "Research Question: {question}

No current web search results are available. Please provide a comprehensive answer to this research question based on your training data. Focus on providing accurate, detailed information while noting that this information may not reflect the most recent developments."
    )
}
