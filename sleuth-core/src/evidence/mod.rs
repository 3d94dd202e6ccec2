//! # Evidence
//!
//! Web search and single-page content extraction. Neither operation ever
//! fails from the caller's point of view: search degrades to a pluggable
//! fallback result set and scrape records its failure on the returned page.

pub mod scrape;
pub mod search;

pub use scrape::{PageScraper, extract_page};
pub use search::{BraveSearchClient, KeywordFallback, NoFallback, SearchFallback};

use crate::config::SearchConfig;
use crate::error::ConfigError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tracing::{info, warn};

/// One ranked web search hit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub link: String,
    pub snippet: String,
    /// 1-based rank in provider order.
    pub position: usize,
}

impl SearchResult {
    pub fn source_ref(&self) -> SourceRef {
        SourceRef {
            title: self.title.clone(),
            url: self.link.clone(),
        }
    }
}

/// Title and location of a source as reported back to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRef {
    pub title: String,
    pub url: String,
}

/// Extracted text of one fetched page.
///
/// A page with `error` set carries no usable content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrapedPage {
    pub url: String,
    pub title: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ScrapedPage {
    pub fn failed(url: &str, error: impl Into<String>) -> Self {
        Self {
            url: url.to_string(),
            title: "Error".to_string(),
            content: String::new(),
            error: Some(error.into()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    /// Whether this page may be placed in a prompt.
    pub fn is_usable(&self) -> bool {
        self.is_ok() && !self.content.is_empty()
    }

    /// Host name of the page, or the raw URL when it does not parse.
    pub fn host(&self) -> String {
        url::Url::parse(&self.url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_else(|| self.url.clone())
    }
}

/// Per-pipeline knobs for an evidence source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceProfile {
    /// Results requested from the search provider.
    pub result_count: usize,
    pub scrape_timeout: Duration,
    /// Character budget for extracted page content.
    pub content_limit: usize,
}

/// Search and scrape operations used by the research stages.
#[async_trait]
pub trait EvidenceSource: Send + Sync {
    /// Ranked results for `query`. Never fails.
    async fn search(&self, query: &str) -> Vec<SearchResult>;

    /// Fetch and extract one page. Never fails; problems land in `ScrapedPage::error`.
    async fn scrape(&self, url: &str) -> ScrapedPage;
}

/// Live web evidence: search provider with fallback, plus page scraping.
pub struct WebEvidenceSource {
    search: Option<BraveSearchClient>,
    api_key_env: String,
    fallback: Box<dyn SearchFallback>,
    scraper: PageScraper,
    result_count: usize,
}

impl WebEvidenceSource {
    /// Build a source from config. A missing search key is not an error: every
    /// search then goes straight to `fallback`.
    pub fn new(
        config: &SearchConfig,
        profile: SourceProfile,
        fallback: Box<dyn SearchFallback>,
    ) -> Result<Self, ConfigError> {
        let search = match std::env::var(&config.api_key_env) {
            Ok(key) if !key.trim().is_empty() => Some(BraveSearchClient::new(config, key)?),
            _ => None,
        };
        Ok(Self {
            search,
            api_key_env: config.api_key_env.clone(),
            fallback,
            scraper: PageScraper::new(profile.scrape_timeout, profile.content_limit)?,
            result_count: profile.result_count,
        })
    }

    /// Replace the search client, e.g. with one using an explicit key.
    pub fn with_search_client(mut self, client: BraveSearchClient) -> Self {
        self.search = Some(client);
        self
    }

    pub fn has_search_provider(&self) -> bool {
        self.search.is_some()
    }

    fn capped(&self, mut results: Vec<SearchResult>) -> Vec<SearchResult> {
        results.truncate(self.result_count);
        results
    }
}

#[async_trait]
impl EvidenceSource for WebEvidenceSource {
    async fn search(&self, query: &str) -> Vec<SearchResult> {
        let Some(client) = &self.search else {
            warn!(
                var = self.api_key_env.as_str(),
                "Search API key not configured, using fallback search method"
            );
            return self.capped(self.fallback.fallback(query));
        };

        // The provider may ignore `count`, so the cap is applied here too.
        match client.search(query, self.result_count).await {
            Ok(results) => self.capped(results),
            Err(e) => {
                warn!(error = %e, "Search API error");
                info!("Falling back to alternative search method");
                self.capped(self.fallback.fallback(query))
            }
        }
    }

    async fn scrape(&self, url: &str) -> ScrapedPage {
        self.scraper.scrape(url).await
    }
}

/// Fixed search results and pages. Unknown URLs scrape as failures.
///
/// Records every query and URL it is asked for.
#[derive(Debug, Default)]
pub struct CannedEvidence {
    results: Vec<SearchResult>,
    pages: HashMap<String, ScrapedPage>,
    searches: Mutex<Vec<String>>,
    scrapes: Mutex<Vec<String>>,
}

impl CannedEvidence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a search result; its position follows the ones already added.
    pub fn with_result(mut self, title: &str, link: &str, snippet: &str) -> Self {
        let position = self.results.len() + 1;
        self.results.push(SearchResult {
            title: title.to_string(),
            link: link.to_string(),
            snippet: snippet.to_string(),
            position,
        });
        self
    }

    pub fn with_page(mut self, url: &str, title: &str, content: &str) -> Self {
        self.pages.insert(
            url.to_string(),
            ScrapedPage {
                url: url.to_string(),
                title: title.to_string(),
                content: content.to_string(),
                error: None,
            },
        );
        self
    }

    pub fn searches(&self) -> Vec<String> {
        self.searches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn scrapes(&self) -> Vec<String> {
        self.scrapes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl EvidenceSource for CannedEvidence {
    async fn search(&self, query: &str) -> Vec<SearchResult> {
        self.searches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(query.to_string());
        self.results.clone()
    }

    async fn scrape(&self, url: &str) -> ScrapedPage {
        self.scrapes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(url.to_string());
        self.pages
            .get(url)
            .cloned()
            .unwrap_or_else(|| ScrapedPage::failed(url, "connection refused"))
    }
}
