//! Web search: the Brave Search API client and pluggable fallbacks.

use super::SearchResult;
use crate::config::{FallbackConfig, SearchConfig};
use crate::error::ConfigError;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};

/// Static results used when the search provider cannot answer.
pub trait SearchFallback: Send + Sync {
    fn fallback(&self, query: &str) -> Vec<SearchResult>;
}

/// Never returns anything; the model then answers from its own knowledge.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoFallback;

impl SearchFallback for NoFallback {
    fn fallback(&self, _query: &str) -> Vec<SearchResult> {
        info!("No web search available for this query");
        Vec::new()
    }
}

/// Returns a fixed URL list when the query mentions one of the keywords.
#[derive(Debug, Clone)]
pub struct KeywordFallback {
    keywords: Vec<String>,
    urls: Vec<String>,
    title_template: String,
    snippet_template: String,
}

impl KeywordFallback {
    pub fn from_config(config: &FallbackConfig) -> Self {
        Self {
            keywords: config.keywords.iter().map(|k| k.to_lowercase()).collect(),
            urls: config.urls.clone(),
            title_template: config.title_template.clone(),
            snippet_template: config.snippet_template.clone(),
        }
    }

    fn matches(&self, query: &str) -> bool {
        let lower = query.to_lowercase();
        self.keywords.iter().any(|k| lower.contains(k.as_str()))
    }
}

impl SearchFallback for KeywordFallback {
    fn fallback(&self, query: &str) -> Vec<SearchResult> {
        if !self.matches(query) {
            info!("No fallback URLs available for this query type");
            return Vec::new();
        }
        self.urls
            .iter()
            .enumerate()
            .map(|(i, url)| SearchResult {
                title: self.title_template.replace("{n}", &(i + 1).to_string()),
                link: url.clone(),
                snippet: self.snippet_template.replace("{query}", query),
                position: i + 1,
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Brave Search API
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
struct BraveResponse {
    #[serde(default)]
    web: Option<BraveWeb>,
}

#[derive(Debug, Default, Deserialize)]
struct BraveWeb {
    #[serde(default)]
    results: Vec<BraveItem>,
}

#[derive(Debug, Default, Deserialize)]
struct BraveItem {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

impl BraveResponse {
    fn into_results(self) -> Vec<SearchResult> {
        self.web
            .map(|web| web.results)
            .unwrap_or_default()
            .into_iter()
            .enumerate()
            .map(|(i, item)| SearchResult {
                title: item.title.unwrap_or_default(),
                link: item.url.unwrap_or_default(),
                snippet: item.description.unwrap_or_default(),
                position: i + 1,
            })
            .collect()
    }
}

/// Client for the Brave web search endpoint.
pub struct BraveSearchClient {
    client: Client,
    endpoint: String,
    api_key: String,
    market: String,
    safesearch: String,
}

impl BraveSearchClient {
    pub fn new(config: &SearchConfig, api_key: String) -> Result<Self, ConfigError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| ConfigError::Invalid {
                message: format!("Failed to create HTTP client: {}", e),
            })?;
        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            api_key,
            market: config.market.clone(),
            safesearch: config.safesearch.clone(),
        })
    }

    /// Query the provider. Transport errors, non-2xx statuses and undecodable
    /// bodies all come back as `Err`.
    pub async fn search(
        &self,
        query: &str,
        count: usize,
    ) -> Result<Vec<SearchResult>, reqwest::Error> {
        let count = count.to_string();
        debug!(query, count = count.as_str(), "Querying search provider");

        // Content decoding (gzip) is negotiated by the client.
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("q", query),
                ("count", count.as_str()),
                ("offset", "0"),
                ("mkt", self.market.as_str()),
                ("safesearch", self.safesearch.as_str()),
                ("textDecorations", "false"),
                ("textFormat", "Raw"),
            ])
            .header("Accept", "application/json")
            .header("X-Subscription-Token", &self.api_key)
            .send()
            .await?
            .error_for_status()?;

        let body: BraveResponse = response.json().await?;
        Ok(body.into_results())
    }
}
