//! Configuration system for Sleuth.
//!
//! Uses `figment` for layered configuration: defaults -> config file -> environment -> CLI args.
//! Configuration is loaded from `~/.config/sleuth/config.toml` and/or `.sleuth/config.toml`
//! in the workspace directory.

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::evidence::SourceProfile;
use crate::gateway::GatewayConfig;

/// Top-level configuration for the Sleuth service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SleuthConfig {
    pub llm: LlmConfig,
    pub search: SearchConfig,
    pub research: ResearchConfig,
    pub followup: FollowUpConfig,
    pub gateway: GatewayConfig,
}

impl SleuthConfig {
    /// Collect warnings from every section.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = self.llm.validate();
        warnings.extend(self.research.validate());
        if self.search.fallback.urls.is_empty() && !self.search.fallback.keywords.is_empty() {
            warnings.push(
                "search.fallback has keywords but no urls; the fallback will never match".into(),
            );
        }
        warnings
    }
}

/// Language model provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Provider name. Only "anthropic" is wired up.
    pub provider: String,
    /// Model identifier.
    pub model: String,
    /// Environment variable name containing the API key.
    pub api_key_env: String,
    /// Optional base URL override for the API endpoint.
    pub base_url: Option<String>,
    /// Per-request HTTP timeout.
    pub request_timeout_secs: u64,
    /// Sustained model calls per second across the whole process.
    pub calls_per_second: f64,
    /// Calls allowed back to back before pacing kicks in.
    pub burst: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "anthropic".to_string(),
            model: "claude-3-5-sonnet-20241022".to_string(),
            api_key_env: "ANTHROPIC_API_KEY".to_string(),
            base_url: None,
            request_timeout_secs: 120,
            calls_per_second: 5.0,
            burst: 1,
        }
    }
}

impl LlmConfig {
    /// Validate this LLM config and return any warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.provider != "anthropic" {
            warnings.push(format!(
                "llm.provider '{}' is not supported; only 'anthropic' is available",
                self.provider
            ));
        }
        if self.calls_per_second <= 0.0 {
            warnings.push(format!(
                "llm.calls_per_second ({}) must be positive; model calls would never be paced",
                self.calls_per_second
            ));
        }
        if self.burst == 0 {
            warnings.push("llm.burst is 0; treated as 1".to_string());
        }
        warnings
    }
}

/// Web search provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Environment variable holding the search subscription token.
    pub api_key_env: String,
    /// Search endpoint.
    pub endpoint: String,
    /// Market code sent with every query.
    pub market: String,
    /// Safe-search level sent with every query.
    pub safesearch: String,
    /// Static result set used by primary research when the provider is unavailable.
    pub fallback: FallbackConfig,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            api_key_env: "BRAVE_API_KEY".to_string(),
            endpoint: "https://api.search.brave.com/res/v1/web/search".to_string(),
            market: "en-US".to_string(),
            safesearch: "moderate".to_string(),
            fallback: FallbackConfig::default(),
        }
    }
}

/// Keyword-keyed static search results.
///
/// `title_template` may contain `{n}` (1-based position); `snippet_template`
/// may contain `{query}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FallbackConfig {
    pub keywords: Vec<String>,
    pub urls: Vec<String>,
    pub title_template: String,
    pub snippet_template: String,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            keywords: vec!["aetna".to_string(), "insurance".to_string()],
            urls: vec![
                "https://www.aetna.com/individuals-families/plans-services.html".to_string(),
                "https://www.aetna.com/health-care-professionals/provider-education-manuals.html"
                    .to_string(),
                "https://www.aetna.com/about-us/aetna-facts-health-information.html".to_string(),
                "https://www.healthcare.gov/glossary/".to_string(),
                "https://www.cms.gov/marketplace/resources/data/public-use-files".to_string(),
            ],
            title_template: "Aetna Insurance Information - {n}".to_string(),
            snippet_template:
                "Information about Aetna insurance plans and services related to: {query}"
                    .to_string(),
        }
    }
}

/// Primary research pipeline settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchConfig {
    /// Search results requested per sub-question.
    pub result_count: usize,
    /// Top results scraped per sub-question.
    pub pages_per_question: usize,
    pub scrape_timeout_secs: u64,
    /// Character budget for one scraped page.
    pub content_limit: usize,
    /// Characters of each scraped page placed into the gathering prompt.
    pub excerpt_limit: usize,
    pub default_relevance_threshold: u32,
    /// Maximum gap between progress events before a stream is closed.
    pub liveness_timeout_secs: u64,
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            result_count: 5,
            pages_per_question: 3,
            scrape_timeout_secs: 10,
            content_limit: 3000,
            excerpt_limit: 1000,
            default_relevance_threshold: 70,
            liveness_timeout_secs: 60,
        }
    }
}

impl ResearchConfig {
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.default_relevance_threshold > 100 {
            warnings.push(format!(
                "research.default_relevance_threshold ({}) is above 100; every finding will be filtered out",
                self.default_relevance_threshold
            ));
        }
        if self.liveness_timeout_secs == 0 {
            warnings.push(
                "research.liveness_timeout_secs is 0; streams will close immediately".to_string(),
            );
        }
        if self.pages_per_question > self.result_count {
            warnings.push(format!(
                "research.pages_per_question ({}) exceeds result_count ({})",
                self.pages_per_question, self.result_count
            ));
        }
        warnings
    }

    /// Evidence source settings for primary research.
    pub fn profile(&self) -> SourceProfile {
        SourceProfile {
            result_count: self.result_count,
            scrape_timeout: Duration::from_secs(self.scrape_timeout_secs),
            content_limit: self.content_limit,
        }
    }

    pub fn liveness_timeout(&self) -> Duration {
        Duration::from_secs(self.liveness_timeout_secs)
    }
}

/// Follow-up pipeline settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FollowUpConfig {
    pub result_count: usize,
    pub pages: usize,
    pub scrape_timeout_secs: u64,
    pub content_limit: usize,
}

impl Default for FollowUpConfig {
    fn default() -> Self {
        Self {
            result_count: 3,
            pages: 2,
            scrape_timeout_secs: 8,
            content_limit: 2000,
        }
    }
}

impl FollowUpConfig {
    /// Evidence source settings for follow-up questions.
    pub fn profile(&self) -> SourceProfile {
        SourceProfile {
            result_count: self.result_count,
            scrape_timeout: Duration::from_secs(self.scrape_timeout_secs),
            content_limit: self.content_limit,
        }
    }
}

/// Load configuration from all sources, merging in priority order.
///
/// Priority (highest to lowest):
/// 1. Explicit overrides (passed as argument)
/// 2. Environment variables (prefixed with `SLEUTH_`)
/// 3. Workspace-local config (`.sleuth/config.toml`)
/// 4. User config (`~/.config/sleuth/config.toml`)
/// 5. Built-in defaults
pub fn load_config(
    workspace: Option<&Path>,
    overrides: Option<&SleuthConfig>,
) -> Result<SleuthConfig, Box<figment::Error>> {
    let mut figment = Figment::from(Serialized::defaults(SleuthConfig::default()));

    if let Some(config_dir) = directories::ProjectDirs::from("dev", "sleuth", "sleuth") {
        let user_config = config_dir.config_dir().join("config.toml");
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }
    }

    if let Some(ws) = workspace {
        let ws_config = ws.join(".sleuth").join("config.toml");
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    // SLEUTH_LLM__MODEL, SLEUTH_RESEARCH__LIVENESS_TIMEOUT_SECS, ...
    figment = figment.merge(Env::prefixed("SLEUTH_").split("__"));

    if let Some(overrides) = overrides {
        figment = figment.merge(Serialized::defaults(overrides));
    }

    figment.extract().map_err(Box::new)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SleuthConfig::default();
        assert_eq!(config.llm.provider, "anthropic");
        assert_eq!(config.llm.api_key_env, "ANTHROPIC_API_KEY");
        assert_eq!(config.search.api_key_env, "BRAVE_API_KEY");
        assert_eq!(config.research.result_count, 5);
        assert_eq!(config.research.default_relevance_threshold, 70);
        assert_eq!(config.followup.result_count, 3);
        assert_eq!(config.followup.content_limit, 2000);
        assert!(config.validate().is_empty());
    }

    #[test]
    fn test_profiles() {
        let config = SleuthConfig::default();
        let primary = config.research.profile();
        assert_eq!(primary.result_count, 5);
        assert_eq!(primary.scrape_timeout, Duration::from_secs(10));
        assert_eq!(primary.content_limit, 3000);

        let followup = config.followup.profile();
        assert_eq!(followup.scrape_timeout, Duration::from_secs(8));
        assert_eq!(followup.content_limit, 2000);
    }

    #[test]
    fn test_validate_warnings() {
        let mut config = SleuthConfig::default();
        config.llm.calls_per_second = 0.0;
        config.research.default_relevance_threshold = 150;
        config.research.pages_per_question = 9;
        let warnings = config.validate();
        assert_eq!(warnings.len(), 3);
        assert!(warnings[0].contains("calls_per_second"));
        assert!(warnings[1].contains("above 100"));
        assert!(warnings[2].contains("exceeds result_count"));
    }

    #[test]
    fn test_load_config_defaults() {
        let config = load_config(None, None).unwrap();
        assert_eq!(config.llm.model, "claude-3-5-sonnet-20241022");
        assert_eq!(config.research.liveness_timeout_secs, 60);
    }

    #[test]
    fn test_load_config_with_overrides() {
        let mut overrides = SleuthConfig::default();
        overrides.llm.model = "claude-3-5-haiku-20241022".to_string();
        overrides.gateway.port = 4100;

        let config = load_config(None, Some(&overrides)).unwrap();
        assert_eq!(config.llm.model, "claude-3-5-haiku-20241022");
        assert_eq!(config.gateway.port, 4100);
    }

    #[test]
    fn test_load_config_from_workspace() {
        let dir = tempfile::tempdir().unwrap();
        let sleuth_dir = dir.path().join(".sleuth");
        std::fs::create_dir_all(&sleuth_dir).unwrap();
        std::fs::write(
            sleuth_dir.join("config.toml"),
            r#"
[llm]
calls_per_second = 2.5

[research]
default_relevance_threshold = 80
pages_per_question = 2

[search.fallback]
keywords = ["rust"]
urls = ["https://www.rust-lang.org/"]
"#,
        )
        .unwrap();

        let config = load_config(Some(dir.path()), None).unwrap();
        assert_eq!(config.llm.calls_per_second, 2.5);
        // untouched fields keep their defaults
        assert_eq!(config.llm.burst, 1);
        assert_eq!(config.research.default_relevance_threshold, 80);
        assert_eq!(config.research.pages_per_question, 2);
        assert_eq!(config.search.fallback.keywords, vec!["rust".to_string()]);
        assert_eq!(
            config.search.fallback.title_template,
            "Aetna Insurance Information - {n}"
        );
    }

    #[test]
    fn test_config_serialization_roundtrip() {
        let config = SleuthConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: SleuthConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.research.excerpt_limit, config.research.excerpt_limit);
        assert_eq!(back.gateway.host, config.gateway.host);
    }
}
