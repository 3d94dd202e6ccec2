//! Brain module: language model abstraction and the shared model gateway.
//!
//! Defines the `LlmProvider` trait for model-agnostic completions and
//! `ModelGateway`, the single owned entry point every pipeline stage uses to
//! talk to the model. The gateway paces calls through a shared token bucket
//! and classifies failures before handing them back to the caller.

use crate::config::LlmConfig;
use crate::error::{ConfigError, LlmError};
use crate::providers::{PacingLimiter, RateLimitConfig, create_provider};
use crate::types::{CompletionRequest, CompletionResponse, TokenUsage};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, error};

/// Trait for language model providers.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Perform a full completion and return the response.
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError>;

    /// Return the model name.
    fn model_name(&self) -> &str;

    /// Leading characters of the credential, for authentication diagnostics.
    fn credential_prefix(&self) -> Option<String> {
        None
    }
}

/// The one model client shared by every stage of a research run.
pub struct ModelGateway {
    provider: Arc<dyn LlmProvider>,
    limiter: PacingLimiter,
}

impl std::fmt::Debug for ModelGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelGateway")
            .field("model", &self.provider.model_name())
            .finish_non_exhaustive()
    }
}

impl ModelGateway {
    pub fn new(provider: Arc<dyn LlmProvider>, pacing: RateLimitConfig) -> Self {
        Self {
            provider,
            limiter: PacingLimiter::new(pacing),
        }
    }

    /// Build the configured provider and validate its credential.
    ///
    /// Fails with `ConfigError::EnvVarMissing` when no key is available; no
    /// request is made in that case.
    pub fn from_config(config: &LlmConfig) -> Result<Self, ConfigError> {
        let provider = create_provider(config)?;
        Ok(Self::new(
            provider,
            RateLimitConfig {
                calls_per_second: config.calls_per_second,
                burst: config.burst,
            },
        ))
    }

    pub fn model_name(&self) -> &str {
        self.provider.model_name()
    }

    /// One paced round trip to the model. `stage` names the caller in diagnostics.
    ///
    /// `temperature` of `None` keeps the provider default.
    pub async fn generate(
        &self,
        prompt: &str,
        max_tokens: usize,
        temperature: Option<f32>,
        stage: &str,
    ) -> Result<String, LlmError> {
        let waited = self.limiter.acquire().await;
        debug!(
            stage,
            max_tokens,
            paced_ms = waited.as_millis() as u64,
            "Issuing model request"
        );

        let request = CompletionRequest::prompt(prompt, max_tokens, temperature);
        match self.provider.complete(request).await {
            Ok(response) => Ok(response.text),
            Err(err) => {
                if err.is_auth() {
                    let prefix = self.provider.credential_prefix();
                    error!(
                        stage,
                        api_key_present = prefix.is_some(),
                        api_key_prefix = prefix.as_deref().unwrap_or(""),
                        timestamp = %Utc::now().to_rfc3339(),
                        "Model API 401 error"
                    );
                }
                error!(stage, error = %err, "Model API error");
                Err(err)
            }
        }
    }
}

type MockHandler = Box<dyn Fn(&CompletionRequest) -> Result<String, LlmError> + Send + Sync>;

/// A mock LLM provider for testing and development.
///
/// Replies come from the queue first, then from the handler if one is set,
/// then from a fixed placeholder. Every request is recorded.
pub struct MockLlmProvider {
    model: String,
    responses: Mutex<VecDeque<Result<String, LlmError>>>,
    handler: Option<MockHandler>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl Default for MockLlmProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MockLlmProvider {
    pub fn new() -> Self {
        Self {
            model: "mock-model".to_string(),
            responses: Mutex::new(VecDeque::new()),
            handler: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Create a MockLlmProvider that always returns the given text.
    pub fn with_response(text: &str) -> Self {
        let text = text.to_string();
        Self::with_handler(move |_| Ok(text.clone()))
    }

    /// Create a MockLlmProvider that computes each reply from the request.
    pub fn with_handler<F>(handler: F) -> Self
    where
        F: Fn(&CompletionRequest) -> Result<String, LlmError> + Send + Sync + 'static,
    {
        Self {
            handler: Some(Box::new(handler)),
            ..Self::new()
        }
    }

    /// Queue a reply to be returned by the next `complete` call.
    pub fn queue_response(&self, text: impl Into<String>) {
        self.responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(Ok(text.into()));
    }

    /// Queue a failure to be returned by the next `complete` call.
    pub fn queue_error(&self, err: LlmError) {
        self.responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(Err(err));
    }

    /// All requests received so far, in order.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[async_trait]
impl LlmProvider for MockLlmProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.clone());

        let queued = self
            .responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        let text = match (queued, &self.handler) {
            (Some(reply), _) => reply?,
            (None, Some(handler)) => handler(&request)?,
            (None, None) => "I'm a mock LLM. No queued responses available.".to_string(),
        };

        Ok(CompletionResponse {
            text,
            usage: TokenUsage {
                input_tokens: 100,
                output_tokens: 50,
            },
            model: self.model.clone(),
            finish_reason: Some("end_turn".to_string()),
        })
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn credential_prefix(&self) -> Option<String> {
        Some("mock-key-0".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_mock_queue_then_handler() {
        let mock = MockLlmProvider::with_response("fallback");
        mock.queue_response("first");
        let gateway = ModelGateway::new(Arc::new(mock), RateLimitConfig::unlimited());

        assert_eq!(gateway.generate("a", 10, None, "test").await.unwrap(), "first");
        assert_eq!(
            gateway.generate("b", 10, None, "test").await.unwrap(),
            "fallback"
        );
    }

    #[tokio::test]
    async fn test_generate_forwards_parameters() {
        let mock = Arc::new(MockLlmProvider::new());
        let gateway = ModelGateway::new(mock.clone(), RateLimitConfig::unlimited());
        gateway
            .generate("Score this", 300, Some(0.1), "scoreRelevance")
            .await
            .unwrap();

        let requests = mock.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].prompt_text(), "Score this");
        assert_eq!(requests[0].max_tokens, 300);
        assert_eq!(requests[0].temperature, Some(0.1));
    }

    #[tokio::test]
    async fn test_generate_propagates_auth_failure() {
        let mock = MockLlmProvider::new();
        mock.queue_error(LlmError::AuthFailed {
            provider: "Anthropic".into(),
        });
        let gateway = ModelGateway::new(Arc::new(mock), RateLimitConfig::unlimited());
        let err = gateway
            .generate("x", 10, None, "analyzeQuery")
            .await
            .unwrap_err();
        assert!(err.is_auth());
    }

    #[tokio::test]
    async fn test_generate_propagates_other_failures_unchanged() {
        let mock = MockLlmProvider::new();
        mock.queue_error(LlmError::Timeout { timeout_secs: 120 });
        let gateway = ModelGateway::new(Arc::new(mock), RateLimitConfig::unlimited());
        let err = gateway.generate("x", 10, None, "synthesize").await.unwrap_err();
        assert!(matches!(err, LlmError::Timeout { timeout_secs: 120 }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_generate_is_paced() {
        let mock = Arc::new(MockLlmProvider::with_response("ok"));
        let gateway = ModelGateway::new(mock.clone(), RateLimitConfig::default());
        let start = tokio::time::Instant::now();
        for _ in 0..3 {
            gateway.generate("x", 10, None, "test").await.unwrap();
        }
        assert!(start.elapsed() >= Duration::from_millis(399));
        assert_eq!(mock.call_count(), 3);
    }

    #[test]
    fn test_from_config_missing_key() {
        let config = LlmConfig {
            api_key_env: "SLEUTH_BRAIN_TEST_NO_SUCH_KEY".into(),
            ..LlmConfig::default()
        };
        let err = ModelGateway::from_config(&config).unwrap_err();
        assert!(matches!(err, ConfigError::EnvVarMissing { .. }));
    }
}
