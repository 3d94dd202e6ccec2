//! LLM provider implementations.
//!
//! Provides the Anthropic Messages API implementation of the `LlmProvider`
//! trait and the token bucket that paces every call made through the
//! model gateway.
//!
//! Use `create_provider()` to instantiate the provider named in config.

pub mod anthropic;
pub mod rate_limiter;

use crate::brain::LlmProvider;
use crate::config::LlmConfig;
use crate::error::ConfigError;
use std::sync::Arc;

pub use anthropic::AnthropicProvider;
pub use rate_limiter::{PacingLimiter, RateLimitConfig, TokenBucketLimiter};

/// Build the configured provider.
///
/// The credential is resolved here, once, so a missing key surfaces before
/// any request is attempted.
pub fn create_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, ConfigError> {
    match config.provider.as_str() {
        "anthropic" => Ok(Arc::new(AnthropicProvider::new(config)?)),
        other => Err(ConfigError::Invalid {
            message: format!("unsupported LLM provider '{other}'"),
        }),
    }
}
