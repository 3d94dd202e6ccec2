//! Error types for the Sleuth research core.
//!
//! Uses `thiserror` for public API error types. Only model and configuration
//! failures are fatal to a research run; search, scrape and parse problems are
//! recovered where they happen and never show up here.

/// Top-level error type for the Sleuth core library.
#[derive(Debug, thiserror::Error)]
pub enum SleuthError {
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Research error: {0}")]
    Research(#[from] ResearchError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors from language model provider interactions.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("API request failed: {message}")]
    ApiRequest { message: String },

    #[error("API response parse error: {message}")]
    ResponseParse { message: String },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("Provider connection failed: {message}")]
    Connection { message: String },
}

impl LlmError {
    /// Whether the provider rejected the credential.
    pub fn is_auth(&self) -> bool {
        matches!(self, LlmError::AuthFailed { .. })
    }
}

/// Errors from the configuration system.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Environment variable not set: {var}")]
    EnvVarMissing { var: String },

    #[error("Invalid configuration: {message}")]
    Invalid { message: String },
}

/// Errors raised by the run orchestration itself.
#[derive(Debug, thiserror::Error)]
pub enum ResearchError {
    #[error("No activity for {idle_secs} seconds")]
    TimedOut { idle_secs: u64 },
}

/// Convenience alias for results using `SleuthError`.
pub type Result<T> = std::result::Result<T, SleuthError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_llm() {
        let err = SleuthError::Llm(LlmError::ApiRequest {
            message: "connection refused".into(),
        });
        assert_eq!(
            err.to_string(),
            "LLM error: API request failed: connection refused"
        );
    }

    #[test]
    fn test_error_display_config() {
        let err = SleuthError::Config(ConfigError::EnvVarMissing {
            var: "ANTHROPIC_API_KEY".into(),
        });
        assert_eq!(
            err.to_string(),
            "Configuration error: Environment variable not set: ANTHROPIC_API_KEY"
        );
    }

    #[test]
    fn test_error_display_timeout() {
        let err = SleuthError::Research(ResearchError::TimedOut { idle_secs: 60 });
        assert_eq!(
            err.to_string(),
            "Research error: No activity for 60 seconds"
        );
    }

    #[test]
    fn test_auth_classification() {
        assert!(
            LlmError::AuthFailed {
                provider: "Anthropic".into()
            }
            .is_auth()
        );
        assert!(!LlmError::RateLimited { retry_after_secs: 3 }.is_auth());
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: SleuthError = io_err.into();
        assert!(matches!(err, SleuthError::Io(_)));
    }

    #[test]
    fn test_error_from_serde() {
        let serde_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: SleuthError = serde_err.into();
        assert!(err.to_string().starts_with("Serialization error: "));
    }
}
