//! Error types for model provider implementations.

use thiserror::Error;

/// Result type for provider operations.
pub type Result<T> = std::result::Result<T, LlmError>;

/// Errors that can occur when talking to model providers.
#[derive(Debug, Error)]
pub enum LlmError {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    /// API authentication failed.
    #[error("Authentication failed: {0}")]
    AuthenticationError(String),

    /// API key not found in environment.
    #[error("API key not found: {0}")]
    ApiKeyNotFound(String),

    /// Provider service unavailable (e.g. Ollama not running).
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    /// Rate limit exceeded.
    #[error("Rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    /// Invalid response from provider.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// General provider error.
    #[error("Provider error: {0}")]
    ProviderError(String),
}

impl LlmError {
    /// Check if this error is due to authentication.
    pub fn is_auth_error(&self) -> bool {
        matches!(
            self,
            LlmError::AuthenticationError(_) | LlmError::ApiKeyNotFound(_)
        )
    }
}

impl From<serde_json::Error> for LlmError {
    fn from(err: serde_json::Error) -> Self {
        LlmError::InvalidResponse(err.to_string())
    }
}

/// Convert provider errors into the core error type for trait
/// implementations.
impl From<LlmError> for tact_core::ActionError {
    fn from(err: LlmError) -> Self {
        tact_core::ActionError::Collaborator(err.to_string())
    }
}

/// Triage an HTTP error status into the provider error taxonomy.
pub(crate) fn status_error(provider: &str, status: reqwest::StatusCode, body: String) -> LlmError {
    match status.as_u16() {
        401 | 403 => LlmError::AuthenticationError(body),
        429 => LlmError::RateLimitExceeded(body),
        _ => LlmError::ProviderError(format!("{provider} API error {status}: {body}")),
    }
}
