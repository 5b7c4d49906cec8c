mod anthropic;
mod factory;
mod fallback;
mod google;
mod ollama;
mod open_ai;

pub use anthropic::AnthropicProvider;
pub use factory::ProviderFactory;
pub use fallback::FallbackProvider;
pub use google::GoogleProvider;
pub use ollama::OllamaProvider;
pub use open_ai::OpenAIProvider;

use async_trait::async_trait;
use reqwest::Response;
use thiserror::Error;

/// Failures talking to a generative model
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("request failed: {0}")]
    Http(String),

    #[error("API returned HTTP {status}")]
    Api { status: u16 },

    #[error("{0} not found in config or environment")]
    MissingApiKey(&'static str),

    #[error("response contained no text")]
    EmptyResponse,

    #[error("Unknown provider: {0}")]
    UnknownProvider(String),

    #[error("Provider '{0}' is not enabled in configuration")]
    Disabled(String),

    #[error("No providers available: {0}")]
    NoneAvailable(String),

    #[error("Failed to create HTTP client: {0}")]
    Client(String),
}

impl ProviderError {
    /// Whether another call to the same provider could succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            ProviderError::Http(_) | ProviderError::EmptyResponse => true,
            ProviderError::Api { status } => *status == 429 || *status == 408 || *status >= 500,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        // Some vendors take the API key as a query parameter
        ProviderError::Http(err.without_url().to_string())
    }
}

/// Turn a non-success response into `ProviderError::Api`, logging the body
pub(crate) async fn check_status(provider: &str, response: Response) -> Result<Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    log::debug!("{} error body: {}", provider, body);
    Err(ProviderError::Api {
        status: status.as_u16(),
    })
}

/// Default client timeout for provider calls
pub(crate) fn client(timeout: std::time::Duration) -> Result<reqwest::Client, ProviderError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| ProviderError::Client(e.to_string()))
}

/// Unified trait for all generative model providers
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Get the provider name (e.g., "openai", "anthropic")
    fn provider_name(&self) -> &str;

    /// Run one completion with `instructions` as the system prompt
    async fn complete(&self, instructions: &str, content: &str) -> Result<String, ProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn test_retryable_errors() {
        assert!(ProviderError::Http("timeout".into()).is_retryable());
        assert!(ProviderError::Api { status: 429 }.is_retryable());
        assert!(ProviderError::Api { status: 503 }.is_retryable());
        assert!(!ProviderError::Api { status: 401 }.is_retryable());
        assert!(!ProviderError::MissingApiKey("OPENAI_API_KEY").is_retryable());
        assert!(!ProviderError::Disabled("openai".into()).is_retryable());
        assert!(!ProviderError::Client("tls backend unavailable".into()).is_retryable());
    }

    #[test]
    fn test_client_is_built_with_timeout() {
        assert!(client(std::time::Duration::from_secs(5)).is_ok());
    }

    #[test]
    fn test_status_code_is_not_leaked_with_body() {
        let err = ProviderError::Api {
            status: StatusCode::UNAUTHORIZED.as_u16(),
        };
        assert_eq!(err.to_string(), "API returned HTTP 401");
    }
}
