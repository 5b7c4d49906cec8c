use thiserror::Error;

use crate::jobs::StoreError;

/// Errors that can occur while harvesting a recipe from a URL
///
/// Display strings are what callers see on a failed job, so variants carry
/// messages built by this crate rather than raw upstream payloads.
#[derive(Error, Debug)]
pub enum HarvestError {
    /// Network or provider failure while fetching content (retryable)
    #[error("Failed to acquire content: {0}")]
    Acquisition(String),

    /// No identifier could be extracted or no playable media exists
    #[error("Unsupported content: {0}")]
    UnsupportedContent(String),

    /// Downloaded media is corrupt or unreadable
    #[error("Unreadable media: {0}")]
    MediaDecode(String),

    /// Speech-to-text failed; the sampler degrades instead of failing the job
    #[error("Transcription failed: {0}")]
    Transcription(String),

    /// Model output was unparsable or violated the recipe schema (retryable)
    #[error("Extraction failed: {0}")]
    Extraction(String),

    /// The job record could not be persisted
    #[error("Job storage error: {0}")]
    Storage(#[from] StoreError),

    /// The job was cancelled by a caller
    #[error("Job was cancelled")]
    Cancelled,

    /// A stage failed in an unexpected way; details are only logged
    #[error("Internal error")]
    Internal(String),

    /// Builder configuration error
    #[error("Builder error: {0}")]
    BuilderError(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(#[from] config::ConfigError),
}

impl HarvestError {
    /// Whether retrying the same job attempt could plausibly succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            HarvestError::Acquisition(_) | HarvestError::Extraction(_)
        )
    }

    /// Short kind name used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            HarvestError::Acquisition(_) => "acquisition",
            HarvestError::UnsupportedContent(_) => "unsupported_content",
            HarvestError::MediaDecode(_) => "media_decode",
            HarvestError::Transcription(_) => "transcription",
            HarvestError::Extraction(_) => "extraction",
            HarvestError::Storage(_) => "storage",
            HarvestError::Cancelled => "cancelled",
            HarvestError::Internal(_) => "internal",
            HarvestError::BuilderError(_) => "builder",
            HarvestError::ConfigError(_) => "config",
        }
    }
}

impl From<reqwest::Error> for HarvestError {
    fn from(err: reqwest::Error) -> Self {
        // Request URLs can carry credentials in the query string
        let err = err.without_url();
        if err.is_builder() {
            HarvestError::UnsupportedContent("request could not be built for this URL".to_string())
        } else if err.is_timeout() {
            HarvestError::Acquisition("request timed out".to_string())
        } else if err.is_connect() {
            HarvestError::Acquisition("connection failed".to_string())
        } else {
            HarvestError::Acquisition(err.to_string())
        }
    }
}
