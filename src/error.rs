//! Error taxonomy for the research pipeline.
//!
//! Stages return `anyhow::Result`; the variants below are wrapped inside
//! `anyhow::Error` so callers can `downcast_ref::<ResearchError>()` when they
//! need to tell a provider outage apart from a schema failure.

use std::time::Duration;

/// Failure of a single call to an external search/scrape provider.
///
/// Adapters fill `retry_after` from the provider response (e.g. the HTTP
/// `Retry-After` header); the retry loop never parses it out of `message`.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}{}", .status.map(|s| format!(" (status {s})")).unwrap_or_default())]
pub struct ProviderError {
    pub status: Option<u16>,
    pub message: String,
    pub retry_after: Option<Duration>,
}

impl ProviderError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            status: None,
            message: message.into(),
            retry_after: None,
        }
    }

    pub fn with_status(status: u16, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            message: message.into(),
            retry_after: None,
        }
    }

    pub fn retry_after(mut self, delay: Duration) -> Self {
        self.retry_after = Some(delay);
        self
    }

    /// 429/500/502/503 are worth another attempt; everything else (402 included) is not.
    pub fn is_retryable(&self) -> bool {
        matches!(self.status, Some(429 | 500 | 502 | 503))
    }

    /// 401/402/403: the account or key is unusable, so every other call would fail too.
    pub fn is_credential_failure(&self) -> bool {
        matches!(self.status, Some(401 | 402 | 403))
    }
}

/// Top-level error type for the research pipeline.
#[derive(Debug, thiserror::Error)]
pub enum ResearchError {
    #[error("transient provider error during {label}: {source}")]
    TransientProvider {
        label: String,
        #[source]
        source: ProviderError,
    },

    #[error("fatal provider error during {label}: {source}")]
    FatalProvider {
        label: String,
        #[source]
        source: ProviderError,
    },

    #[error("{label} failed after {attempts} attempts: {last}")]
    MaxRetriesExceeded {
        label: String,
        attempts: u32,
        last: ProviderError,
    },

    #[error("LLM response for {stage} failed schema validation: {message}")]
    ExtractionSchema { stage: String, message: String },

    #[error("configuration error: {0}")]
    Config(String),
}

impl ResearchError {
    /// Classify a provider failure by its status code.
    pub fn from_provider(label: impl Into<String>, source: ProviderError) -> Self {
        let label = label.into();
        if source.is_retryable() {
            ResearchError::TransientProvider { label, source }
        } else {
            ResearchError::FatalProvider { label, source }
        }
    }

    /// A fatal provider failure caused by the account or key rather than the
    /// individual request. These abort the run instead of degrading to "no data".
    pub fn is_credential_failure(&self) -> bool {
        matches!(self, ResearchError::FatalProvider { source, .. } if source.is_credential_failure())
    }

    /// Status code of the underlying provider failure, if any.
    pub fn provider_status(&self) -> Option<u16> {
        match self {
            ResearchError::TransientProvider { source, .. }
            | ResearchError::FatalProvider { source, .. } => source.status,
            ResearchError::MaxRetriesExceeded { last, .. } => last.status,
            _ => None,
        }
    }
}
