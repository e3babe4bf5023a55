use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::RetryConfig;
use crate::error::{ProviderError, ResearchError};

/// Retry/backoff wrapper shared by every search and scrape call.
///
/// Failures are classified by status code: 429/500/502/503 are retried,
/// anything else fails immediately. The delay before retry `n` (0-based) is
/// `min(suggested * 2^n, max_delay)`, where `suggested` is the provider's
/// `retry_after` or the configured default.
#[derive(Debug, Clone)]
pub struct RetryingCaller {
    max_retries: u32,
    default_delay: Duration,
    max_delay: Duration,
}

impl RetryingCaller {
    pub fn new(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            default_delay: config.default_delay(),
            max_delay: config.max_delay(),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries + 1
    }

    pub fn backoff(&self, retry: u32, suggested: Option<Duration>) -> Duration {
        let base = suggested.unwrap_or(self.default_delay);
        let factor = 2u32.checked_pow(retry).unwrap_or(u32::MAX);
        base.saturating_mul(factor).min(self.max_delay)
    }

    pub async fn call<T, F, Fut>(&self, label: &str, mut operation: F) -> Result<T, ResearchError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let mut retry = 0u32;

        loop {
            let attempt = retry + 1;
            let failure = match operation().await {
                Ok(value) => {
                    debug!(label, attempt, "Provider call succeeded");
                    return Ok(value);
                }
                Err(err) => ResearchError::from_provider(label, err),
            };

            let ResearchError::TransientProvider { source, .. } = &failure else {
                warn!(label, attempt, error = %failure, "Provider call failed, not retrying");
                return Err(failure);
            };

            if retry >= self.max_retries {
                warn!(label, attempt, error = %failure, "Provider call failed, giving up");
                return Err(ResearchError::MaxRetriesExceeded {
                    label: label.to_string(),
                    attempts: attempt,
                    last: source.clone(),
                });
            }

            let delay = self.backoff(retry, source.retry_after);
            warn!(
                label,
                attempt,
                max_attempts = self.max_attempts(),
                delay_ms = delay.as_millis() as u64,
                error = %failure,
                "Provider call failed, retrying"
            );
            tokio::time::sleep(delay).await;
            retry += 1;
        }
    }
}
