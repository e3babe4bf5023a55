//! Production `StructuredCompletion` backed by rig, with result caching and
//! an efficient→powerful model fallback.

use anyhow::Result;
use async_trait::async_trait;
use rig::extractor::ExtractionError;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::cache::CacheManager;
use crate::config::{CacheConfig, LLMConfig};
use crate::error::ResearchError;
use crate::llm::{AgentExecuteParams, StructuredCompletion};

mod providers;
pub mod types;
pub mod utils;

use providers::ProviderClient;
use utils::{estimate_token_usage, evaluate_befitting_model};

#[derive(Clone)]
pub struct LLMClient {
    config: LLMConfig,
    client: ProviderClient,
    cache: Arc<CacheManager>,
}

impl LLMClient {
    pub fn new(config: LLMConfig, cache_config: CacheConfig) -> Result<Self> {
        let client = ProviderClient::new(&config)?;
        Ok(Self {
            config,
            client,
            cache: Arc::new(CacheManager::new(cache_config)),
        })
    }

    pub fn cache(&self) -> &CacheManager {
        &self.cache
    }

    /// The completion interface's own resilience: a fixed-delay retry loop.
    async fn retry_with_backoff<T, F, Fut>(&self, log_tag: &str, operation: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_retries = self.config.retry_attempts.max(1);
        let mut retries = 0;

        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(err) => {
                    retries += 1;
                    warn!(
                        stage = log_tag,
                        attempt = retries,
                        max_attempts = max_retries,
                        error = %err,
                        "LLM call failed"
                    );
                    if retries >= max_retries {
                        return Err(err);
                    }
                    tokio::time::sleep(Duration::from_millis(self.config.retry_delay_ms)).await;
                }
            }
        }
    }

    async fn extract_inner<T>(
        &self,
        params: &AgentExecuteParams,
        user_prompt: &str,
        befitting_model: String,
        fallover_model: Option<String>,
    ) -> Result<T>
    where
        T: JsonSchema + for<'a> Deserialize<'a> + Serialize + Send + Sync + 'static,
    {
        let extractor =
            self.client
                .create_extractor::<T>(&befitting_model, &params.prompt_sys, &self.config)?;

        let first_try = self
            .retry_with_backoff(&params.log_tag, || extractor.extract(user_prompt))
            .await;

        match (first_try, fallover_model) {
            (Ok(result), _) => Ok(result),
            (Err(e), Some(model)) => {
                warn!(
                    stage = %params.log_tag,
                    fallback_model = %model,
                    error = %e,
                    "Efficient model failed, retrying with fallback model"
                );
                let user_prompt_with_fixer = format!(
                    "{}\n\nNote: a previous attempt at this task failed with \"{}\". Avoid repeating that mistake.",
                    user_prompt, e
                );
                Box::pin(self.extract_inner(params, &user_prompt_with_fixer, model, None)).await
            }
            (Err(e), None) => Err(e),
        }
    }
}

/// Responses that came back but could not be turned into the schema type.
fn is_schema_failure(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<ExtractionError>(),
        Some(ExtractionError::NoData | ExtractionError::DeserializationError(_))
    )
}

#[async_trait]
impl StructuredCompletion for LLMClient {
    async fn extract<T>(&self, params: &AgentExecuteParams) -> Result<T>
    where
        T: JsonSchema + for<'a> Deserialize<'a> + Serialize + Send + Sync + 'static,
    {
        let prompt_key = format!("{}\n{}", params.prompt_sys, params.prompt_user);
        if let Some(cached) = self.cache.get::<T>(&params.cache_scope, &prompt_key).await? {
            debug!(stage = %params.log_tag, "LLM result served from cache");
            return Ok(cached);
        }

        let (befitting_model, fallover_model) =
            evaluate_befitting_model(&self.config, &params.prompt_sys, &params.prompt_user);

        let result: T = self
            .extract_inner(params, &params.prompt_user, befitting_model, fallover_model)
            .await
            .map_err(|e| {
                if is_schema_failure(&e) {
                    anyhow::Error::new(ResearchError::ExtractionSchema {
                        stage: params.log_tag.clone(),
                        message: e.to_string(),
                    })
                } else {
                    e
                }
            })?;

        let output_text = serde_json::to_string(&result)?;
        let token_usage = estimate_token_usage(&prompt_key, &output_text);
        if let Err(e) = self
            .cache
            .set_with_tokens(&params.cache_scope, &prompt_key, &result, token_usage)
            .await
        {
            warn!(stage = %params.log_tag, error = %e, "Failed to cache LLM result");
        }

        Ok(result)
    }
}
