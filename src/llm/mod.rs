//! Structured LLM completion: the seam every research stage calls through.

use anyhow::Result;
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub mod client;

pub use client::LLMClient;

/// Parameters of one structured completion call.
#[derive(Debug, Clone)]
pub struct AgentExecuteParams {
    pub prompt_sys: String,
    pub prompt_user: String,
    /// Cache category, e.g. `research/triage`
    pub cache_scope: String,
    /// Stage name used in logs and error messages
    pub log_tag: String,
}

/// A completion whose answer must fit `T`'s JSON schema.
///
/// Implementations return an error when the model's answer does not
/// deserialize into `T`.
#[async_trait]
pub trait StructuredCompletion: Send + Sync {
    async fn extract<T>(&self, params: &AgentExecuteParams) -> Result<T>
    where
        T: JsonSchema + for<'a> Deserialize<'a> + Serialize + Send + Sync + 'static;
}
