use anyhow::Result;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, warn};

use crate::error::ResearchError;
use crate::generator::context::ResearchContext;
use crate::llm::{AgentExecuteParams, StructuredCompletion};

/// One structured LLM call on behalf of a research stage.
///
/// A response that arrives but cannot be decoded into `T` surfaces as
/// [`ResearchError::ExtractionSchema`] whichever completion backend produced it.
pub async fn extract<L, T>(ctx: &ResearchContext<L>, params: AgentExecuteParams) -> Result<T>
where
    L: StructuredCompletion,
    T: JsonSchema + for<'a> Deserialize<'a> + Serialize + Send + Sync + 'static,
{
    debug!(
        stage = %params.log_tag,
        system_chars = params.prompt_sys.len(),
        user_chars = params.prompt_user.len(),
        "LLM extraction started"
    );
    let started = Instant::now();

    match ctx.llm.extract::<T>(&params).await {
        Ok(result) => {
            debug!(
                stage = %params.log_tag,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "LLM extraction finished"
            );
            Ok(result)
        }
        Err(err) => {
            warn!(stage = %params.log_tag, error = %err, "LLM extraction failed");
            match err.downcast_ref::<serde_json::Error>() {
                Some(decode) => Err(ResearchError::ExtractionSchema {
                    stage: params.log_tag.clone(),
                    message: decode.to_string(),
                }
                .into()),
                None => Err(err),
            }
        }
    }
}

/// Prompt block listing prior learnings, empty when there are none.
pub fn learnings_block(learnings: &[String]) -> String {
    if learnings.is_empty() {
        return String::new();
    }
    let items: Vec<String> = learnings
        .iter()
        .map(|l| format!("<learning>\n{l}\n</learning>"))
        .collect();
    format!(
        "Here are the learnings from previous research, use them to go deeper:\n<learnings>\n{}\n</learnings>\n",
        items.join("\n")
    )
}
