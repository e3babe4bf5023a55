use anyhow::Result;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, info};

use super::AgentType;
use crate::generator::agent_executor::extract;
use crate::generator::context::ResearchContext;
use crate::generator::research::types::Article;
use crate::llm::StructuredCompletion;
use crate::utils::urls::normalize_url;

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct TriageSelection {
    /// URLs of the articles worth keeping, copied exactly from the input
    pub relevant_urls: Vec<String>,
}

/// Relevance and source-quality filter over gathered articles.
#[derive(Default)]
pub struct TriageStage;

impl TriageStage {
    /// Surviving articles keep their input order and every field untouched.
    pub async fn execute<L: StructuredCompletion>(
        &self,
        ctx: &ResearchContext<L>,
        articles: Vec<Article>,
        research_goals: &[String],
    ) -> Result<Vec<Article>> {
        if articles.is_empty() {
            return Ok(articles);
        }

        let batch_size = ctx.config.research.triage_batch_size.max(1);
        let mut selected: HashSet<String> = HashSet::new();

        for (batch_index, batch) in articles.chunks(batch_size).enumerate() {
            let prompt_sys = format!(
                r#"You are triaging search results for a financial research desk. Today is {today}.
Keep an article only if it is relevant to the research goals, comes from a credible source (primary filings, major wires, established financial press, official statistics) and is likely to report something from the last 7 days.
Drop press-release aggregators, SEO content farms, forums, and evergreen explainers.
Answer only with URLs that appear in the input."#,
                today = ctx.today.format("%Y-%m-%d"),
            );
            let prompt_user = format!(
                "<research_goals>\n{}\n</research_goals>\n<articles>\n{}\n</articles>",
                research_goals.join("\n"),
                render_articles(batch)
            );

            let selection: TriageSelection =
                extract(ctx, AgentType::Triage.params(prompt_sys, prompt_user)).await?;
            debug!(
                batch = batch_index,
                size = batch.len(),
                kept = selection.relevant_urls.len(),
                "Triage batch answered"
            );
            selected.extend(selection.relevant_urls.iter().map(|u| normalize_url(u)));
        }

        let total = articles.len();
        let kept: Vec<Article> = articles
            .into_iter()
            .filter(|a| selected.contains(&a.url))
            .collect();

        info!(
            input = total,
            batches = total.div_ceil(batch_size),
            kept = kept.len(),
            "Triage complete"
        );
        Ok(kept)
    }
}

fn render_articles(articles: &[Article]) -> String {
    articles
        .iter()
        .map(|a| {
            let mut lines = vec![format!("- url: {}", a.url)];
            if let Some(title) = &a.title {
                lines.push(format!("  title: {title}"));
            }
            if let Some(description) = a.description.as_ref().or(a.snippet.as_ref()) {
                lines.push(format!("  summary: {description}"));
            }
            if let Some(date) = &a.published_date {
                lines.push(format!("  published: {date}"));
            }
            lines.join("\n")
        })
        .collect::<Vec<_>>()
        .join("\n")
}
