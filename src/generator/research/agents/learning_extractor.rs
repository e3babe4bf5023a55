use anyhow::Result;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::AgentType;
use crate::generator::agent_executor::extract;
use crate::generator::context::ResearchContext;
use crate::generator::research::types::{CorpusDocument, LearningCategory};
use crate::llm::StructuredCompletion;
use crate::utils::text::dedup_by_containment;
use crate::utils::token_estimator::TokenEstimator;

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct ExtractedLearnings {
    /// Atomic facts, each starting with RECENT_CHANGE, LONG_TERM_TREND or CONTEXT
    pub learnings: Vec<String>,
    /// Questions worth researching next
    pub follow_up_questions: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ExtractionOutcome {
    pub learnings: Vec<String>,
    pub follow_up_questions: Vec<String>,
    pub timed_out_batches: usize,
}

/// Distils learnings and follow-up questions from the dated corpus.
#[derive(Default)]
pub struct LearningExtractor;

impl LearningExtractor {
    pub async fn execute<L: StructuredCompletion>(
        &self,
        ctx: &ResearchContext<L>,
        query: &str,
        corpus: &[CorpusDocument],
    ) -> Result<ExtractionOutcome> {
        let mut outcome = ExtractionOutcome::default();
        if corpus.is_empty() {
            return Ok(outcome);
        }

        let research = &ctx.config.research;
        let batch_size = research.extraction_batch_size.max(1);
        let timeout = Duration::from_secs(ctx.config.llm.timeout_seconds);
        let estimator = TokenEstimator::new();

        let mut learnings = Vec::new();
        let mut follow_ups = Vec::new();

        for (batch_index, batch) in corpus.chunks(batch_size).enumerate() {
            let prompt_sys = format!(
                r#"You are a financial analyst extracting facts from dated source documents. Today is {today}.
Each learning must be one self-contained, atomic fact with concrete entities, numbers and dates where the source gives them.
Start every learning with exactly one of these tags:
- {recent}: something that changed in the last 7 days
- {trend}: a multi-month or multi-year direction
- {context}: background needed to interpret the recent changes
Do not repeat facts, and never state anything the documents do not support."#,
                today = ctx.today.format("%Y-%m-%d"),
                recent = LearningCategory::RecentChange.tag(),
                trend = LearningCategory::LongTermTrend.tag(),
                context = LearningCategory::Context.tag(),
            );
            let prompt_user = format!(
                "Extract at most {k} learnings and at most {m} follow-up questions about the research topic from the documents below.\n<topic>\n{query}\n</topic>\n<documents>\n{documents}\n</documents>",
                k = research.learnings_per_batch,
                m = research.follow_ups_per_batch,
                documents = render_documents(&estimator, batch, research.document_token_cap),
            );

            let params = AgentType::LearningExtractor.params(prompt_sys, prompt_user);
            let extracted: ExtractedLearnings =
                match tokio::time::timeout(timeout, extract(ctx, params)).await {
                    Ok(result) => result?,
                    Err(_) => {
                        warn!(
                            batch = batch_index,
                            documents = batch.len(),
                            timeout_seconds = timeout.as_secs(),
                            "Learning extraction timed out, skipping batch"
                        );
                        outcome.timed_out_batches += 1;
                        continue;
                    }
                };

            debug!(
                batch = batch_index,
                learnings = extracted.learnings.len(),
                follow_ups = extracted.follow_up_questions.len(),
                "Learning batch answered"
            );
            learnings.extend(
                extracted
                    .learnings
                    .into_iter()
                    .take(research.learnings_per_batch),
            );
            follow_ups.extend(
                extracted
                    .follow_up_questions
                    .into_iter()
                    .take(research.follow_ups_per_batch),
            );
        }

        outcome.learnings = dedup_by_containment(learnings);
        outcome.follow_up_questions = dedup_by_containment(follow_ups);

        let untagged = outcome
            .learnings
            .iter()
            .filter(|l| LearningCategory::of(l).is_none())
            .count();
        info!(
            documents = corpus.len(),
            learnings = outcome.learnings.len(),
            untagged,
            follow_ups = outcome.follow_up_questions.len(),
            timed_out_batches = outcome.timed_out_batches,
            "Learning extraction complete"
        );
        Ok(outcome)
    }
}

/// Each document is capped individually before it joins the prompt.
fn render_documents(estimator: &TokenEstimator, batch: &[CorpusDocument], token_cap: usize) -> String {
    batch
        .iter()
        .map(|doc| {
            format!(
                "<document url=\"{}\" published=\"{}\">\n{}\n</document>",
                doc.url,
                doc.published_date.format("%Y-%m-%d"),
                estimator.truncate_to_tokens(&doc.markdown, token_cap)
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_documents_are_capped_individually() {
        let estimator = TokenEstimator::new();
        let date = NaiveDate::from_ymd_opt(2026, 1, 5).unwrap();
        let batch = vec![
            CorpusDocument {
                url: "https://a.com/long".to_string(),
                markdown: "word ".repeat(5_000),
                published_date: date,
                metadata_only: false,
            },
            CorpusDocument {
                url: "https://b.com/short".to_string(),
                markdown: "short body".to_string(),
                published_date: date,
                metadata_only: true,
            },
        ];

        let rendered = render_documents(&estimator, &batch, 200);
        assert!(rendered.contains("published=\"2026-01-05\""));
        assert!(rendered.contains("short body"));
        assert!(rendered.len() < 2_000);
    }
}
