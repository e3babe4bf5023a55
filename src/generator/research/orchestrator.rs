use anyhow::Result;
use async_trait::async_trait;
use futures::FutureExt;
use futures::future::BoxFuture;
use tracing::{info, warn};

use super::ResearchRunner;
use crate::generator::context::ResearchContext;
use crate::generator::research::agents::learning_extractor::LearningExtractor;
use crate::generator::research::agents::query_planner::QueryPlanner;
use crate::generator::research::agents::scrape_filter::ScrapeFilterStage;
use crate::generator::research::agents::scraper::{Scraper, build_corpus};
use crate::generator::research::agents::search_gatherer::SearchGatherer;
use crate::generator::research::agents::triage::TriageStage;
use crate::generator::research::types::{
    IterationOutcome, IterationRecord, PlannedQuery, Progress, ResearchResult, ResearchState,
};
use crate::llm::StructuredCompletion;

/// Normal single-topic flow: one iteration per depth level.
///
/// plan → gather → triage → filter → scrape → extract, then recurse at half
/// breadth while depth remains. Empty gather or triage output ends the run
/// with whatever was accumulated, without an error.
#[derive(Debug, Default, Clone, Copy)]
pub struct RecursiveRunner;

impl RecursiveRunner {
    pub fn iterate<'a, L: StructuredCompletion>(
        &'a self,
        ctx: &'a ResearchContext<L>,
        query: String,
        state: ResearchState,
    ) -> BoxFuture<'a, Result<ResearchResult>> {
        async move {
            let mut state = state;
            let mut record = IterationRecord::new(ctx.run_id, &query, &state);
            info!(
                iteration = state.iteration,
                depth_remaining = state.depth_remaining,
                breadth = state.breadth,
                "Research iteration started"
            );

            let planned = QueryPlanner
                .execute(ctx, &query, state.breadth, &state.learnings)
                .await?;
            record.planned_queries = planned.clone();
            ctx.progress.report(&Progress {
                current_depth: state.depth_remaining,
                total_depth: state.total_depth,
                current_breadth: state.breadth,
                total_breadth: state.total_breadth,
                total_queries: planned.len(),
                completed_queries: 0,
                current_query: planned.first().map(|q| q.query.clone()),
            });

            let gathered = SearchGatherer.execute(ctx, &planned).await?;
            record.gathered = gathered.articles.clone();
            record.duplicate_hits = gathered.duplicates;
            if gathered.articles.is_empty() {
                return Ok(self.finish(ctx, record, IterationOutcome::EmptyAfterGather, state).await);
            }

            let goals = research_goals(&planned);
            let triaged = TriageStage.execute(ctx, gathered.articles, &goals).await?;
            record.triaged = triaged.clone();
            if triaged.is_empty() {
                return Ok(self.finish(ctx, record, IterationOutcome::EmptyAfterTriage, state).await);
            }

            let filtered = ScrapeFilterStage.execute(ctx, &triaged, &goals).await?;
            record.decisions = filtered.decisions.clone();

            let scraped = Scraper.execute(ctx, &filtered.to_scrape).await?;
            let gate = build_corpus(
                &scraped,
                &filtered.metadata_only,
                ctx.today,
                ctx.config.research.recency_window_days,
            );
            record.scraped = scraped;
            record.corpus_urls = gate.corpus.iter().map(|d| d.url.clone()).collect();

            let extracted = LearningExtractor.execute(ctx, &query, &gate.corpus).await?;
            record.learnings = extracted.learnings.clone();
            record.follow_up_questions = extracted.follow_up_questions.clone();

            state.learnings.extend(extracted.learnings);
            state.visited_urls.extend(record.corpus_urls.iter().cloned());

            if state.depth_remaining == 0 {
                return Ok(self.finish(ctx, record, IterationOutcome::Completed, state).await);
            }

            let next_query = next_query(&goals, &extracted.follow_up_questions);
            let next = state.descend();
            ctx.progress.report(&Progress {
                current_depth: next.depth_remaining,
                total_depth: next.total_depth,
                current_breadth: next.breadth,
                total_breadth: next.total_breadth,
                total_queries: planned.len(),
                completed_queries: planned.len(),
                current_query: Some(next_query.clone()),
            });
            forward_record(ctx, &record).await;

            self.iterate(ctx, next_query, next).await
        }
        .boxed()
    }

    async fn finish<L: StructuredCompletion>(
        &self,
        ctx: &ResearchContext<L>,
        mut record: IterationRecord,
        outcome: IterationOutcome,
        state: ResearchState,
    ) -> ResearchResult {
        record.outcome = outcome;
        info!(
            iteration = state.iteration,
            outcome = ?outcome,
            learnings = state.learnings.len(),
            visited_urls = state.visited_urls.len(),
            "Research finished"
        );
        forward_record(ctx, &record).await;
        state.into_result()
    }
}

#[async_trait]
impl<L: StructuredCompletion> ResearchRunner<L> for RecursiveRunner {
    fn name(&self) -> &'static str {
        "recursive"
    }

    async fn run(
        &self,
        ctx: &ResearchContext<L>,
        query: &str,
        breadth: usize,
        depth: usize,
    ) -> Result<ResearchResult> {
        let state = ResearchState::new(query, breadth, depth);
        self.iterate(ctx, query.to_string(), state).await
    }
}

fn research_goals(planned: &[PlannedQuery]) -> Vec<String> {
    planned.iter().map(|q| q.research_goal.clone()).collect()
}

fn next_query(goals: &[String], follow_ups: &[String]) -> String {
    format!(
        "Previous research goals:\n{}\nFollow-up research directions:\n{}",
        goals.join("\n"),
        follow_ups.join("\n")
    )
}

async fn forward_record<L: StructuredCompletion>(
    ctx: &ResearchContext<L>,
    record: &IterationRecord,
) {
    let Some(sink) = &ctx.iteration_sink else {
        return;
    };
    if let Err(err) = sink.record(record).await {
        warn!(iteration = record.iteration, error = %err, "Failed to persist iteration record");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_query_joins_goals_and_follow_ups() {
        let query = next_query(
            &["goal a".to_string(), "goal b".to_string()],
            &["why did x happen?".to_string()],
        );
        assert!(query.contains("goal a\ngoal b"));
        assert!(query.ends_with("why did x happen?"));
    }
}
