use anyhow::Result;
use std::collections::HashMap;
use tracing::{error, info, warn};

use crate::error::ResearchError;
use crate::generator::context::ResearchContext;
use crate::generator::research::retry::RetryingCaller;
use crate::generator::research::types::{Article, PlannedQuery};
use crate::llm::StructuredCompletion;
use crate::providers::{SearchHit, SearchProvider};
use crate::utils::threads::do_parallel_with_limit;
use crate::utils::urls::normalize_url;

#[derive(Debug, Clone, Default)]
pub struct GatherOutcome {
    /// One entry per distinct normalized URL, in first-seen order
    pub articles: Vec<Article>,
    pub total_hits: usize,
    pub duplicates: usize,
    pub failed_queries: usize,
}

/// Runs planned queries against the search provider and merges the hits.
#[derive(Default)]
pub struct SearchGatherer;

impl SearchGatherer {
    /// A query whose search ultimately fails contributes no hits. Only a
    /// credential-level failure (401/402/403) fails the gather as a whole, once
    /// every query has settled.
    pub async fn execute<L: StructuredCompletion>(
        &self,
        ctx: &ResearchContext<L>,
        queries: &[PlannedQuery],
    ) -> Result<GatherOutcome> {
        let caller = ctx.retrying_caller();
        let limit = ctx.config.search.result_limit;

        let searches: Vec<_> = queries
            .iter()
            .map(|planned| search_one(ctx.search.as_ref(), &caller, planned, limit))
            .collect();
        let results = do_parallel_with_limit(searches, ctx.config.search.concurrency)
            .await
            .into_iter()
            .collect::<Result<Vec<_>, ResearchError>>()?;

        let failed_queries = results.iter().filter(|r| r.is_none()).count();
        let per_query = queries
            .iter()
            .zip(results.into_iter().map(Option::unwrap_or_default));
        let outcome = merge_hits(per_query, failed_queries);

        info!(
            queries = queries.len(),
            failed_queries = outcome.failed_queries,
            hits = outcome.total_hits,
            unique = outcome.articles.len(),
            duplicates = outcome.duplicates,
            "Search gather complete"
        );
        Ok(outcome)
    }
}

async fn search_one(
    search: &dyn SearchProvider,
    caller: &RetryingCaller,
    planned: &PlannedQuery,
    limit: usize,
) -> Result<Option<Vec<SearchHit>>, ResearchError> {
    let label = format!("search \"{}\"", planned.query);
    match caller
        .call(&label, || search.search(&planned.query, limit))
        .await
    {
        Ok(hits) => Ok(Some(hits)),
        Err(err) if err.is_credential_failure() => {
            error!(query = %planned.query, error = %err, "Search provider rejected the credentials");
            Err(err)
        }
        Err(err) => {
            warn!(query = %planned.query, error = %err, "Search failed, continuing without its results");
            Ok(None)
        }
    }
}

/// Join-then-merge: URL identity decides duplicates; the first occurrence's
/// metadata wins and later occurrences only add provenance.
fn merge_hits<'a, I>(per_query: I, failed_queries: usize) -> GatherOutcome
where
    I: IntoIterator<Item = (&'a PlannedQuery, Vec<SearchHit>)>,
{
    let mut outcome = GatherOutcome {
        failed_queries,
        ..Default::default()
    };
    let mut index: HashMap<String, usize> = HashMap::new();

    for (planned, hits) in per_query {
        for hit in hits {
            outcome.total_hits += 1;
            let url = normalize_url(&hit.url);
            if url.is_empty() {
                continue;
            }
            match index.get(&url) {
                Some(&position) => {
                    outcome.duplicates += 1;
                    outcome.articles[position].add_provenance(planned);
                }
                None => {
                    index.insert(url.clone(), outcome.articles.len());
                    outcome.articles.push(Article::from_hit(url, hit, planned));
                }
            }
        }
    }

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;

    fn planned(query: &str) -> PlannedQuery {
        PlannedQuery {
            query: query.to_string(),
            research_goal: format!("goal of {query}"),
        }
    }

    #[test]
    fn test_same_url_from_two_queries_merges_provenance() {
        let first = planned("gold price");
        let second = planned("gold central banks");
        let outcome = merge_hits(
            vec![
                (
                    &first,
                    vec![
                        SearchHit::new("https://news.com/gold?utm_source=x").with_title("First title"),
                        SearchHit::new("https://other.com/a"),
                    ],
                ),
                (
                    &second,
                    vec![SearchHit::new("https://NEWS.com/gold/").with_title("Second title")],
                ),
            ],
            0,
        );

        assert_eq!(outcome.total_hits, 3);
        assert_eq!(outcome.duplicates, 1);
        assert_eq!(outcome.articles.len(), 2);

        let gold = &outcome.articles[0];
        assert_eq!(gold.url, "https://news.com/gold");
        assert_eq!(gold.title.as_deref(), Some("First title"));
        assert_eq!(gold.source_queries, vec!["gold price", "gold central banks"]);
        assert_eq!(gold.research_goals.len(), 2);
    }

    #[test]
    fn test_blank_urls_skipped() {
        let query = planned("q");
        let outcome = merge_hits(vec![(&query, vec![SearchHit::new("  ")])], 1);
        assert!(outcome.articles.is_empty());
        assert_eq!(outcome.failed_queries, 1);
    }
}
