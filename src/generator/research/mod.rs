//! Recursive deep-research pipeline.
//!
//! A run is classified once, up front: a query naming enough distinct holdings
//! runs through [`PortfolioRunner`], anything else through [`RecursiveRunner`].

use anyhow::Result;
use async_trait::async_trait;
use tracing::info;

use crate::config::ResearchConfig;
use crate::generator::context::ResearchContext;
use crate::llm::StructuredCompletion;

pub mod agents;
pub mod orchestrator;
pub mod portfolio;
pub mod progress;
pub mod retry;
pub mod types;

pub use orchestrator::RecursiveRunner;
pub use portfolio::PortfolioRunner;
pub use types::ResearchResult;

/// A research strategy.
#[async_trait]
pub trait ResearchRunner<L: StructuredCompletion>: Send + Sync {
    fn name(&self) -> &'static str;

    async fn run(
        &self,
        ctx: &ResearchContext<L>,
        query: &str,
        breadth: usize,
        depth: usize,
    ) -> Result<ResearchResult>;
}

/// Pick the strategy for `query`.
pub fn select_runner<L>(config: &ResearchConfig, query: &str) -> Box<dyn ResearchRunner<L>>
where
    L: StructuredCompletion + 'static,
{
    let holdings = portfolio::detect_holdings(query);
    if holdings.len() >= config.min_portfolio_holdings {
        Box::new(PortfolioRunner::new(holdings))
    } else {
        Box::new(RecursiveRunner)
    }
}

/// Research `query` and return the accumulated learnings and source URLs.
pub async fn deep_research<L>(
    ctx: &ResearchContext<L>,
    query: &str,
    breadth: usize,
    depth: usize,
) -> Result<ResearchResult>
where
    L: StructuredCompletion + 'static,
{
    let runner = select_runner::<L>(&ctx.config.research, query);
    info!(
        run_id = %ctx.run_id,
        runner = runner.name(),
        breadth,
        depth,
        "Deep research started"
    );
    let result = runner.run(ctx, query, breadth, depth).await?;
    info!(
        run_id = %ctx.run_id,
        learnings = result.learnings.len(),
        visited_urls = result.visited_urls.len(),
        "Deep research finished"
    );
    Ok(result)
}
