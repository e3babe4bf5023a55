use anyhow::Result;
use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use tracing::info;

use super::AgentType;
use crate::generator::agent_executor::{extract, learnings_block};
use crate::generator::context::ResearchContext;
use crate::generator::research::types::PlannedQuery;
use crate::llm::StructuredCompletion;

/// Structured answer of the planning call.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct QueryPlan {
    /// Search queries, most important first
    pub queries: Vec<PlannedQuery>,
}

/// Topic family, used only to pick the planning prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopicDomain {
    Crypto,
    Etf,
    Commodity,
    Company,
    General,
}

fn keyword_regex(pattern: &str) -> Regex {
    Regex::new(pattern).expect("keyword patterns are static and valid")
}

static CRYPTO_TERMS: LazyLock<Regex> = LazyLock::new(|| {
    keyword_regex(r"(?i)\b(bitcoin|btc|ethereum|eth|solana|crypto(?:currency|currencies)?|stablecoins?|defi|altcoins?|blockchain)\b")
});

static ETF_TERMS: LazyLock<Regex> = LazyLock::new(|| {
    keyword_regex(r"(?i)\b(etfs?|index funds?|expense ratio|ishares|spdr|vanguard)\b")
});

static COMMODITY_TERMS: LazyLock<Regex> = LazyLock::new(|| {
    keyword_regex(r"(?i)\b(gold|silver|copper|platinum|crude|oil|brent|wti|natural gas|lng|wheat|corn|soybeans?|coffee|cocoa|lithium|uranium|commodit(?:y|ies))\b")
});

static COMPANY_TERMS: LazyLock<Regex> = LazyLock::new(|| {
    keyword_regex(r"(?i)\b(inc|corp|corporation|ltd|plc|earnings|shares|stock|revenue|guidance|ceo|nasdaq|nyse|ipo)\b")
});

impl TopicDomain {
    pub fn detect(topic: &str) -> Self {
        if CRYPTO_TERMS.is_match(topic) {
            TopicDomain::Crypto
        } else if ETF_TERMS.is_match(topic) {
            TopicDomain::Etf
        } else if COMMODITY_TERMS.is_match(topic) {
            TopicDomain::Commodity
        } else if COMPANY_TERMS.is_match(topic) {
            TopicDomain::Company
        } else {
            TopicDomain::General
        }
    }

    fn guidance(&self) -> &'static str {
        match self {
            TopicDomain::Crypto => {
                "The topic is a crypto asset. Cover price action, exchange and ETF flows, regulatory actions, protocol upgrades and on-chain activity. Search both the ticker symbol and the asset's common name."
            }
            TopicDomain::Etf => {
                "The topic is an exchange-traded fund. Cover fund flows, holdings and index changes, fee changes, and news on the largest underlying positions."
            }
            TopicDomain::Commodity => {
                "The topic is a commodity. Cover spot and futures prices, supply and demand balance, inventories, production and export data, and policy that moves the market."
            }
            TopicDomain::Company => {
                "The topic is a listed company. Cover earnings results and guidance, regulatory filings, management changes, analyst rating changes and material contracts."
            }
            TopicDomain::General => {
                "Cover the most recent concrete developments first, then the structural context that explains them."
            }
        }
    }
}

/// Plans up to `count` distinct search queries for a topic.
#[derive(Default)]
pub struct QueryPlanner;

impl QueryPlanner {
    pub async fn execute<L: StructuredCompletion>(
        &self,
        ctx: &ResearchContext<L>,
        topic: &str,
        count: usize,
        learnings: &[String],
    ) -> Result<Vec<PlannedQuery>> {
        if count == 0 {
            return Ok(Vec::new());
        }

        let domain = TopicDomain::detect(topic);
        let prompt_sys = format!(
            r#"You are an expert financial research analyst planning web searches. Today is {today}.
Focus on developments from the last 7 days; older material is useful only as context.
{guidance}
Every query must be specific and distinct from the others. For every query give a research goal that states what it should establish and which directions to pursue once results are in."#,
            today = ctx.today.format("%Y-%m-%d"),
            guidance = domain.guidance(),
        );
        let prompt_user = format!(
            "Produce at most {count} search queries for the following research topic. Return fewer if the topic is narrow.\n<topic>\n{topic}\n</topic>\n{learnings}",
            learnings = learnings_block(learnings),
        );

        let plan: QueryPlan =
            extract(ctx, AgentType::QueryPlanner.params(prompt_sys, prompt_user)).await?;

        let queries: Vec<PlannedQuery> = plan
            .queries
            .into_iter()
            .filter(|q| !q.query.trim().is_empty())
            .take(count)
            .collect();

        info!(
            stage = %AgentType::QueryPlanner,
            domain = ?domain,
            requested = count,
            planned = queries.len(),
            "Queries planned"
        );
        Ok(queries)
    }
}
