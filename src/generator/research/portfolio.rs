//! Portfolio fan-out: one independent sub-run per holding.

use anyhow::Result;
use async_trait::async_trait;
use futures::future::join_all;
use regex::Regex;
use std::collections::HashSet;
use std::fmt::Display;
use std::sync::LazyLock;
use tracing::{info, warn};

use super::ResearchRunner;
use crate::error::ResearchError;
use crate::generator::context::ResearchContext;
use crate::generator::research::orchestrator::RecursiveRunner;
use crate::generator::research::types::{ResearchResult, ResearchState};
use crate::llm::StructuredCompletion;

/// External macro-economic scan appended to portfolio runs.
#[async_trait]
pub trait MacroScanner: Send + Sync {
    async fn scan(&self, query: &str) -> Result<ResearchResult>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetType {
    Stock,
    Crypto,
    Commodity,
    RealEstate,
}

impl Display for AssetType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            AssetType::Stock => "stock",
            AssetType::Crypto => "crypto",
            AssetType::Commodity => "commodity",
            AssetType::RealEstate => "real_estate",
        };
        write!(f, "{}", name)
    }
}

impl AssetType {
    fn parse(label: &str) -> Option<Self> {
        let label = label.to_ascii_lowercase();
        let label = label.trim();
        if label.starts_with("stock") || label.starts_with("equit") || label.starts_with("share") {
            Some(AssetType::Stock)
        } else if label.starts_with("crypto") || label.starts_with("coin") || label.starts_with("token") {
            Some(AssetType::Crypto)
        } else if label.starts_with("commodit") {
            Some(AssetType::Commodity)
        } else if label.starts_with("real") || label.starts_with("reit") {
            Some(AssetType::RealEstate)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Holding {
    pub symbol: String,
    pub asset_type: AssetType,
    pub name: Option<String>,
}

impl Holding {
    /// Type-specific search topic for this holding's sub-run.
    pub fn research_query(&self) -> String {
        let named = match &self.name {
            Some(name) => format!("{} ({})", self.symbol, name),
            None => self.symbol.clone(),
        };
        match self.asset_type {
            AssetType::Stock => format!(
                "{named} stock: latest earnings results and guidance, SEC filings (10-K, 10-Q, 8-K), analyst rating changes and material company news"
            ),
            AssetType::Crypto => {
                let common = self
                    .name
                    .clone()
                    .or_else(|| crypto_common_name(&self.symbol).map(str::to_string));
                match common {
                    Some(common) => format!(
                        "{} {common} cryptocurrency: price action, ETF and exchange flows, regulation and network developments",
                        self.symbol
                    ),
                    None => format!(
                        "{} cryptocurrency: price action, ETF and exchange flows, regulation and network developments",
                        self.symbol
                    ),
                }
            }
            AssetType::Commodity => format!(
                "{named} commodity: spot and futures price moves, supply and demand balance, inventories, production and export data"
            ),
            AssetType::RealEstate => format!(
                "{named} REIT: occupancy and leasing, funds from operations (FFO), dividend changes, property acquisitions and sales"
            ),
        }
    }
}

fn crypto_common_name(symbol: &str) -> Option<&'static str> {
    let name = match symbol {
        "BTC" => "Bitcoin",
        "ETH" => "Ethereum",
        "SOL" => "Solana",
        "XRP" => "Ripple",
        "ADA" => "Cardano",
        "DOGE" => "Dogecoin",
        "DOT" => "Polkadot",
        "AVAX" => "Avalanche",
        "LINK" => "Chainlink",
        "LTC" => "Litecoin",
        "BNB" => "BNB",
        "MATIC" | "POL" => "Polygon",
        _ => return None,
    };
    Some(name)
}

static HOLDING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b([A-Z][A-Z0-9.\-]{0,9})\s*\(\s*((?i:stocks?|equity|equities|shares?|crypto(?:currency|currencies)?|coins?|tokens?|commodity|commodities|real[\s-]?estate|reits?))\s*(?::\s*([^)]*?))?\s*\)",
    )
    .expect("holding pattern is static and valid")
});

static MACRO_TERMS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(fed|federal reserve|inflation|currenc(?:y|ies)|geopolitic\w*|central banks?)\b")
        .expect("macro pattern is static and valid")
});

/// Distinct `SYMBOL (Type[: Name])` holdings in first-seen order.
pub fn detect_holdings(query: &str) -> Vec<Holding> {
    let mut seen = HashSet::new();
    HOLDING
        .captures_iter(query)
        .filter_map(|caps| {
            let symbol = caps.get(1)?.as_str().to_string();
            let asset_type = AssetType::parse(caps.get(2)?.as_str())?;
            let name = caps
                .get(3)
                .map(|m| m.as_str().trim().to_string())
                .filter(|n| !n.is_empty());
            Some(Holding {
                symbol,
                asset_type,
                name,
            })
        })
        .filter(|holding| seen.insert(holding.symbol.clone()))
        .collect()
}

pub fn mentions_macro(query: &str) -> bool {
    MACRO_TERMS.is_match(query)
}

/// Runs every holding as an independent recursive sub-run and concatenates
/// the results in holding order, followed by the optional macro scan.
#[derive(Debug, Clone)]
pub struct PortfolioRunner {
    holdings: Vec<Holding>,
}

impl PortfolioRunner {
    pub fn new(holdings: Vec<Holding>) -> Self {
        Self { holdings }
    }

    pub fn holding_breadth(&self, total_breadth: usize, min_breadth: usize) -> usize {
        (total_breadth / self.holdings.len().max(1)).max(min_breadth)
    }
}

#[async_trait]
impl<L: StructuredCompletion> ResearchRunner<L> for PortfolioRunner {
    fn name(&self) -> &'static str {
        "portfolio"
    }

    /// `depth` is ignored: each holding runs at the configured holding depth.
    async fn run(
        &self,
        ctx: &ResearchContext<L>,
        query: &str,
        breadth: usize,
        _depth: usize,
    ) -> Result<ResearchResult> {
        let research = &ctx.config.research;
        let sub_breadth = self.holding_breadth(breadth, research.min_holding_breadth);
        let sub_depth = research.holding_depth;
        info!(
            holdings = self.holdings.len(),
            breadth = sub_breadth,
            depth = sub_depth,
            "Portfolio fan-out"
        );

        let runner = RecursiveRunner;
        let sub_runs = self.holdings.iter().map(|holding| {
            let topic = holding.research_query();
            let mut state = ResearchState::new(topic.clone(), sub_breadth, sub_depth);
            state.iteration = 1;
            runner.iterate(ctx, topic, state)
        });
        let outcomes = join_all(sub_runs).await;

        let mut result = ResearchResult::default();
        for (holding, outcome) in self.holdings.iter().zip(outcomes) {
            match outcome {
                Ok(sub) => {
                    info!(
                        symbol = %holding.symbol,
                        asset_type = %holding.asset_type,
                        learnings = sub.learnings.len(),
                        "Holding research finished"
                    );
                    result.append(sub);
                }
                Err(err)
                    if err
                        .downcast_ref::<ResearchError>()
                        .is_some_and(ResearchError::is_credential_failure) =>
                {
                    return Err(err);
                }
                Err(err) => {
                    warn!(symbol = %holding.symbol, error = %err, "Holding research failed, skipping");
                }
            }
        }

        if mentions_macro(query) {
            match &ctx.macro_scanner {
                Some(scanner) => match scanner.scan(query).await {
                    Ok(sub) => result.append(sub),
                    Err(err) => warn!(error = %err, "Macro scan failed, skipping"),
                },
                None => info!("Query mentions macro themes but no macro scanner is configured"),
            }
        }

        Ok(result)
    }
}
