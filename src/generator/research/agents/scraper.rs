use anyhow::Result;
use chrono::NaiveDate;
use futures::future::join_all;
use tracing::{debug, error, info, warn};

use crate::error::ResearchError;
use crate::generator::context::ResearchContext;
use crate::generator::research::retry::RetryingCaller;
use crate::generator::research::types::{CorpusDocument, MetadataOnlyItem, ScrapeTarget, ScrapedContent};
use crate::llm::StructuredCompletion;
use crate::providers::{ScrapeOptions, ScrapeProvider};
use crate::utils::dates::{
    is_within_window, parse_date_from_markdown, parse_date_from_text, parse_date_from_url,
};

/// Fetches every target concurrently and dates each page.
#[derive(Default)]
pub struct Scraper;

impl Scraper {
    /// One result per target, in target order. Per-page failures are captured
    /// in `ScrapedContent::error`; a credential-level failure (401/402/403) is
    /// raised once every scrape has settled.
    pub async fn execute<L: StructuredCompletion>(
        &self,
        ctx: &ResearchContext<L>,
        targets: &[ScrapeTarget],
    ) -> Result<Vec<ScrapedContent>> {
        let caller = ctx.retrying_caller();
        let options = ctx.scrape_options();
        let scan_chars = ctx.config.research.date_scan_chars;

        let scrapes = targets.iter().map(|target| {
            scrape_one(
                ctx.scraper.as_ref(),
                &caller,
                &options,
                &target.url,
                scan_chars,
                ctx.today,
            )
        });
        let scraped = join_all(scrapes)
            .await
            .into_iter()
            .collect::<Result<Vec<_>, ResearchError>>()?;

        info!(
            targets = targets.len(),
            failed = scraped.iter().filter(|s| s.error.is_some()).count(),
            dated = scraped.iter().filter(|s| s.published_date.is_some()).count(),
            "Scrape complete"
        );
        Ok(scraped)
    }
}

async fn scrape_one(
    scraper: &dyn ScrapeProvider,
    caller: &RetryingCaller,
    options: &ScrapeOptions,
    url: &str,
    scan_chars: usize,
    today: NaiveDate,
) -> Result<ScrapedContent, ResearchError> {
    let label = format!("scrape {url}");
    match caller.call(&label, || scraper.scrape(url, options)).await {
        Ok(page) => {
            let published_date = page
                .markdown
                .as_deref()
                .and_then(|markdown| parse_date_from_markdown(markdown, scan_chars, today))
                .or_else(|| parse_date_from_url(url, today));
            debug!(url, date = ?published_date, has_markdown = page.markdown.is_some(), "Page scraped");
            Ok(ScrapedContent {
                url: url.to_string(),
                markdown: page.markdown,
                published_date,
                error: None,
            })
        }
        Err(err) if err.is_credential_failure() => {
            error!(url, error = %err, "Scrape provider rejected the credentials");
            Err(err)
        }
        Err(err) => {
            warn!(url, error = %err, "Scrape failed, dropping page");
            Ok(ScrapedContent {
                url: url.to_string(),
                markdown: None,
                published_date: None,
                error: Some(err.to_string()),
            })
        }
    }
}

/// What the recency gate admitted and why the rest was dropped.
#[derive(Debug, Clone, Default)]
pub struct GateOutcome {
    pub corpus: Vec<CorpusDocument>,
    pub dropped_failed: usize,
    pub dropped_undated: usize,
    pub dropped_stale: usize,
}

/// Recency gate: only dated documents reach extraction.
///
/// Scraped pages need a body and a date. Metadata-only items are dated from
/// the provider's date text, then their title/description, then their URL.
/// With `window_days` set, dates older than the window are dropped too.
pub fn build_corpus(
    scraped: &[ScrapedContent],
    metadata_only: &[MetadataOnlyItem],
    today: NaiveDate,
    window_days: Option<i64>,
) -> GateOutcome {
    let mut outcome = GateOutcome::default();

    let admit = |outcome: &mut GateOutcome, document: CorpusDocument| match window_days {
        Some(days) if !is_within_window(document.published_date, today, days) => {
            outcome.dropped_stale += 1;
        }
        _ => outcome.corpus.push(document),
    };

    for item in scraped {
        let Some(markdown) = item.markdown.as_ref().filter(|m| !m.trim().is_empty()) else {
            outcome.dropped_failed += 1;
            continue;
        };
        let Some(published_date) = item.published_date else {
            outcome.dropped_undated += 1;
            continue;
        };
        admit(
            &mut outcome,
            CorpusDocument {
                url: item.url.clone(),
                markdown: markdown.clone(),
                published_date,
                metadata_only: false,
            },
        );
    }

    for item in metadata_only {
        let Some(markdown) = metadata_markdown(item) else {
            outcome.dropped_failed += 1;
            continue;
        };
        let Some(published_date) = metadata_date(item, today) else {
            outcome.dropped_undated += 1;
            continue;
        };
        admit(
            &mut outcome,
            CorpusDocument {
                url: item.url.clone(),
                markdown,
                published_date,
                metadata_only: true,
            },
        );
    }

    info!(
        admitted = outcome.corpus.len(),
        dropped_failed = outcome.dropped_failed,
        dropped_undated = outcome.dropped_undated,
        dropped_stale = outcome.dropped_stale,
        "Recency gate applied"
    );
    outcome
}

fn metadata_markdown(item: &MetadataOnlyItem) -> Option<String> {
    match (item.title.as_deref(), item.description.as_deref()) {
        (Some(title), Some(description)) => Some(format!("# {title}\n\n{description}")),
        (Some(title), None) => Some(format!("# {title}")),
        (None, Some(description)) => Some(description.to_string()),
        (None, None) => None,
    }
}

fn metadata_date(item: &MetadataOnlyItem, today: NaiveDate) -> Option<NaiveDate> {
    item.published_date
        .as_deref()
        .and_then(|text| parse_date_from_text(text, today))
        .or_else(|| {
            item.title
                .as_deref()
                .and_then(|text| parse_date_from_text(text, today))
        })
        .or_else(|| {
            item.description
                .as_deref()
                .and_then(|text| parse_date_from_text(text, today))
        })
        .or_else(|| parse_date_from_url(&item.url, today))
}
