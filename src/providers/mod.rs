//! External search and scrape collaborators.
//!
//! Provider responses are normalized once, at the adapter boundary, into
//! [`SearchHit`] and [`ScrapePage`]; the pipeline never looks at raw provider
//! payloads.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;

pub mod firecrawl;

pub use firecrawl::FirecrawlClient;

/// One search result as returned by a search provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    pub url: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub snippet: Option<String>,
    /// Raw provider date text, parsed later by the date gate
    pub published_date: Option<String>,
}

impl SearchHit {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_published_date(mut self, date: impl Into<String>) -> Self {
        self.published_date = Some(date.into());
        self
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ScrapeOptions {
    pub main_content_only: bool,
}

impl Default for ScrapeOptions {
    fn default() -> Self {
        Self {
            main_content_only: true,
        }
    }
}

/// Normalized scrape result. `markdown` is `None` when the provider answered
/// but had no usable page body.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScrapePage {
    pub markdown: Option<String>,
}

#[async_trait]
pub trait SearchProvider: Send + Sync {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, ProviderError>;
}

#[async_trait]
pub trait ScrapeProvider: Send + Sync {
    /// Fetch `url` as markdown.
    async fn scrape(&self, url: &str, options: &ScrapeOptions)
    -> Result<ScrapePage, ProviderError>;
}
