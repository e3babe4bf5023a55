//! Firecrawl-compatible HTTP adapter for search and scrape.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use super::{ScrapeOptions, ScrapePage, ScrapeProvider, SearchHit, SearchProvider};
use crate::config::SearchProviderConfig;
use crate::error::ProviderError;

/// Field names under which scrape responses have been seen to carry the page body.
const MARKDOWN_FIELDS: [&str; 3] = ["markdown", "content", "text"];

const ERROR_BODY_PREVIEW: usize = 300;

pub struct FirecrawlClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

#[derive(Serialize)]
struct SearchRequest<'a> {
    query: &'a str,
    limit: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ScrapeRequest<'a> {
    url: &'a str,
    formats: [&'static str; 1],
    only_main_content: bool,
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    data: Vec<RawSearchHit>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSearchHit {
    url: String,
    title: Option<String>,
    description: Option<String>,
    snippet: Option<String>,
    #[serde(alias = "published_date", alias = "date")]
    published_date: Option<String>,
}

#[derive(Deserialize)]
struct ScrapeResponse {
    #[serde(default)]
    data: Value,
}

impl From<RawSearchHit> for SearchHit {
    fn from(raw: RawSearchHit) -> Self {
        SearchHit {
            url: raw.url,
            title: raw.title,
            description: raw.description,
            snippet: raw.snippet,
            published_date: raw.published_date,
        }
    }
}

impl FirecrawlClient {
    pub fn new(config: &SearchProviderConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()?;
        Ok(Self {
            http,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    async fn post<B, R>(&self, path: &str, body: &B) -> Result<R, ProviderError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| transport_error(path, e))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = parse_retry_after(response.headers(), Utc::now());
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(path, status, &body, retry_after));
        }

        response
            .json::<R>()
            .await
            .map_err(|e| ProviderError::new(format!("{path}: malformed response: {e}")))
    }
}

#[async_trait]
impl SearchProvider for FirecrawlClient {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, ProviderError> {
        let response: SearchResponse = self
            .post("/v1/search", &SearchRequest { query, limit })
            .await?;
        debug!(query, hits = response.data.len(), "Search response");
        Ok(response.data.into_iter().map(SearchHit::from).collect())
    }
}

#[async_trait]
impl ScrapeProvider for FirecrawlClient {
    async fn scrape(
        &self,
        url: &str,
        options: &ScrapeOptions,
    ) -> Result<ScrapePage, ProviderError> {
        let request = ScrapeRequest {
            url,
            formats: ["markdown"],
            only_main_content: options.main_content_only,
        };
        let response: ScrapeResponse = self.post("/v1/scrape", &request).await?;
        Ok(ScrapePage {
            markdown: resolve_markdown(&response.data),
        })
    }
}

/// First non-blank page body among the known field names.
fn resolve_markdown(data: &Value) -> Option<String> {
    MARKDOWN_FIELDS.iter().find_map(|field| {
        data.get(field)
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
            .map(str::to_string)
    })
}

/// `Retry-After` as delta-seconds or an HTTP date.
fn parse_retry_after(headers: &HeaderMap, now: DateTime<Utc>) -> Option<Duration> {
    let value = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();
    if let Ok(seconds) = value.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }
    let at = DateTime::parse_from_rfc2822(value).ok()?.with_timezone(&Utc);
    (at - now).to_std().ok()
}

fn status_error(
    path: &str,
    status: StatusCode,
    body: &str,
    retry_after: Option<Duration>,
) -> ProviderError {
    let preview: String = body.chars().take(ERROR_BODY_PREVIEW).collect();
    let error = ProviderError::with_status(status.as_u16(), format!("{path}: {preview}"));
    match retry_after {
        Some(delay) => error.retry_after(delay),
        None => error,
    }
}

fn transport_error(path: &str, error: reqwest::Error) -> ProviderError {
    let message = format!("{path}: {error}");
    match error.status() {
        Some(status) => ProviderError::with_status(status.as_u16(), message),
        None => ProviderError::new(message),
    }
}
