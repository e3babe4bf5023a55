use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::NaiveDate;
use deep_research::config::Config;
use deep_research::error::{ProviderError, ResearchError};
use deep_research::generator::context::ResearchContext;
use deep_research::generator::research::deep_research;
use deep_research::generator::research::portfolio::MacroScanner;
use deep_research::generator::research::progress::IterationSink;
use deep_research::generator::research::types::{
    IterationOutcome, IterationRecord, Progress, ResearchResult,
};
use deep_research::llm::{AgentExecuteParams, StructuredCompletion};
use deep_research::providers::{
    ScrapeOptions, ScrapePage, ScrapeProvider, SearchHit, SearchProvider,
};
use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

type LlmHandler = Box<dyn Fn(&AgentExecuteParams) -> Result<Value> + Send + Sync>;

/// Completion fake that answers by stage tag and records every call.
struct ScriptedLlm {
    handlers: HashMap<String, LlmHandler>,
    calls: Mutex<Vec<AgentExecuteParams>>,
}

impl ScriptedLlm {
    /// Plans exactly the requested number of queries, keeps every article,
    /// leaves clustering to the singleton fallback and emits one learning per
    /// document.
    fn standard() -> Self {
        let mut llm = Self {
            handlers: HashMap::new(),
            calls: Mutex::new(Vec::new()),
        };
        llm = llm.with("query_planner", |params| {
            let count = requested_count(&params.prompt_user);
            let topic = topic_of(&params.prompt_user);
            let queries: Vec<Value> = (0..count)
                .map(|i| {
                    json!({
                        "query": format!("{topic} #{i}"),
                        "research_goal": format!("goal {i} for {topic}"),
                    })
                })
                .collect();
            Ok(json!({ "queries": queries }))
        });
        llm = llm.with("triage", |params| {
            Ok(json!({ "relevant_urls": listed_urls(&params.prompt_user) }))
        });
        llm = llm.with("scrape_filter", |_| Ok(json!({ "story_groups": [] })));
        llm.with("learning_extractor", |params| {
            let urls = document_urls(&params.prompt_user);
            Ok(json!({
                "learnings": urls.iter().map(|u| format!("RECENT_CHANGE: fact from <{u}>")).collect::<Vec<_>>(),
                "follow_up_questions": urls.iter().map(|u| format!("what next for <{u}>?")).collect::<Vec<_>>(),
            }))
        })
    }

    fn with<F>(mut self, tag: &str, handler: F) -> Self
    where
        F: Fn(&AgentExecuteParams) -> Result<Value> + Send + Sync + 'static,
    {
        self.handlers.insert(tag.to_string(), Box::new(handler));
        self
    }

    fn calls_for(&self, tag: &str) -> Vec<AgentExecuteParams> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.log_tag == tag)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl StructuredCompletion for ScriptedLlm {
    async fn extract<T>(&self, params: &AgentExecuteParams) -> Result<T>
    where
        T: JsonSchema + for<'a> Deserialize<'a> + Serialize + Send + Sync + 'static,
    {
        self.calls.lock().unwrap().push(params.clone());
        let handler = self
            .handlers
            .get(&params.log_tag)
            .ok_or_else(|| anyhow!("no handler for {}", params.log_tag))?;
        let value = handler(params)?;
        Ok(serde_json::from_value(value)?)
    }
}

type SearchResponder = Box<dyn Fn(&str) -> Result<Vec<SearchHit>, ProviderError> + Send + Sync>;

struct FakeSearch {
    responder: SearchResponder,
    calls: Mutex<Vec<String>>,
}

impl FakeSearch {
    fn new<F>(responder: F) -> Arc<Self>
    where
        F: Fn(&str) -> Result<Vec<SearchHit>, ProviderError> + Send + Sync + 'static,
    {
        Arc::new(Self {
            responder: Box::new(responder),
            calls: Mutex::new(Vec::new()),
        })
    }

    /// One fresh, URL-dated article per query.
    fn unique_dated() -> Arc<Self> {
        let counter = AtomicUsize::new(0);
        Self::new(move |_| {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            Ok(vec![
                SearchHit::new(format!("https://news.example.com/2026/01/05/story-{n}"))
                    .with_title(format!("Story {n}")),
            ])
        })
    }

    fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl SearchProvider for FakeSearch {
    async fn search(&self, query: &str, _limit: usize) -> Result<Vec<SearchHit>, ProviderError> {
        self.calls.lock().unwrap().push(query.to_string());
        (self.responder)(query)
    }
}

type ScrapeResponder = Box<dyn Fn(&str) -> Result<ScrapePage, ProviderError> + Send + Sync>;

struct FakeScraper {
    responder: ScrapeResponder,
    calls: Mutex<Vec<String>>,
}

impl FakeScraper {
    fn new<F>(responder: F) -> Arc<Self>
    where
        F: Fn(&str) -> Result<ScrapePage, ProviderError> + Send + Sync + 'static,
    {
        Arc::new(Self {
            responder: Box::new(responder),
            calls: Mutex::new(Vec::new()),
        })
    }

    fn dated() -> Arc<Self> {
        Self::new(|url| {
            Ok(ScrapePage {
                markdown: Some(format!("Published January 5, 2026\n\nFull story at {url}")),
            })
        })
    }

    fn calls_for(&self, fragment: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|u| u.contains(fragment))
            .count()
    }
}

#[async_trait]
impl ScrapeProvider for FakeScraper {
    async fn scrape(
        &self,
        url: &str,
        _options: &ScrapeOptions,
    ) -> Result<ScrapePage, ProviderError> {
        self.calls.lock().unwrap().push(url.to_string());
        (self.responder)(url)
    }
}

#[derive(Default)]
struct CollectingSink {
    records: Mutex<Vec<IterationRecord>>,
}

#[async_trait]
impl IterationSink for CollectingSink {
    async fn record(&self, record: &IterationRecord) -> Result<()> {
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }
}

impl CollectingSink {
    fn records(&self) -> Vec<IterationRecord> {
        self.records.lock().unwrap().clone()
    }
}

struct FixedMacroScan;

#[async_trait]
impl MacroScanner for FixedMacroScan {
    async fn scan(&self, _query: &str) -> Result<ResearchResult> {
        Ok(ResearchResult {
            learnings: vec!["CONTEXT: policy rates on hold".to_string()],
            visited_urls: vec!["https://central-bank.example.org/statement".to_string()],
        })
    }
}

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 1, 10).unwrap()
}

fn context(
    llm: &Arc<ScriptedLlm>,
    search: &Arc<FakeSearch>,
    scraper: &Arc<FakeScraper>,
) -> ResearchContext<ScriptedLlm> {
    let mut config = Config::default();
    config.cache.enabled = false;
    ResearchContext::new(config, llm.clone(), search.clone(), scraper.clone()).with_today(today())
}

fn requested_count(prompt: &str) -> usize {
    let re = Regex::new(r"Produce at most (\d+) search queries").unwrap();
    re.captures(prompt).unwrap()[1].parse().unwrap()
}

fn topic_of(prompt: &str) -> String {
    let start = prompt.find("<topic>\n").unwrap() + "<topic>\n".len();
    let end = prompt.find("\n</topic>").unwrap();
    prompt[start..end].to_string()
}

fn listed_urls(prompt: &str) -> Vec<String> {
    prompt
        .lines()
        .filter_map(|line| line.trim_start().strip_prefix("- url: "))
        .map(str::to_string)
        .collect()
}

fn document_urls(prompt: &str) -> Vec<String> {
    let re = Regex::new(r#"<document url="([^"]+)""#).unwrap();
    re.captures_iter(prompt).map(|c| c[1].to_string()).collect()
}

#[tokio::test]
async fn test_recursion_runs_depth_plus_one_iterations_with_halving_breadth() {
    let llm = Arc::new(ScriptedLlm::standard());
    let search = FakeSearch::unique_dated();
    let scraper = FakeScraper::dated();
    let sink = Arc::new(CollectingSink::default());
    let (progress_tx, mut progress_rx) = mpsc::unbounded_channel::<Progress>();

    let ctx = context(&llm, &search, &scraper)
        .with_iteration_sink(sink.clone())
        .with_progress(Arc::new(progress_tx));

    let result = deep_research(&ctx, "copper supply outlook", 4, 2).await.unwrap();

    let requested: Vec<usize> = llm
        .calls_for("query_planner")
        .iter()
        .map(|p| requested_count(&p.prompt_user))
        .collect();
    assert_eq!(requested, vec![4, 2, 1]);

    let records = sink.records();
    assert_eq!(records.len(), 3);
    assert_eq!(
        records.iter().map(|r| r.breadth).collect::<Vec<_>>(),
        vec![4, 2, 1]
    );
    assert_eq!(
        records.iter().map(|r| r.depth_remaining).collect::<Vec<_>>(),
        vec![2, 1, 0]
    );
    assert!(records.iter().all(|r| r.outcome == IterationOutcome::Completed));
    assert!(records.iter().all(|r| r.run_id == ctx.run_id));

    assert_eq!(result.learnings.len(), 7);
    assert_eq!(result.visited_urls.len(), 7);
    assert!(result.learnings.iter().all(|l| l.starts_with("RECENT_CHANGE")));

    // follow-ups of one iteration seed the next topic
    let second_topic = topic_of(&llm.calls_for("query_planner")[1].prompt_user);
    assert!(second_topic.contains("goal 0 for copper supply outlook"));
    assert!(second_topic.contains("what next for <https://news.example.com/2026/01/05/story-"));

    let mut snapshots = Vec::new();
    while let Ok(progress) = progress_rx.try_recv() {
        snapshots.push(progress);
    }
    assert_eq!(snapshots.len(), 5);
    assert_eq!(snapshots[0].current_breadth, 4);
    assert_eq!(snapshots[0].total_queries, 4);
    assert_eq!(snapshots[0].completed_queries, 0);
    assert_eq!(snapshots[1].current_depth, 1);
    assert_eq!(snapshots[1].completed_queries, 4);
    assert_eq!(snapshots[4].current_breadth, 1);
    assert!(snapshots.iter().all(|p| p.total_depth == 2 && p.total_breadth == 4));
}

#[tokio::test]
async fn test_same_url_from_two_queries_is_gathered_once() {
    let llm = Arc::new(ScriptedLlm::standard());
    let search = FakeSearch::new(|_| {
        Ok(vec![
            SearchHit::new("https://news.example.com/2026/01/05/fed-holds?utm_source=feed")
                .with_title("Fed holds"),
        ])
    });
    let scraper = FakeScraper::dated();
    let sink = Arc::new(CollectingSink::default());
    let ctx = context(&llm, &search, &scraper).with_iteration_sink(sink.clone());

    let result = deep_research(&ctx, "rates outlook", 2, 0).await.unwrap();

    let record = &sink.records()[0];
    assert_eq!(record.gathered.len(), 1);
    assert_eq!(record.duplicate_hits, 1);
    assert_eq!(record.gathered[0].url, "https://news.example.com/2026/01/05/fed-holds");
    assert_eq!(record.gathered[0].source_queries.len(), 2);
    assert_eq!(scraper.calls_for("fed-holds"), 1);
    assert_eq!(result.visited_urls, vec!["https://news.example.com/2026/01/05/fed-holds"]);
}

#[tokio::test]
async fn test_date_gate_excludes_undated_pages() {
    let llm = Arc::new(ScriptedLlm::standard());
    let search = FakeSearch::new(|_| {
        Ok(vec![
            SearchHit::new("https://wire.example.com/markets/dated-story"),
            SearchHit::new("https://blog.example.com/undated-story"),
        ])
    });
    let scraper = FakeScraper::new(|url| {
        let markdown = if url.contains("undated") {
            "An evergreen explainer with no date".to_string()
        } else {
            "Published January 5, 2026\n\nCopper stocks fell".to_string()
        };
        Ok(ScrapePage {
            markdown: Some(markdown),
        })
    });
    let ctx = context(&llm, &search, &scraper);

    let result = deep_research(&ctx, "copper", 1, 0).await.unwrap();

    let extraction = llm.calls_for("learning_extractor");
    assert_eq!(extraction.len(), 1);
    assert_eq!(
        document_urls(&extraction[0].prompt_user),
        vec!["https://wire.example.com/markets/dated-story"]
    );
    assert_eq!(result.visited_urls, vec!["https://wire.example.com/markets/dated-story"]);
}

#[tokio::test]
async fn test_duplicate_story_is_used_as_metadata_only() {
    let llm = Arc::new(ScriptedLlm::standard().with("scrape_filter", |params| {
        let urls = listed_urls(&params.prompt_user);
        Ok(json!({
            "story_groups": [{
                "group_id": "opec",
                "articles": urls.iter().enumerate().map(|(i, url)| json!({
                    "url": url,
                    "is_best_source": i == 0,
                    "needs_scraping": true,
                    "reason": "primary wire report",
                })).collect::<Vec<_>>(),
            }]
        }))
    }));
    let search = FakeSearch::new(|_| {
        Ok(vec![
            SearchHit::new("https://wire.example.com/opec-cut").with_title("OPEC+ extends cuts"),
            SearchHit::new("https://echo.example.com/opec")
                .with_title("OPEC+ cuts again")
                .with_description("Output cuts extended through March")
                .with_published_date("2026-01-04"),
        ])
    });
    let scraper = FakeScraper::dated();
    let sink = Arc::new(CollectingSink::default());
    let ctx = context(&llm, &search, &scraper).with_iteration_sink(sink.clone());

    let result = deep_research(&ctx, "oil supply", 1, 0).await.unwrap();

    assert_eq!(scraper.calls_for("echo.example.com"), 0);
    let record = &sink.records()[0];
    let duplicate = record
        .decisions
        .iter()
        .find(|d| d.url == "https://echo.example.com/opec")
        .unwrap();
    assert!(!duplicate.to_scrape);
    assert!(duplicate.reason.contains("duplicate story"));

    let prompt = &llm.calls_for("learning_extractor")[0].prompt_user;
    assert!(prompt.contains("# OPEC+ cuts again\n\nOutput cuts extended through March"));
    assert!(prompt.contains("published=\"2026-01-04\""));
    assert_eq!(result.visited_urls.len(), 2);
}

#[tokio::test]
async fn test_empty_gather_returns_empty_result() {
    let llm = Arc::new(ScriptedLlm::standard());
    let search = FakeSearch::new(|_| Ok(Vec::new()));
    let scraper = FakeScraper::dated();
    let sink = Arc::new(CollectingSink::default());
    let ctx = context(&llm, &search, &scraper).with_iteration_sink(sink.clone());

    let result = deep_research(&ctx, "obscure topic", 3, 2).await.unwrap();

    assert!(result.is_empty());
    assert!(llm.calls_for("triage").is_empty());
    let records = sink.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].outcome, IterationOutcome::EmptyAfterGather);
    assert_eq!(records[0].planned_queries.len(), 3);
}

#[tokio::test]
async fn test_empty_triage_returns_empty_result() {
    let llm = Arc::new(
        ScriptedLlm::standard().with("triage", |_| Ok(json!({ "relevant_urls": [] }))),
    );
    let search = FakeSearch::unique_dated();
    let scraper = FakeScraper::dated();
    let sink = Arc::new(CollectingSink::default());
    let ctx = context(&llm, &search, &scraper).with_iteration_sink(sink.clone());

    let result = deep_research(&ctx, "gold", 2, 1).await.unwrap();

    assert!(result.is_empty());
    assert!(llm.calls_for("scrape_filter").is_empty());
    assert_eq!(sink.records()[0].outcome, IterationOutcome::EmptyAfterTriage);
}

#[tokio::test]
async fn test_triage_batches_45_articles_into_two_calls() {
    let llm = Arc::new(ScriptedLlm::standard().with("triage", |params| {
        let mut urls = listed_urls(&params.prompt_user);
        // repeat a URL to exercise the union
        urls.push(urls[0].clone());
        urls.push("https://news.example.com/2026/01/05/story-0".to_string());
        Ok(json!({ "relevant_urls": urls }))
    }));
    let search = FakeSearch::new(|_| {
        Ok((0..45)
            .map(|i| SearchHit::new(format!("https://news.example.com/2026/01/05/story-{i}")))
            .collect())
    });
    let scraper = FakeScraper::dated();
    let sink = Arc::new(CollectingSink::default());
    let ctx = context(&llm, &search, &scraper).with_iteration_sink(sink.clone());

    deep_research(&ctx, "semiconductor tariffs", 1, 0).await.unwrap();

    assert_eq!(llm.calls_for("triage").len(), 2);
    let record = &sink.records()[0];
    assert_eq!(record.triaged.len(), 45);
    let unique: HashSet<&str> = record.triaged.iter().map(|a| a.url.as_str()).collect();
    assert_eq!(unique.len(), 45);
    // 45 documents in batches of 8
    assert_eq!(llm.calls_for("learning_extractor").len(), 6);
}

#[tokio::test]
async fn test_extraction_schema_failure_propagates() {
    let llm = Arc::new(ScriptedLlm::standard().with("triage", |_| Ok(json!({ "urls": 3 }))));
    let search = FakeSearch::unique_dated();
    let scraper = FakeScraper::dated();
    let ctx = context(&llm, &search, &scraper);

    let err = deep_research(&ctx, "gold", 1, 0).await.unwrap_err();

    match err.downcast_ref::<ResearchError>() {
        Some(ResearchError::ExtractionSchema { stage, .. }) => assert_eq!(stage, "triage"),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_payment_required_search_is_not_retried() {
    let llm = Arc::new(ScriptedLlm::standard());
    let search = FakeSearch::new(|_| Err(ProviderError::with_status(402, "payment required")));
    let scraper = FakeScraper::dated();
    let ctx = context(&llm, &search, &scraper);

    let err = deep_research(&ctx, "gold", 2, 2).await.unwrap_err();

    match err.downcast_ref::<ResearchError>() {
        Some(ResearchError::FatalProvider { source, .. }) => assert_eq!(source.status, Some(402)),
        other => panic!("unexpected error: {other:?}"),
    }
    // one attempt per planned query, and no later stage runs
    assert_eq!(search.call_count(), 2);
    assert!(llm.calls_for("triage").is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_unknown_status_search_degrades_to_no_results() {
    let llm = Arc::new(ScriptedLlm::standard());
    let search = FakeSearch::new(|_| Err(ProviderError::with_status(404, "not found")));
    let scraper = FakeScraper::dated();
    let sink = Arc::new(CollectingSink::default());
    let ctx = context(&llm, &search, &scraper).with_iteration_sink(sink.clone());

    let result = deep_research(&ctx, "gold", 2, 0).await.unwrap();

    assert_eq!(search.call_count(), 2);
    assert!(result.is_empty());
    assert_eq!(sink.records()[0].outcome, IterationOutcome::EmptyAfterGather);
}

#[tokio::test]
async fn test_forbidden_scrape_aborts_run() {
    let llm = Arc::new(ScriptedLlm::standard());
    let search = FakeSearch::unique_dated();
    let scraper = FakeScraper::new(|_| Err(ProviderError::with_status(403, "key revoked")));
    let ctx = context(&llm, &search, &scraper);

    let err = deep_research(&ctx, "gold", 1, 1).await.unwrap_err();

    match err.downcast_ref::<ResearchError>() {
        Some(ResearchError::FatalProvider { source, .. }) => assert_eq!(source.status, Some(403)),
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(llm.calls_for("learning_extractor").is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_transient_search_failure_is_retried() {
    let llm = Arc::new(ScriptedLlm::standard());
    let attempts = AtomicUsize::new(0);
    let search = FakeSearch::new(move |_| {
        if attempts.fetch_add(1, Ordering::SeqCst) < 2 {
            Err(ProviderError::with_status(503, "unavailable"))
        } else {
            Ok(vec![SearchHit::new("https://news.example.com/2026/01/05/recovered")])
        }
    });
    let scraper = FakeScraper::dated();
    let ctx = context(&llm, &search, &scraper);

    let result = deep_research(&ctx, "gold", 1, 0).await.unwrap();

    assert_eq!(search.call_count(), 3);
    assert_eq!(result.visited_urls, vec!["https://news.example.com/2026/01/05/recovered"]);
}

#[tokio::test(start_paused = true)]
async fn test_failed_scrape_does_not_abort_batch() {
    let llm = Arc::new(ScriptedLlm::standard());
    let search = FakeSearch::new(|_| {
        Ok(vec![
            SearchHit::new("https://news.example.com/2026/01/05/good"),
            SearchHit::new("https://news.example.com/2026/01/05/bad"),
        ])
    });
    let scraper = FakeScraper::new(|url| {
        if url.ends_with("bad") {
            Err(ProviderError::with_status(500, "upstream error"))
        } else {
            Ok(ScrapePage {
                markdown: Some("Published January 5, 2026\n\nGood page".to_string()),
            })
        }
    });
    let ctx = context(&llm, &search, &scraper);

    let result = deep_research(&ctx, "gold", 1, 0).await.unwrap();

    assert_eq!(scraper.calls_for("bad"), 4);
    assert_eq!(result.visited_urls, vec!["https://news.example.com/2026/01/05/good"]);
    assert_eq!(result.learnings.len(), 1);
}

/// Search answers per holding symbol; ETH coverage is empty.
fn portfolio_search() -> Arc<FakeSearch> {
    let counter = AtomicUsize::new(0);
    FakeSearch::new(move |query| {
        if query.contains("ETH") {
            return Ok(Vec::new());
        }
        let symbol = if query.contains("BTC") { "btc" } else { "nvda" };
        let n = counter.fetch_add(1, Ordering::SeqCst);
        Ok(vec![SearchHit::new(format!(
            "https://news.example.com/2026/01/05/{symbol}-{n}"
        ))])
    })
}

#[tokio::test]
async fn test_portfolio_survives_empty_holding() {
    let llm = Arc::new(ScriptedLlm::standard());
    let search = portfolio_search();
    let scraper = FakeScraper::dated();
    let ctx = context(&llm, &search, &scraper);

    let query = "BTC (Cryptocurrency), ETH (Cryptocurrency), NVDA (Stock)";
    let result = deep_research(&ctx, query, 6, 1).await.unwrap();

    let first_iteration_breadths: Vec<usize> = llm
        .calls_for("query_planner")
        .iter()
        .filter(|p| !topic_of(&p.prompt_user).starts_with("Previous research goals"))
        .map(|p| requested_count(&p.prompt_user))
        .collect();
    assert_eq!(first_iteration_breadths, vec![2, 2, 2]);
    // the raw portfolio query is never planned directly
    assert!(
        llm.calls_for("query_planner")
            .iter()
            .all(|p| topic_of(&p.prompt_user) != query)
    );

    assert!(!result.learnings.is_empty());
    assert!(result.learnings[0].contains("/btc-"));
    assert!(result.learnings.last().unwrap().contains("/nvda-"));
    assert!(result.learnings.iter().any(|l| l.contains("/nvda-")));
    assert!(result.learnings.iter().all(|l| !l.contains("eth")));
}

#[tokio::test]
async fn test_portfolio_skips_failed_holding_and_appends_macro_scan() {
    let llm = Arc::new(ScriptedLlm::standard().with("query_planner", |params| {
        let topic = topic_of(&params.prompt_user);
        if topic.contains("ETH") {
            return Err(anyhow!("model unavailable"));
        }
        Ok(json!({
            "queries": [{ "query": format!("{topic} #0"), "research_goal": format!("goal for {topic}") }]
        }))
    }));
    let search = portfolio_search();
    let scraper = FakeScraper::dated();
    let ctx = context(&llm, &search, &scraper).with_macro_scanner(Arc::new(FixedMacroScan));

    let query = "BTC (Crypto), ETH (Crypto), NVDA (Stock) ahead of the Fed decision";
    let result = deep_research(&ctx, query, 6, 1).await.unwrap();

    assert!(result.learnings.iter().any(|l| l.contains("/btc-")));
    assert!(result.learnings.iter().any(|l| l.contains("/nvda-")));
    assert_eq!(
        result.learnings.last().map(String::as_str),
        Some("CONTEXT: policy rates on hold")
    );
    assert_eq!(
        result.visited_urls.last().map(String::as_str),
        Some("https://central-bank.example.org/statement")
    );
}

#[tokio::test]
async fn test_portfolio_aborts_on_payment_required() {
    let llm = Arc::new(ScriptedLlm::standard());
    let search = FakeSearch::new(|query| {
        if query.contains("NVDA") {
            Err(ProviderError::with_status(402, "payment required"))
        } else {
            Ok(vec![SearchHit::new("https://news.example.com/2026/01/05/coin")])
        }
    });
    let scraper = FakeScraper::dated();
    let ctx = context(&llm, &search, &scraper);

    let query = "BTC (Cryptocurrency), ETH (Cryptocurrency), NVDA (Stock)";
    let err = deep_research(&ctx, query, 6, 1).await.unwrap_err();

    assert!(
        err.downcast_ref::<ResearchError>()
            .is_some_and(ResearchError::is_credential_failure)
    );
}

#[tokio::test]
async fn test_two_holdings_run_as_a_single_topic() {
    let llm = Arc::new(ScriptedLlm::standard());
    let search = FakeSearch::unique_dated();
    let scraper = FakeScraper::dated();
    let ctx = context(&llm, &search, &scraper);

    let query = "BTC (Cryptocurrency), NVDA (Stock)";
    deep_research(&ctx, query, 2, 0).await.unwrap();

    let planner = llm.calls_for("query_planner");
    assert_eq!(planner.len(), 1);
    assert_eq!(topic_of(&planner[0].prompt_user), query);
}
