use anyhow::Result;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

use crate::config::Config;
use crate::generator::context::ResearchContext;
use crate::generator::research::progress::JsonLinesIterationSink;
use crate::generator::research::{ResearchResult, deep_research};
use crate::llm::client::types::TokenUsage;
use crate::llm::{LLMClient, StructuredCompletion};
use crate::providers::FirecrawlClient;

/// Wall-clock timing of the workflow phases.
pub struct TimingScope {
    start_time: Instant,
    phase_start_times: HashMap<String, Instant>,
    phase_durations: HashMap<String, Duration>,
}

impl Default for TimingScope {
    fn default() -> Self {
        Self::new()
    }
}

impl TimingScope {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            phase_start_times: HashMap::new(),
            phase_durations: HashMap::new(),
        }
    }

    pub fn start_phase(&mut self, phase_name: &str) {
        self.phase_start_times
            .insert(phase_name.to_string(), Instant::now());
    }

    pub fn end_phase(&mut self, phase_name: &str) -> Option<Duration> {
        let duration = self.phase_start_times.remove(phase_name)?.elapsed();
        self.phase_durations
            .insert(phase_name.to_string(), duration);
        Some(duration)
    }

    pub fn total_duration(&self) -> Duration {
        self.start_time.elapsed()
    }

    pub fn phase_durations(&self) -> &HashMap<String, Duration> {
        &self.phase_durations
    }
}

pub struct TimingKeys;

impl TimingKeys {
    pub const RESEARCH: &'static str = "research";
    pub const OUTPUT: &'static str = "output";
}

/// What to research and where the answer goes.
#[derive(Debug, Clone)]
pub struct LaunchOptions {
    pub query: String,
    pub breadth: usize,
    pub depth: usize,
    /// `None` prints the result to stdout
    pub output: Option<PathBuf>,
    /// JSON-lines file receiving one record per iteration
    pub iterations_log: Option<PathBuf>,
}

/// Build the production collaborators, run the research and emit the result.
pub async fn launch(config: &Config, options: &LaunchOptions) -> Result<ResearchResult> {
    config.validate()?;

    let llm = Arc::new(LLMClient::new(config.llm.clone(), config.cache.clone())?);
    let firecrawl = Arc::new(FirecrawlClient::new(&config.search)?);

    let mut context = ResearchContext::new(config.clone(), Arc::clone(&llm), firecrawl.clone(), firecrawl);
    if let Some(path) = &options.iterations_log {
        context = context.with_iteration_sink(Arc::new(JsonLinesIterationSink::new(path)));
    }

    let mut timing = TimingScope::new();
    let result = run(&context, options, &mut timing).await?;

    let report = llm.cache().generate_performance_report();
    let saved = TokenUsage::new(report.input_tokens_saved, report.output_tokens_saved);
    info!(
        hit_rate = report.hit_rate,
        cache_hits = report.cache_hits,
        cache_misses = report.cache_misses,
        tokens_saved = saved.total_tokens,
        estimated_savings_usd = saved.estimate_cost(&config.llm.model_efficient),
        "LLM cache report"
    );
    info!(
        total_seconds = timing.total_duration().as_secs_f64(),
        "Workflow finished"
    );

    Ok(result)
}

/// Research and write the result, with any completion backend.
pub async fn run<L>(
    context: &ResearchContext<L>,
    options: &LaunchOptions,
    timing: &mut TimingScope,
) -> Result<ResearchResult>
where
    L: StructuredCompletion + 'static,
{
    timing.start_phase(TimingKeys::RESEARCH);
    let result = deep_research(context, &options.query, options.breadth, options.depth).await?;
    if let Some(elapsed) = timing.end_phase(TimingKeys::RESEARCH) {
        info!(seconds = elapsed.as_secs_f64(), "Research phase finished");
    }

    timing.start_phase(TimingKeys::OUTPUT);
    write_result(&result, options.output.as_deref()).await?;
    timing.end_phase(TimingKeys::OUTPUT);

    Ok(result)
}

/// `{learnings, visitedUrls}` as pretty JSON, to a file or stdout.
pub async fn write_result(result: &ResearchResult, output: Option<&Path>) -> Result<()> {
    let json = serde_json::to_string_pretty(result)?;
    match output {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(path, json).await?;
            info!(path = %path.display(), "Research result written");
        }
        None => println!("{json}"),
    }
    Ok(())
}
