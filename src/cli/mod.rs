use crate::config::{Config, LLMProvider};
use crate::generator::workflow::LaunchOptions;
use anyhow::{Context, Result, anyhow};
use clap::Parser;
use std::path::PathBuf;

pub const DEFAULT_CONFIG_FILE: &str = "deep-research.toml";
pub const LLM_API_KEY_ENV: &str = "DEEP_RESEARCH_LLM_API_KEY";
pub const SEARCH_API_KEY_ENV: &str = "DEEP_RESEARCH_SEARCH_API_KEY";

/// deep-research: recursive, recency-verified research over web search results
#[derive(Parser, Debug)]
#[command(name = "deep-research")]
#[command(
    about = "Turns a research topic into deduplicated, dated learnings and their source URLs by recursively planning searches, triaging and clustering coverage, scraping the best source per story and extracting facts with LLMs."
)]
#[command(version)]
pub struct Args {
    /// Research topic, or a portfolio such as "BTC (Cryptocurrency), NVDA (Stock), ..."
    #[arg(short, long)]
    pub query: String,

    /// Queries planned in the first iteration
    #[arg(short, long)]
    pub breadth: Option<usize>,

    /// Recursive iterations after the first
    #[arg(short, long)]
    pub depth: Option<usize>,

    /// Configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Result file; stdout when omitted
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Append one JSON record per iteration to this file
    #[arg(long)]
    pub iterations_log: Option<PathBuf>,

    /// LLM provider (openai, deepseek, openrouter, anthropic, gemini, ollama)
    #[arg(long)]
    pub llm_provider: Option<String>,

    #[arg(long)]
    pub llm_api_base_url: Option<String>,

    #[arg(long)]
    pub llm_api_key: Option<String>,

    /// Model for routine, short prompts
    #[arg(long)]
    pub model_efficient: Option<String>,

    /// Model for long prompts, and fallback when the efficient model fails
    #[arg(long)]
    pub model_powerful: Option<String>,

    #[arg(long)]
    pub search_api_base_url: Option<String>,

    #[arg(long)]
    pub search_api_key: Option<String>,

    /// Concurrent search queries
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Drop sources older than this many days
    #[arg(long)]
    pub recency_days: Option<i64>,

    /// Disable the LLM result cache
    #[arg(long)]
    pub no_cache: bool,

    /// Debug-level logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Log as JSON lines
    #[arg(long)]
    pub log_json: bool,
}

impl Args {
    /// Config file (explicit, else `deep-research.toml` if present, else
    /// defaults), then API keys from the environment, then CLI flags.
    pub fn into_config(&self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::from_file(path)
                .with_context(|| format!("failed to load config file {}", path.display()))?,
            None => {
                let default_path = PathBuf::from(DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    Config::from_file(&default_path).with_context(|| {
                        format!("failed to load config file {}", default_path.display())
                    })?
                } else {
                    Config::default()
                }
            }
        };

        apply_env(&mut config, |key| std::env::var(key).ok());
        self.apply_overrides(&mut config)?;
        Ok(config)
    }

    pub fn apply_overrides(&self, config: &mut Config) -> Result<()> {
        if let Some(provider) = &self.llm_provider {
            config.llm.provider = provider
                .parse::<LLMProvider>()
                .map_err(|e| anyhow!(e))?;
        }
        if let Some(url) = &self.llm_api_base_url {
            config.llm.api_base_url = url.clone();
        }
        if let Some(key) = &self.llm_api_key {
            config.llm.api_key = key.clone();
        }
        if let Some(model) = &self.model_efficient {
            config.llm.model_efficient = model.clone();
        }
        if let Some(model) = &self.model_powerful {
            config.llm.model_powerful = model.clone();
        }
        if let Some(url) = &self.search_api_base_url {
            config.search.api_base_url = url.clone();
        }
        if let Some(key) = &self.search_api_key {
            config.search.api_key = key.clone();
        }
        if let Some(concurrency) = self.concurrency {
            config.search.concurrency = concurrency;
        }
        if let Some(days) = self.recency_days {
            config.research.recency_window_days = Some(days);
        }
        if let Some(breadth) = self.breadth {
            config.research.breadth = breadth;
        }
        if let Some(depth) = self.depth {
            config.research.depth = depth;
        }
        if self.no_cache {
            config.cache.enabled = false;
        }
        if self.verbose {
            config.log.level = "debug".to_string();
        }
        if self.log_json {
            config.log.json = true;
        }
        Ok(())
    }

    pub fn launch_options(&self, config: &Config) -> LaunchOptions {
        LaunchOptions {
            query: self.query.clone(),
            breadth: config.research.breadth,
            depth: config.research.depth,
            output: self.output.clone(),
            iterations_log: self.iterations_log.clone(),
        }
    }
}

/// API keys from the environment; the only place environment variables are read.
pub fn apply_env<F>(config: &mut Config, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(key) = lookup(LLM_API_KEY_ENV).filter(|k| !k.is_empty()) {
        config.llm.api_key = key;
    }
    if let Some(key) = lookup(SEARCH_API_KEY_ENV).filter(|k| !k.is_empty()) {
        config.search.api_key = key;
    }
}
