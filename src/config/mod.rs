use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::PathBuf;
use std::time::Duration;

/// Supported LLM providers
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Default)]
pub enum LLMProvider {
    #[serde(rename = "openai")]
    #[default]
    OpenAI,
    #[serde(rename = "deepseek")]
    DeepSeek,
    #[serde(rename = "openrouter")]
    OpenRouter,
    #[serde(rename = "anthropic")]
    Anthropic,
    #[serde(rename = "gemini")]
    Gemini,
    #[serde(rename = "ollama")]
    Ollama,
}

impl std::fmt::Display for LLMProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LLMProvider::OpenAI => write!(f, "openai"),
            LLMProvider::DeepSeek => write!(f, "deepseek"),
            LLMProvider::OpenRouter => write!(f, "openrouter"),
            LLMProvider::Anthropic => write!(f, "anthropic"),
            LLMProvider::Gemini => write!(f, "gemini"),
            LLMProvider::Ollama => write!(f, "ollama"),
        }
    }
}

impl std::str::FromStr for LLMProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(LLMProvider::OpenAI),
            "deepseek" => Ok(LLMProvider::DeepSeek),
            "openrouter" => Ok(LLMProvider::OpenRouter),
            "anthropic" => Ok(LLMProvider::Anthropic),
            "gemini" => Ok(LLMProvider::Gemini),
            "ollama" => Ok(LLMProvider::Ollama),
            _ => Err(format!("Unknown provider: {}", s)),
        }
    }
}

/// Application configuration, threaded explicitly through the pipeline.
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub llm: LLMConfig,
    pub search: SearchProviderConfig,
    pub research: ResearchConfig,
    pub retry: RetryConfig,
    pub cache: CacheConfig,
    pub log: LogConfig,
}

/// LLM model configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct LLMConfig {
    pub provider: LLMProvider,

    pub api_key: String,

    pub api_base_url: String,

    /// Used for short prompts; falls back to `model_powerful` on failure.
    pub model_efficient: String,

    /// Used for long prompts and as the fallback model.
    pub model_powerful: String,

    pub max_tokens: u32,

    pub temperature: f64,

    /// Attempts the completion client makes on its own before giving up.
    pub retry_attempts: u32,

    pub retry_delay_ms: u64,

    /// Upper bound for a single learning-extraction call.
    pub timeout_seconds: u64,
}

/// Search/scrape provider configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct SearchProviderConfig {
    pub api_key: String,

    pub api_base_url: String,

    /// Per-query result cap
    pub result_limit: usize,

    /// Concurrent search calls during gathering
    pub concurrency: usize,

    /// Ask the scraper for main content only (no nav/footer)
    pub main_content_only: bool,

    pub request_timeout_seconds: u64,
}

/// Knobs of the recursive research pipeline
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct ResearchConfig {
    pub breadth: usize,

    pub depth: usize,

    pub triage_batch_size: usize,

    pub filter_batch_size: usize,

    pub extraction_batch_size: usize,

    pub learnings_per_batch: usize,

    pub follow_ups_per_batch: usize,

    /// Per-document token cap before the text is handed to extraction
    pub document_token_cap: usize,

    /// How much of the markdown head is scanned for a publication date
    pub date_scan_chars: usize,

    pub min_portfolio_holdings: usize,

    pub min_holding_breadth: usize,

    pub holding_depth: usize,

    /// When set, dated items older than this many days are dropped as well.
    pub recency_window_days: Option<i64>,
}

/// Retry policy for search and scrape calls
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: u32,

    /// Suggested delay when the provider gives no retry-after hint
    pub default_delay_ms: u64,

    pub max_delay_ms: u64,
}

/// LLM result cache configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,

    pub cache_dir: PathBuf,

    /// Research results go stale quickly, so this stays short.
    pub expire_hours: u64,
}

/// Logging configuration, applied once by the binary
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct LogConfig {
    /// `tracing` filter directive, e.g. `info` or `deep_research=debug`
    pub level: String,

    pub json: bool,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &PathBuf) -> Result<Self> {
        let mut file =
            File::open(path).context(format!("Failed to open config file: {:?}", path))?;
        let mut content = String::new();
        file.read_to_string(&mut content)
            .context("Failed to read config file")?;

        let config: Config = toml::from_str(&content).context("Failed to parse config file")?;
        Ok(config)
    }

    /// Rejects settings the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), crate::error::ResearchError> {
        use crate::error::ResearchError;

        let research = &self.research;
        if research.breadth == 0 {
            return Err(ResearchError::Config("research.breadth must be at least 1".into()));
        }
        for (name, value) in [
            ("triage_batch_size", research.triage_batch_size),
            ("filter_batch_size", research.filter_batch_size),
            ("extraction_batch_size", research.extraction_batch_size),
        ] {
            if value == 0 {
                return Err(ResearchError::Config(format!(
                    "research.{} must be at least 1",
                    name
                )));
            }
        }
        if self.search.concurrency == 0 {
            return Err(ResearchError::Config(
                "search.concurrency must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

impl RetryConfig {
    pub fn default_delay(&self) -> Duration {
        Duration::from_millis(self.default_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

impl Default for LLMConfig {
    fn default() -> Self {
        Self {
            provider: LLMProvider::default(),
            api_key: String::new(),
            api_base_url: String::from("https://api.openai.com/v1"),
            model_efficient: String::from("gpt-4o-mini"),
            model_powerful: String::from("gpt-4o"),
            max_tokens: 16384,
            temperature: 0.1,
            retry_attempts: 2,
            retry_delay_ms: 3000,
            timeout_seconds: 180,
        }
    }
}

impl Default for SearchProviderConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_base_url: String::from("https://api.firecrawl.dev"),
            result_limit: 30,
            concurrency: 2,
            main_content_only: true,
            request_timeout_seconds: 60,
        }
    }
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            breadth: 4,
            depth: 2,
            triage_batch_size: 30,
            filter_batch_size: 30,
            extraction_batch_size: 8,
            learnings_per_batch: 5,
            follow_ups_per_batch: 3,
            document_token_cap: 25_000,
            date_scan_chars: 4_000,
            min_portfolio_holdings: 3,
            min_holding_breadth: 2,
            holding_depth: 1,
            recency_window_days: None,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            default_delay_ms: 2_000,
            max_delay_ms: 60_000,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cache_dir: PathBuf::from(".deep-research/cache"),
            expire_hours: 6,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: String::from("info"),
            json: false,
        }
    }
}
