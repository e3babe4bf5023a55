use chrono::{NaiveDate, Utc};
use std::sync::Arc;
use uuid::Uuid;

use crate::config::Config;
use crate::generator::research::portfolio::MacroScanner;
use crate::generator::research::progress::{IterationSink, LogProgress, ProgressSink};
use crate::generator::research::retry::RetryingCaller;
use crate::llm::StructuredCompletion;
use crate::providers::{ScrapeOptions, ScrapeProvider, SearchProvider};

/// Everything one research run needs, injected once and shared by all stages.
pub struct ResearchContext<L> {
    pub config: Config,
    /// Structured completion service
    pub llm: Arc<L>,
    pub search: Arc<dyn SearchProvider>,
    pub scraper: Arc<dyn ScrapeProvider>,
    pub progress: Arc<dyn ProgressSink>,
    pub iteration_sink: Option<Arc<dyn IterationSink>>,
    pub macro_scanner: Option<Arc<dyn MacroScanner>>,
    /// Correlates the iteration records of one run
    pub run_id: Uuid,
    /// Reference day for the recency gate
    pub today: NaiveDate,
}

impl<L> Clone for ResearchContext<L> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            llm: Arc::clone(&self.llm),
            search: Arc::clone(&self.search),
            scraper: Arc::clone(&self.scraper),
            progress: Arc::clone(&self.progress),
            iteration_sink: self.iteration_sink.clone(),
            macro_scanner: self.macro_scanner.clone(),
            run_id: self.run_id,
            today: self.today,
        }
    }
}

impl<L: StructuredCompletion> ResearchContext<L> {
    pub fn new(
        config: Config,
        llm: Arc<L>,
        search: Arc<dyn SearchProvider>,
        scraper: Arc<dyn ScrapeProvider>,
    ) -> Self {
        Self {
            config,
            llm,
            search,
            scraper,
            progress: Arc::new(LogProgress),
            iteration_sink: None,
            macro_scanner: None,
            run_id: Uuid::new_v4(),
            today: Utc::now().date_naive(),
        }
    }

    pub fn with_progress(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.progress = sink;
        self
    }

    pub fn with_iteration_sink(mut self, sink: Arc<dyn IterationSink>) -> Self {
        self.iteration_sink = Some(sink);
        self
    }

    pub fn with_macro_scanner(mut self, scanner: Arc<dyn MacroScanner>) -> Self {
        self.macro_scanner = Some(scanner);
        self
    }

    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = today;
        self
    }

    pub fn retrying_caller(&self) -> RetryingCaller {
        RetryingCaller::new(&self.config.retry)
    }

    pub fn scrape_options(&self) -> ScrapeOptions {
        ScrapeOptions {
            main_content_only: self.config.search.main_content_only,
        }
    }
}
