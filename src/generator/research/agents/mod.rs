use std::fmt::Display;

use crate::llm::AgentExecuteParams;

pub mod learning_extractor;
pub mod query_planner;
pub mod scrape_filter;
pub mod scraper;
pub mod search_gatherer;
pub mod triage;

/// Cache category shared by all research stages.
pub const RESEARCH_SCOPE: &str = "research";

/// The LLM-backed stages; the display form is the log tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AgentType {
    QueryPlanner,
    Triage,
    ScrapeFilter,
    LearningExtractor,
}

impl Display for AgentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            AgentType::QueryPlanner => "query_planner",
            AgentType::Triage => "triage",
            AgentType::ScrapeFilter => "scrape_filter",
            AgentType::LearningExtractor => "learning_extractor",
        };
        write!(f, "{}", name)
    }
}

impl AgentType {
    pub fn params(&self, prompt_sys: String, prompt_user: String) -> AgentExecuteParams {
        AgentExecuteParams {
            prompt_sys,
            prompt_user,
            cache_scope: format!("{}/{}", RESEARCH_SCOPE, self),
            log_tag: self.to_string(),
        }
    }
}
