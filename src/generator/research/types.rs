use chrono::NaiveDate;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::providers::SearchHit;

/// One search query and the reason it was planned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct PlannedQuery {
    /// The search engine query
    pub query: String,
    /// What this query should find out, and how to dig deeper once results are in
    pub research_goal: String,
}

/// A distinct search result within one gather round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Article {
    /// Normalized URL, the identity key
    pub url: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub snippet: Option<String>,
    pub published_date: Option<String>,
    /// Queries that returned this article, in first-seen order
    pub source_queries: Vec<String>,
    pub research_goals: Vec<String>,
}

impl Article {
    pub fn from_hit(url: String, hit: SearchHit, planned: &PlannedQuery) -> Self {
        Self {
            url,
            title: hit.title,
            description: hit.description,
            snippet: hit.snippet,
            published_date: hit.published_date,
            source_queries: vec![planned.query.clone()],
            research_goals: vec![planned.research_goal.clone()],
        }
    }

    /// Record another query that surfaced this article.
    pub fn add_provenance(&mut self, planned: &PlannedQuery) {
        if !self.source_queries.contains(&planned.query) {
            self.source_queries.push(planned.query.clone());
        }
        if !self.research_goals.contains(&planned.research_goal) {
            self.research_goals.push(planned.research_goal.clone());
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterDecision {
    pub url: String,
    pub to_scrape: bool,
    pub reason: String,
    pub story_group_id: String,
    pub is_best_source: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrapeTarget {
    pub url: String,
    pub reason: String,
}

/// An article represented only by its search metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataOnlyItem {
    pub url: String,
    pub title: Option<String>,
    pub description: Option<String>,
    /// Provider date text carried over from the search hit
    pub published_date: Option<String>,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapedContent {
    pub url: String,
    pub markdown: Option<String>,
    pub published_date: Option<NaiveDate>,
    pub error: Option<String>,
}

/// A dated document admitted past the recency gate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CorpusDocument {
    pub url: String,
    pub markdown: String,
    pub published_date: NaiveDate,
    pub metadata_only: bool,
}

/// Classification prefix carried by every learning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LearningCategory {
    RecentChange,
    LongTermTrend,
    Context,
}

impl LearningCategory {
    pub const ALL: [LearningCategory; 3] = [
        LearningCategory::RecentChange,
        LearningCategory::LongTermTrend,
        LearningCategory::Context,
    ];

    pub fn tag(&self) -> &'static str {
        match self {
            LearningCategory::RecentChange => "RECENT_CHANGE",
            LearningCategory::LongTermTrend => "LONG_TERM_TREND",
            LearningCategory::Context => "CONTEXT",
        }
    }

    /// Category of a learning, read from its prefix.
    pub fn of(learning: &str) -> Option<Self> {
        let head = learning.trim_start().trim_start_matches('[');
        Self::ALL
            .into_iter()
            .find(|category| head.starts_with(category.tag()))
    }
}

/// Accumulated output of a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResearchResult {
    pub learnings: Vec<String>,
    pub visited_urls: Vec<String>,
}

impl ResearchResult {
    pub fn is_empty(&self) -> bool {
        self.learnings.is_empty() && self.visited_urls.is_empty()
    }

    pub fn append(&mut self, other: ResearchResult) {
        self.learnings.extend(other.learnings);
        self.visited_urls.extend(other.visited_urls);
    }
}

/// Recursion state, passed by value into every iteration.
#[derive(Debug, Clone, PartialEq)]
pub struct ResearchState {
    pub learnings: Vec<String>,
    pub visited_urls: Vec<String>,
    pub depth_remaining: usize,
    pub breadth: usize,
    pub iteration: usize,
    pub initial_query: String,
    pub total_depth: usize,
    pub total_breadth: usize,
}

impl ResearchState {
    pub fn new(query: impl Into<String>, breadth: usize, depth: usize) -> Self {
        Self {
            learnings: Vec::new(),
            visited_urls: Vec::new(),
            depth_remaining: depth,
            breadth,
            iteration: 0,
            initial_query: query.into(),
            total_depth: depth,
            total_breadth: breadth,
        }
    }

    /// State for the next depth level: breadth halves (rounding up), depth drops by one.
    pub fn descend(self) -> Self {
        Self {
            depth_remaining: self.depth_remaining.saturating_sub(1),
            breadth: self.breadth.div_ceil(2),
            iteration: self.iteration + 1,
            ..self
        }
    }

    pub fn into_result(self) -> ResearchResult {
        ResearchResult {
            learnings: self.learnings,
            visited_urls: self.visited_urls,
        }
    }
}

/// Snapshot pushed to a progress sink.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Progress {
    pub current_depth: usize,
    pub total_depth: usize,
    pub current_breadth: usize,
    pub total_breadth: usize,
    pub total_queries: usize,
    pub completed_queries: usize,
    pub current_query: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IterationOutcome {
    Completed,
    EmptyAfterGather,
    EmptyAfterTriage,
}

/// Every intermediate artifact of one iteration, for audit and debugging.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IterationRecord {
    pub run_id: Uuid,
    pub iteration: usize,
    pub query: String,
    pub depth_remaining: usize,
    pub breadth: usize,
    pub planned_queries: Vec<PlannedQuery>,
    pub gathered: Vec<Article>,
    pub duplicate_hits: usize,
    pub triaged: Vec<Article>,
    pub decisions: Vec<FilterDecision>,
    pub scraped: Vec<ScrapedContent>,
    pub corpus_urls: Vec<String>,
    pub learnings: Vec<String>,
    pub follow_up_questions: Vec<String>,
    pub outcome: IterationOutcome,
}

impl IterationRecord {
    pub fn new(run_id: Uuid, query: &str, state: &ResearchState) -> Self {
        Self {
            run_id,
            iteration: state.iteration,
            query: query.to_string(),
            depth_remaining: state.depth_remaining,
            breadth: state.breadth,
            planned_queries: Vec::new(),
            gathered: Vec::new(),
            duplicate_hits: 0,
            triaged: Vec::new(),
            decisions: Vec::new(),
            scraped: Vec::new(),
            corpus_urls: Vec::new(),
            learnings: Vec::new(),
            follow_up_questions: Vec::new(),
            outcome: IterationOutcome::Completed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_learning_category_prefix() {
        assert_eq!(
            LearningCategory::of("RECENT_CHANGE: BTC ETF inflows hit $1B"),
            Some(LearningCategory::RecentChange)
        );
        assert_eq!(
            LearningCategory::of("[LONG_TERM_TREND] Copper demand"),
            Some(LearningCategory::LongTermTrend)
        );
        assert_eq!(LearningCategory::of("untagged fact"), None);
    }

    #[test]
    fn test_descend_halves_breadth_rounding_up() {
        let state = ResearchState::new("gold", 5, 2);
        let next = state.descend();
        assert_eq!(next.breadth, 3);
        assert_eq!(next.depth_remaining, 1);
        assert_eq!(next.iteration, 1);
        assert_eq!(next.total_breadth, 5);
        assert_eq!(next.descend().breadth, 2);
    }

    #[test]
    fn test_provenance_accumulates_without_repeats() {
        let first = PlannedQuery {
            query: "gold price".to_string(),
            research_goal: "price moves".to_string(),
        };
        let second = PlannedQuery {
            query: "gold demand".to_string(),
            research_goal: "price moves".to_string(),
        };
        let mut article = Article::from_hit(
            "https://a.com/x".to_string(),
            SearchHit::new("https://a.com/x"),
            &first,
        );
        article.add_provenance(&second);
        article.add_provenance(&first);
        assert_eq!(article.source_queries, vec!["gold price", "gold demand"]);
        assert_eq!(article.research_goals, vec!["price moves"]);
    }

    #[test]
    fn test_result_serializes_camel_case() {
        let result = ResearchResult {
            learnings: vec!["CONTEXT: x".to_string()],
            visited_urls: vec!["https://a.com".to_string()],
        };
        let json = serde_json::to_value(&result).unwrap();
        assert!(json.get("visitedUrls").is_some());
    }
}
