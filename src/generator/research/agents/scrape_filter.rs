use anyhow::Result;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

use super::AgentType;
use crate::generator::agent_executor::extract;
use crate::generator::context::ResearchContext;
use crate::generator::research::types::{Article, FilterDecision, MetadataOnlyItem, ScrapeTarget};
use crate::llm::StructuredCompletion;
use crate::utils::urls::normalize_url;

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct StoryClustering {
    /// Articles grouped by the underlying event they report
    pub story_groups: Vec<StoryGroup>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct StoryGroup {
    pub group_id: String,
    pub articles: Vec<GroupMember>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct GroupMember {
    pub url: String,
    /// Exactly one member per group should be the best source
    pub is_best_source: bool,
    /// Whether the full text is needed, or the title and description already carry the news
    pub needs_scraping: bool,
    pub reason: String,
}

/// Disjoint split of the triaged articles.
#[derive(Debug, Clone, Default)]
pub struct FilterOutcome {
    pub to_scrape: Vec<ScrapeTarget>,
    pub metadata_only: Vec<MetadataOnlyItem>,
    pub decisions: Vec<FilterDecision>,
}

impl FilterOutcome {
    fn push(&mut self, article: &Article, decision: FilterDecision) {
        if decision.to_scrape {
            self.to_scrape.push(ScrapeTarget {
                url: article.url.clone(),
                reason: decision.reason.clone(),
            });
        } else {
            self.metadata_only.push(MetadataOnlyItem {
                url: article.url.clone(),
                title: article.title.clone(),
                description: article.description.clone().or(article.snippet.clone()),
                published_date: article.published_date.clone(),
                reason: decision.reason.clone(),
            });
        }
        self.decisions.push(decision);
    }
}

/// Clusters articles into stories and picks one source per story.
#[derive(Default)]
pub struct ScrapeFilterStage;

impl ScrapeFilterStage {
    pub async fn execute<L: StructuredCompletion>(
        &self,
        ctx: &ResearchContext<L>,
        articles: &[Article],
        research_goals: &[String],
    ) -> Result<FilterOutcome> {
        let mut outcome = FilterOutcome::default();
        if articles.is_empty() {
            return Ok(outcome);
        }

        let batch_size = ctx.config.research.filter_batch_size.max(1);
        let mut assigned: HashSet<String> = HashSet::new();

        for (batch_index, batch) in articles.chunks(batch_size).enumerate() {
            let prompt_sys = r#"You are de-duplicating news coverage for a financial research desk.
Group the articles into story groups: articles in one group report the same underlying event. An article that covers a unique story forms a group of its own.
In each group mark exactly one article as the best source: the most authoritative and most detailed report.
For the best source, set needs_scraping to true when the full text is needed to extract facts, or false when its title and description already carry the whole news.
Use only URLs that appear in the input, each at most once."#
                .to_string();
            let prompt_user = format!(
                "<research_goals>\n{}\n</research_goals>\n<articles>\n{}\n</articles>",
                research_goals.join("\n"),
                render_articles(batch)
            );

            let clustering: StoryClustering =
                extract(ctx, AgentType::ScrapeFilter.params(prompt_sys, prompt_user)).await?;
            debug!(
                batch = batch_index,
                size = batch.len(),
                groups = clustering.story_groups.len(),
                "Story clustering answered"
            );
            apply_clustering(&mut outcome, &mut assigned, batch_index, batch, clustering);
        }

        info!(
            input = articles.len(),
            to_scrape = outcome.to_scrape.len(),
            metadata_only = outcome.metadata_only.len(),
            "Scrape filter complete"
        );
        Ok(outcome)
    }
}

/// Turns one batch's clustering into decisions.
///
/// Each article is decided exactly once: URLs the model invented are ignored,
/// a URL listed in several groups stays in the first, and articles the model
/// left out become singleton groups scraped in full. A group without a marked
/// best source falls back to its first member; with several marked, the first
/// marked wins.
fn apply_clustering(
    outcome: &mut FilterOutcome,
    assigned: &mut HashSet<String>,
    batch_index: usize,
    batch: &[Article],
    clustering: StoryClustering,
) {
    let by_url: HashMap<&str, &Article> = batch.iter().map(|a| (a.url.as_str(), a)).collect();

    for (group_index, group) in clustering.story_groups.into_iter().enumerate() {
        let members: Vec<(&Article, GroupMember)> = group
            .articles
            .into_iter()
            .filter_map(|member| {
                let url = normalize_url(&member.url);
                let article = *by_url.get(url.as_str())?;
                assigned.insert(article.url.clone()).then_some((article, member))
            })
            .collect();
        if members.is_empty() {
            continue;
        }

        // the model may reuse a label across groups; the index keeps ids distinct
        let group_id = if group.group_id.trim().is_empty() {
            format!("{batch_index}-{group_index}")
        } else {
            format!("{batch_index}-{group_index}-{}", group.group_id.trim())
        };
        let best = members
            .iter()
            .position(|(_, member)| member.is_best_source)
            .unwrap_or(0);
        let best_url = members[best].0.url.clone();

        for (position, (article, member)) in members.into_iter().enumerate() {
            let decision = if position == best {
                FilterDecision {
                    url: article.url.clone(),
                    to_scrape: member.needs_scraping,
                    reason: member.reason,
                    story_group_id: group_id.clone(),
                    is_best_source: true,
                }
            } else {
                FilterDecision {
                    url: article.url.clone(),
                    to_scrape: false,
                    reason: format!("duplicate story, best source is {best_url}"),
                    story_group_id: group_id.clone(),
                    is_best_source: false,
                }
            };
            outcome.push(article, decision);
        }
    }

    for (position, article) in batch.iter().enumerate() {
        if assigned.insert(article.url.clone()) {
            let decision = FilterDecision {
                url: article.url.clone(),
                to_scrape: true,
                reason: "not clustered, treated as its own story".to_string(),
                story_group_id: format!("{batch_index}-single-{position}"),
                is_best_source: true,
            };
            outcome.push(article, decision);
        }
    }
}

fn render_articles(articles: &[Article]) -> String {
    articles
        .iter()
        .map(|a| {
            format!(
                "- url: {}\n  title: {}\n  description: {}",
                a.url,
                a.title.as_deref().unwrap_or(""),
                a.description
                    .as_deref()
                    .or(a.snippet.as_deref())
                    .unwrap_or("")
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}
