//! Scoped web retrieval: domain-restricted query, ranking, and observation rendering.

mod ranker;

pub use ranker::{merge_unique, rank_hits, score_hit, HitClass, RankerPolicy, SearchHit};

use crate::error::SearchError;
use crate::services::WebSearch;
use std::sync::Arc;
use std::time::Duration;

/// Name under which the iterative reasoner sees this search.
pub const TOOL_NAME: &str = "OfficialDocSearch";

/// Tag rendered in front of official hits in prompts and observations.
pub const OFFICIAL_TAG: &str = "★ official";
/// Tag rendered in front of same-domain hits.
pub const RELATED_TAG: &str = "related";

/// Web search restricted to the product's documentation and ranked by [`RankerPolicy`].
pub struct OfficialDocSearch {
    backend: Arc<dyn WebSearch>,
    policy: RankerPolicy,
    scope_prefix: String,
    fetch_count: usize,
    timeout: Duration,
}

impl OfficialDocSearch {
    pub fn new(backend: Arc<dyn WebSearch>, scope_prefix: impl Into<String>) -> Self {
        Self {
            backend,
            policy: RankerPolicy::default(),
            scope_prefix: scope_prefix.into(),
            fetch_count: 30,
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_policy(mut self, policy: RankerPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Raw hits requested from the backend per query.
    pub fn with_fetch_count(mut self, fetch_count: usize) -> Self {
        self.fetch_count = fetch_count.max(1);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn policy(&self) -> &RankerPolicy {
        &self.policy
    }

    /// The query actually sent to the backend.
    pub fn scoped_query(&self, query: &str) -> String {
        let prefix = self.scope_prefix.trim();
        if prefix.is_empty() {
            query.trim().to_string()
        } else {
            format!("{} {}", prefix, query.trim())
        }
    }

    /// Ranked hits for `query`; any search failure is logged and yields an empty list.
    pub async fn search(&self, query: &str, count: usize) -> Vec<SearchHit> {
        match self.try_search(query, count).await {
            Ok(hits) => hits,
            Err(e) => {
                tracing::warn!(target: "taskpilot::search", error = %e, query, "web search failed");
                Vec::new()
            }
        }
    }

    async fn try_search(&self, query: &str, count: usize) -> Result<Vec<SearchHit>, SearchError> {
        if query.trim().is_empty() || count == 0 {
            return Ok(Vec::new());
        }
        let scoped = self.scoped_query(query);
        let raw = tokio::time::timeout(self.timeout, self.backend.search(&scoped, self.fetch_count))
            .await
            .map_err(|_| SearchError::Timeout(self.timeout.as_secs()))??;
        let ranked = rank_hits(&raw, query.trim(), count, &self.policy);
        tracing::debug!(
            target: "taskpilot::search",
            query,
            raw = raw.len(),
            kept = ranked.len(),
            official = ranked.iter().filter(|h| h.is_official).count(),
            "search ranked"
        );
        Ok(ranked)
    }

    /// Searches every keyword and merges the results, first occurrence of a URL wins.
    pub async fn search_keywords(&self, keywords: &[String], per_keyword: usize) -> Vec<SearchHit> {
        let mut batches = Vec::with_capacity(keywords.len());
        for keyword in keywords {
            batches.push(self.search(keyword, per_keyword).await);
        }
        merge_unique(batches)
    }

    /// Runs a search and renders it as a tool observation for the iterative reasoner.
    pub async fn observe(&self, query: &str, count: usize) -> String {
        render_observation(&self.search(query, count).await)
    }
}

/// Renders hits as numbered blocks with tag, title, link, and summary.
pub fn render_observation(hits: &[SearchHit]) -> String {
    if hits.is_empty() {
        return "No official documentation found for this query. Try different keywords or answer \
                from general product knowledge."
            .to_string();
    }
    let official = hits.iter().filter(|h| h.is_official).count();
    let mut out = format!(
        "Found {} documents ({} official help-center pages):\n",
        hits.len(),
        official
    );
    for (i, hit) in hits.iter().enumerate() {
        let tag = if hit.is_official { OFFICIAL_TAG } else { RELATED_TAG };
        out.push_str(&format!(
            "\n[{}] {}\nTitle: {}\nLink: {}\nSummary: {}\n",
            i + 1,
            tag,
            hit.title,
            hit.url,
            hit.summary
        ));
    }
    out
}
