//! Enhancement pipeline: cache lookup, then keyword search and reasoning, then write-back.

use crate::error::ConfigError;
use crate::knowledge::KnowledgeBase;
use crate::reasoning::{prompts, ReasoningEngine, ReasoningStrategy};
use crate::search::OfficialDocSearch;
use crate::services::CompletionModel;
use crate::shared::EnhancerSettings;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Keyword variants searched per task.
const MAX_KEYWORDS: usize = 3;

static LIST_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(?:[-*•]+|\d+\s*[.)、:：])\s*").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnhanceSource {
    Cache,
    Search,
    Original,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnhanceResult {
    pub original_text: String,
    pub enhanced_text: String,
    pub cache_hit: bool,
    pub search_performed: bool,
    pub source: EnhanceSource,
    pub source_urls: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_similarity: Option<f32>,
    /// Set when reasoning failed and the task was returned unchanged.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<String>,
}

impl EnhanceResult {
    fn original(task: &str) -> Self {
        Self {
            original_text: task.to_string(),
            enhanced_text: task.to_string(),
            cache_hit: false,
            search_performed: false,
            source: EnhanceSource::Original,
            source_urls: Vec::new(),
            cache_similarity: None,
            diagnostic: None,
        }
    }
}

/// Task enhancer. Construct once and share; it holds no per-task state.
pub struct TaskEnhancer {
    knowledge: KnowledgeBase,
    model: Arc<dyn CompletionModel>,
    search: Option<Arc<OfficialDocSearch>>,
    engine: ReasoningEngine,
    settings: EnhancerSettings,
    results_per_keyword: usize,
}

impl TaskEnhancer {
    pub fn new(
        knowledge: KnowledgeBase,
        model: Arc<dyn CompletionModel>,
        settings: EnhancerSettings,
    ) -> Result<Self, ConfigError> {
        let engine = ReasoningEngine::new(ReasoningStrategy::from_settings(&settings)?, Arc::clone(&model))
            .with_default_target(settings.default_target.clone());
        Ok(Self {
            knowledge,
            model,
            search: None,
            engine,
            settings,
            results_per_keyword: 3,
        })
    }

    /// Enables web retrieval; without it a cache miss returns the task unchanged.
    pub fn with_search(mut self, search: Arc<OfficialDocSearch>, results_per_keyword: usize) -> Self {
        self.engine = self.engine.with_search(Arc::clone(&search));
        self.search = Some(search);
        self.results_per_keyword = results_per_keyword.max(1);
        self
    }

    pub fn settings(&self) -> &EnhancerSettings {
        &self.settings
    }

    pub fn strategy(&self) -> ReasoningStrategy {
        self.engine.strategy()
    }

    pub fn search_enabled(&self) -> bool {
        self.search.is_some()
    }

    pub fn knowledge(&self) -> &KnowledgeBase {
        &self.knowledge
    }

    /// Never fails; the worst case is the task itself with `source = Original`.
    pub async fn enhance(&self, task: &str, force_refresh: bool) -> EnhanceResult {
        let mut result = EnhanceResult::original(task);
        if task.trim().is_empty() {
            return result;
        }

        if self.settings.enable_cache && !force_refresh {
            if let Some((answer, similarity)) = self.lookup_cache(task).await {
                tracing::info!(target: "taskpilot::enhance", similarity, "cache hit");
                result.enhanced_text = answer;
                result.cache_hit = true;
                result.source = EnhanceSource::Cache;
                result.cache_similarity = Some(similarity);
                return result;
            }
        }

        let Some(search) = &self.search else {
            tracing::info!(target: "taskpilot::enhance", "web search disabled, keeping original task");
            return result;
        };

        let keywords = self.generate_keywords(task).await;
        let hits = search.search_keywords(&keywords, self.results_per_keyword).await;
        result.search_performed = true;
        tracing::info!(
            target: "taskpilot::enhance",
            keywords = ?keywords,
            hits = hits.len(),
            "references collected"
        );

        let reasoning = self.engine.reason(task, &hits).await;
        if !reasoning.is_usable() {
            tracing::warn!(target: "taskpilot::enhance", "reasoning failed, keeping original task");
            result.diagnostic = Some(reasoning.text);
            return result;
        }
        result.enhanced_text = reasoning.text;
        result.source = EnhanceSource::Search;
        result.source_urls = reasoning.source_urls;

        if self.settings.enable_cache && result.enhanced_text != task {
            self.write_back(task, &result.enhanced_text).await;
        }
        result
    }

    /// Best non-degraded cached answer at or above the threshold.
    async fn lookup_cache(&self, task: &str) -> Option<(String, f32)> {
        let threshold = self.settings.similarity_threshold;
        self.knowledge
            .search_by_question(task, self.settings.cache_top_k.max(1), threshold)
            .await
            .into_iter()
            .find(|hit| !hit.is_degraded() && hit.similarity >= threshold)
            .map(|hit| (hit.entry.answer_text, hit.similarity))
    }

    async fn write_back(&self, task: &str, enhanced: &str) {
        match self.knowledge.create(task, enhanced).await {
            Ok(entry) => {
                tracing::info!(target: "taskpilot::enhance", id = entry.id, "enhanced task cached")
            }
            Err(e) => {
                tracing::warn!(target: "taskpilot::enhance", error = %e, "cache write-back failed")
            }
        }
    }

    /// 2-3 search keywords from the model, or the task itself.
    pub async fn generate_keywords(&self, task: &str) -> Vec<String> {
        let fallback = vec![task.trim().to_string()];
        match self
            .model
            .complete(prompts::KEYWORD_SYSTEM, &prompts::keyword_user(task))
            .await
        {
            Ok(raw) => {
                let keywords = parse_keywords(&raw);
                if keywords.is_empty() {
                    fallback
                } else {
                    keywords
                }
            }
            Err(e) => {
                tracing::warn!(target: "taskpilot::enhance", error = %e, "keyword generation failed");
                fallback
            }
        }
    }
}

/// One keyword per line; bullets, numbering, and quotes removed; at most three.
pub fn parse_keywords(raw: &str) -> Vec<String> {
    let mut keywords: Vec<String> = Vec::new();
    for line in raw.lines() {
        let keyword = LIST_MARKER
            .replace(line, "")
            .trim()
            .trim_matches(|c: char| matches!(c, '"' | '\'' | '`' | '“' | '”'))
            .trim()
            .to_string();
        if !keyword.is_empty() && !keywords.contains(&keyword) {
            keywords.push(keyword);
        }
        if keywords.len() == MAX_KEYWORDS {
            break;
        }
    }
    keywords
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::tests::open_business;
    use crate::services::RawHit;
    use crate::testing::{ScriptedModel, StaticSearch};

    const STEPS: &str = "1. Left-click Docs in the sidebar 2. Left-click the shared document \
                         3. Verify the document opens in a new tab";

    fn settings() -> EnhancerSettings {
        EnhancerSettings {
            enable_web_search: true,
            ..EnhancerSettings::default()
        }
    }

    fn doc_search(backend: Arc<StaticSearch>) -> Arc<OfficialDocSearch> {
        Arc::new(OfficialDocSearch::new(backend, "site:feishu.cn"))
    }

    #[test]
    fn keyword_lines_are_cleaned_and_capped() {
        let raw = "1. 共享文档\n- \"open doc\"\n\n2) 云文档 权限\n3、 extra\n4. more";
        assert_eq!(parse_keywords(raw), vec!["共享文档", "open doc", "云文档 权限"]);
        assert!(parse_keywords("  \n- \n").is_empty());
    }

    #[tokio::test]
    async fn cache_hit_skips_search_and_model() {
        let dir = tempfile::tempdir().unwrap();
        let kb = open_business(dir.path());
        kb.create("open shared document", STEPS).await.unwrap();
        let model = Arc::new(ScriptedModel::failing());
        let backend = Arc::new(StaticSearch::new(vec![]));
        let enhancer = TaskEnhancer::new(kb, model.clone(), settings())
            .unwrap()
            .with_search(doc_search(backend.clone()), 3);

        let result = enhancer.enhance("open shared document", false).await;
        assert!(result.cache_hit);
        assert_eq!(result.source, EnhanceSource::Cache);
        assert_eq!(result.enhanced_text, STEPS);
        assert!(result.cache_similarity.unwrap() > 0.99);
        assert!(model.calls().is_empty());
        assert!(backend.queries().is_empty());
    }

    #[tokio::test]
    async fn cache_miss_searches_reasons_and_writes_back() {
        let dir = tempfile::tempdir().unwrap();
        let kb = open_business(dir.path());
        let backend = Arc::new(StaticSearch::new(vec![
            RawHit::new("https://example.com/blog/docs", "Shared docs tips", "open shared document"),
            RawHit::new(
                "https://www.feishu.cn/hc/zh-CN/articles/360034114413",
                "Open a shared document",
                "In the Docs sidebar choose Shared with me.",
            ),
        ]));
        let model = Arc::new(
            ScriptedModel::new()
                .on("search keywords", "open shared document")
                .on("Output only the test steps", STEPS),
        );
        let enhancer = TaskEnhancer::new(kb.clone(), model.clone(), settings())
            .unwrap()
            .with_search(doc_search(backend.clone()), 1);

        let result = enhancer.enhance("open shared document", false).await;
        assert_eq!(result.source, EnhanceSource::Search);
        assert!(result.search_performed);
        assert!(!result.cache_hit);
        assert_eq!(result.enhanced_text, STEPS);
        assert_eq!(
            result.source_urls,
            vec!["https://www.feishu.cn/hc/zh-CN/articles/360034114413".to_string()]
        );

        let reasoning_calls = model.calls_matching("Output only the test steps");
        assert_eq!(reasoning_calls.len(), 1);
        assert!(reasoning_calls[0].1.contains("Open a shared document"));
        assert!(!reasoning_calls[0].1.contains("Shared docs tips"));

        assert_eq!(kb.count().unwrap(), 1);
        let cached = enhancer.enhance("open shared document", false).await;
        assert_eq!(cached.source, EnhanceSource::Cache);
    }

    #[tokio::test]
    async fn iterative_recovered_answer_is_written_back() {
        let dir = tempfile::tempdir().unwrap();
        let kb = open_business(dir.path());
        let backend = Arc::new(StaticSearch::new(vec![RawHit::new(
            "https://www.feishu.cn/hc/zh-CN/articles/360024984973",
            "Pin a chat",
            "Right-click a chat and choose Pin.",
        )]));
        let prose = "1. Left-click Messages in the sidebar 2. Right-click the project group \
                     3. Choose Pin 4. Verify the group stays at the top of the list";
        let model = Arc::new(
            ScriptedModel::new()
                .on("search keywords", "pin group")
                .on_sequence(
                    "Action Input",
                    vec![
                        Ok("Thought: check the help center\nAction: OfficialDocSearch\nAction Input: pin group".to_string()),
                        Ok(prose.to_string()),
                    ],
                ),
        );
        let settings = EnhancerSettings {
            strategy: "iterative".to_string(),
            max_iterations: 3,
            ..settings()
        };
        let enhancer = TaskEnhancer::new(kb.clone(), model.clone(), settings)
            .unwrap()
            .with_search(doc_search(backend.clone()), 3);
        assert_eq!(enhancer.strategy(), ReasoningStrategy::Iterative { max_iterations: 3 });

        let result = enhancer.enhance("pin the project group", false).await;
        assert_eq!(result.source, EnhanceSource::Search);
        assert_eq!(result.enhanced_text, prose);
        assert_eq!(
            result.source_urls,
            vec!["https://www.feishu.cn/hc/zh-CN/articles/360024984973".to_string()]
        );
        assert_eq!(model.calls_matching("Action Input").len(), 2);
        assert_eq!(
            backend.queries(),
            vec!["site:feishu.cn pin group".to_string(), "site:feishu.cn pin group".to_string()]
        );

        assert_eq!(kb.count().unwrap(), 1);
        let cached = kb.search_by_question("pin the project group", 1, 0.99).await;
        assert_eq!(cached[0].entry.answer_text, prose);
    }

    #[tokio::test]
    async fn total_failure_returns_the_task() {
        let dir = tempfile::tempdir().unwrap();
        let kb = open_business(dir.path());
        let enhancer = TaskEnhancer::new(kb.clone(), Arc::new(ScriptedModel::failing()), settings())
            .unwrap()
            .with_search(doc_search(Arc::new(StaticSearch::failing())), 3);

        let result = enhancer.enhance("pin the project group", false).await;
        assert_eq!(result.enhanced_text, "pin the project group");
        assert_eq!(result.source, EnhanceSource::Original);
        assert!(result.search_performed);
        assert!(result.diagnostic.unwrap().contains("pin the project group"));
        assert_eq!(kb.count().unwrap(), 0);
    }

    #[tokio::test]
    async fn force_refresh_bypasses_cache() {
        let dir = tempfile::tempdir().unwrap();
        let kb = open_business(dir.path());
        kb.create("mute a group", "old steps").await.unwrap();
        let model = Arc::new(
            ScriptedModel::new()
                .on("search keywords", "mute group")
                .on("Output only the test steps", "1. Right-click the group 2. Choose Mute 3. Verify the bell icon"),
        );
        let enhancer = TaskEnhancer::new(kb.clone(), model, settings())
            .unwrap()
            .with_search(doc_search(Arc::new(StaticSearch::new(vec![]))), 3);

        let result = enhancer.enhance("mute a group", true).await;
        assert_eq!(result.source, EnhanceSource::Search);
        assert!(result.enhanced_text.contains("Choose Mute"));
        assert_eq!(kb.count().unwrap(), 2);
    }

    #[tokio::test]
    async fn disabled_search_keeps_original() {
        let dir = tempfile::tempdir().unwrap();
        let model = Arc::new(ScriptedModel::new().otherwise("anything"));
        let enhancer = TaskEnhancer::new(open_business(dir.path()), model.clone(), EnhancerSettings::default()).unwrap();

        let result = enhancer.enhance("start a video call", false).await;
        assert_eq!(result.source, EnhanceSource::Original);
        assert!(!result.search_performed);
        assert!(model.calls().is_empty());
    }

    #[tokio::test]
    async fn keyword_failure_falls_back_to_task() {
        let dir = tempfile::tempdir().unwrap();
        let enhancer = TaskEnhancer::new(open_business(dir.path()), Arc::new(ScriptedModel::failing()), settings())
            .unwrap();
        assert_eq!(
            enhancer.generate_keywords("  share screen  ").await,
            vec!["share screen".to_string()]
        );
    }
}
