//! Reasoning engine: turns a task plus reference hits into an enhanced task.
//!
//! Two strategies share one entry point, [`ReasoningEngine::reason`]:
//!
//! | strategy     | completion calls                | tool use                 |
//! |--------------|---------------------------------|--------------------------|
//! | `SingleShot` | exactly one                     | none                     |
//! | `Iterative`  | up to `max_iterations` + 1      | [`OfficialDocSearch`]    |
//!
//! Neither strategy returns an error. A result whose outcome is
//! [`ReasoningOutcome::Failed`] carries a diagnostic string instead of an answer.

mod agent;
pub(crate) mod prompts;
mod recovery;
mod single_shot;

use recovery::diagnostic;

use crate::error::ConfigError;
use crate::search::{OfficialDocSearch, SearchHit};
use crate::services::CompletionModel;
use crate::shared::EnhancerSettings;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Hits rendered per tool observation.
const TOOL_RESULTS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum ReasoningStrategy {
    SingleShot,
    Iterative { max_iterations: usize },
}

impl ReasoningStrategy {
    pub fn from_settings(settings: &EnhancerSettings) -> Result<Self, ConfigError> {
        match settings.strategy.trim().to_lowercase().as_str() {
            "single_shot" | "single-shot" | "" => Ok(Self::SingleShot),
            "iterative" | "agent" | "react" => Ok(Self::Iterative {
                max_iterations: settings.max_iterations.max(1),
            }),
            other => Err(ConfigError::Invalid {
                key: "enhancer.strategy",
                reason: format!("unknown strategy `{}`", other),
            }),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::SingleShot => "single_shot",
            Self::Iterative { .. } => "iterative",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasoningOutcome {
    /// The model produced a well-formed answer.
    Completed,
    /// The answer was extracted heuristically from malformed output.
    Recovered,
    /// No usable answer; `text` is a diagnostic.
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reasoning {
    pub text: String,
    pub source_urls: Vec<String>,
    pub outcome: ReasoningOutcome,
    /// Completion calls issued.
    pub rounds: usize,
}

impl Reasoning {
    pub fn failed(task: &str, error: &str) -> Self {
        Self {
            text: diagnostic(task, error),
            source_urls: Vec::new(),
            outcome: ReasoningOutcome::Failed,
            rounds: 0,
        }
    }

    pub fn is_usable(&self) -> bool {
        self.outcome != ReasoningOutcome::Failed
    }
}

/// Explicitly constructed; the pipeline owns one.
pub struct ReasoningEngine {
    strategy: ReasoningStrategy,
    model: Arc<dyn CompletionModel>,
    search: Option<Arc<OfficialDocSearch>>,
    default_target: String,
}

impl ReasoningEngine {
    pub fn new(strategy: ReasoningStrategy, model: Arc<dyn CompletionModel>) -> Self {
        Self {
            strategy,
            model,
            search: None,
            default_target: EnhancerSettings::default().default_target,
        }
    }

    /// Tool backing the iterative strategy. Without one, tool calls are answered with
    /// an "unavailable" observation.
    pub fn with_search(mut self, search: Arc<OfficialDocSearch>) -> Self {
        self.search = Some(search);
        self
    }

    pub fn with_default_target(mut self, default_target: impl Into<String>) -> Self {
        self.default_target = default_target.into();
        self
    }

    pub fn strategy(&self) -> ReasoningStrategy {
        self.strategy
    }

    pub async fn reason(&self, task: &str, hits: &[SearchHit]) -> Reasoning {
        let result = match self.strategy {
            ReasoningStrategy::SingleShot => {
                single_shot::run(self.model.as_ref(), &self.default_target, task, hits).await
            }
            ReasoningStrategy::Iterative { max_iterations } => {
                let agent = agent::AgentLoop {
                    model: Arc::clone(&self.model),
                    search: self.search.clone(),
                    max_iterations,
                    default_target: self.default_target.clone(),
                    tool_results: TOOL_RESULTS,
                };
                let worker = tokio::spawn(agent.run(task.to_string(), hits.to_vec()));
                match worker.await {
                    Ok(result) => result,
                    Err(e) => {
                        tracing::error!(target: "taskpilot::reasoning", error = %e, "agent worker aborted");
                        Reasoning::failed(task, &e.to_string())
                    }
                }
            }
        };
        tracing::info!(
            target: "taskpilot::reasoning",
            strategy = self.strategy.name(),
            outcome = ?result.outcome,
            rounds = result.rounds,
            sources = result.source_urls.len(),
            "reasoning finished"
        );
        result
    }
}
