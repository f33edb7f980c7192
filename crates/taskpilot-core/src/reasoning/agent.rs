//! Bounded Thought / Action / Observation loop with one search tool.

use super::prompts::{self, FORCE_FINAL, FORMAT_REMINDER};
use super::recovery::{parse_final, parse_step, AgentStep, UrlCollector};
use super::{Reasoning, ReasoningOutcome};
use crate::search::{render_observation, OfficialDocSearch, SearchHit, TOOL_NAME};
use crate::services::CompletionModel;
use std::sync::Arc;

/// Owns everything it needs so it can run on a spawned task.
pub(crate) struct AgentLoop {
    pub model: Arc<dyn CompletionModel>,
    pub search: Option<Arc<OfficialDocSearch>>,
    pub max_iterations: usize,
    pub default_target: String,
    /// Hits per tool observation.
    pub tool_results: usize,
}

impl AgentLoop {
    pub async fn run(self, task: String, seed: Vec<SearchHit>) -> Reasoning {
        let system = prompts::agent_system(&self.default_target);
        let mut scratchpad = prompts::agent_user(&task, &render_observation(&seed));
        let mut urls = UrlCollector::default();
        for hit in &seed {
            urls.push(&hit.url);
        }

        for round in 1..=self.max_iterations {
            let raw = match self.model.complete(&system, &scratchpad).await {
                Ok(raw) => raw,
                Err(e) => {
                    tracing::warn!(target: "taskpilot::reasoning", error = %e, round, "agent completion failed");
                    return Reasoning {
                        rounds: round,
                        ..Reasoning::failed(&task, &e.to_string())
                    };
                }
            };
            urls.scan(&raw);

            let observation = match parse_step(&raw) {
                Some(AgentStep::Final { text, recovered }) => {
                    tracing::debug!(target: "taskpilot::reasoning", round, recovered, "agent finished");
                    return finished(text, recovered, urls, round);
                }
                Some(AgentStep::ToolCall { tool, input }) => {
                    tracing::debug!(target: "taskpilot::reasoning", round, tool = %tool, input = %input, "tool call");
                    self.call_tool(&tool, &input).await
                }
                None => {
                    tracing::debug!(target: "taskpilot::reasoning", round, "unparseable agent output");
                    FORMAT_REMINDER.to_string()
                }
            };
            urls.scan(&observation);
            scratchpad.push_str(&format!(
                "{}\nObservation: {}\nThought:",
                raw.trim(),
                observation
            ));
        }

        tracing::info!(
            target: "taskpilot::reasoning",
            max_iterations = self.max_iterations,
            "iteration cap reached, forcing a final answer"
        );
        scratchpad.push_str(FORCE_FINAL);
        let rounds = self.max_iterations + 1;
        match self.model.complete(&system, &scratchpad).await {
            Ok(raw) => {
                urls.scan(&raw);
                match parse_final(&raw) {
                    Some(AgentStep::Final { text, recovered }) => finished(text, recovered, urls, rounds),
                    _ => Reasoning {
                        rounds,
                        ..Reasoning::failed(&task, &raw)
                    },
                }
            }
            Err(e) => Reasoning {
                rounds,
                ..Reasoning::failed(&task, &e.to_string())
            },
        }
    }

    async fn call_tool(&self, tool: &str, input: &str) -> String {
        if !tool.eq_ignore_ascii_case(TOOL_NAME) {
            return format!("{} is not a valid tool, try {}.", tool, TOOL_NAME);
        }
        match &self.search {
            Some(search) => search.observe(input, self.tool_results).await,
            None => format!(
                "{} is unavailable. Answer from the initial references.",
                TOOL_NAME
            ),
        }
    }
}

fn finished(text: String, recovered: bool, urls: UrlCollector, rounds: usize) -> Reasoning {
    Reasoning {
        text,
        source_urls: urls.into_vec(),
        outcome: if recovered {
            ReasoningOutcome::Recovered
        } else {
            ReasoningOutcome::Completed
        },
        rounds,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::RawHit;
    use crate::testing::{ScriptedModel, StaticSearch};

    fn agent(model: Arc<ScriptedModel>, search: Option<Arc<OfficialDocSearch>>, max: usize) -> AgentLoop {
        AgentLoop {
            model,
            search,
            max_iterations: max,
            default_target: "文件传输助手".to_string(),
            tool_results: 3,
        }
    }

    const FINAL: &str = "Thought: I now know the final answer\nFinal Answer: 1. Right-click the message \
                         2. Choose Pin 3. Verify the pinned banner";

    #[tokio::test]
    async fn tool_observation_feeds_next_round() {
        let backend = Arc::new(StaticSearch::new(vec![RawHit::new(
            "https://www.feishu.cn/hc/zh-CN/articles/9",
            "Pin messages",
            "Right-click a message and choose Pin.",
        )]));
        let search = Arc::new(OfficialDocSearch::new(backend.clone(), "site:feishu.cn"));
        let model = Arc::new(ScriptedModel::new().on_sequence(
            "Action Input",
            vec![
                Ok("Thought: search first\nAction: OfficialDocSearch\nAction Input: pin message".to_string()),
                Ok(FINAL.to_string()),
            ],
        ));

        let result = agent(model.clone(), Some(search), 5)
            .run("pin a message".to_string(), vec![])
            .await;

        assert_eq!(result.outcome, ReasoningOutcome::Completed);
        assert_eq!(result.rounds, 2);
        assert_eq!(result.text, "1. Right-click the message 2. Choose Pin 3. Verify the pinned banner");
        assert_eq!(backend.queries(), vec!["site:feishu.cn pin message".to_string()]);
        assert_eq!(result.source_urls, vec!["https://www.feishu.cn/hc/zh-CN/articles/9".to_string()]);

        let calls = model.calls();
        assert_eq!(calls.len(), 2);
        assert!(calls[1].1.contains("Observation: Found 1 documents"));
        assert!(calls[1].1.ends_with("Thought:"));
    }

    #[tokio::test]
    async fn unknown_tool_gets_a_corrective_observation() {
        let model = Arc::new(ScriptedModel::new().on_sequence(
            "Action Input",
            vec![
                Ok("Action: Google\nAction Input: pin".to_string()),
                Ok(FINAL.to_string()),
            ],
        ));
        let result = agent(model.clone(), None, 3).run("pin".to_string(), vec![]).await;
        assert_eq!(result.outcome, ReasoningOutcome::Completed);
        assert!(model.calls()[1].1.contains("Google is not a valid tool"));
    }

    #[tokio::test]
    async fn cap_forces_one_final_call() {
        let model = Arc::new(ScriptedModel::new().on_sequence(
            "Action Input",
            vec![
                Ok("Thought: still thinking about it".to_string()),
                Ok("Thought: still thinking about it".to_string()),
                Ok("Final Answer: 1. Open Messages 2. Left-click the pinned chat 3. Verify it opens".to_string()),
            ],
        ));
        let result = agent(model.clone(), None, 2).run("open a pinned chat".to_string(), vec![]).await;

        assert_eq!(result.outcome, ReasoningOutcome::Completed);
        assert_eq!(result.rounds, 3);
        let calls = model.calls();
        assert_eq!(calls.len(), 3);
        assert!(calls[1].1.contains(FORMAT_REMINDER));
        assert!(calls[2].1.contains("reached the step limit"));
    }

    #[tokio::test]
    async fn unusable_forced_answer_yields_diagnostic() {
        let model = Arc::new(ScriptedModel::new().otherwise("Thought: hmm"));
        let result = agent(model.clone(), None, 1).run("share my screen".to_string(), vec![]).await;
        assert_eq!(result.outcome, ReasoningOutcome::Failed);
        assert!(result.text.contains("share my screen"));
        assert_eq!(model.calls().len(), 2);
    }

    #[tokio::test]
    async fn completion_error_stops_the_loop() {
        let model = Arc::new(ScriptedModel::failing());
        let result = agent(model.clone(), None, 5).run("share my screen".to_string(), vec![]).await;
        assert_eq!(result.outcome, ReasoningOutcome::Failed);
        assert_eq!(result.rounds, 1);
        assert_eq!(model.calls().len(), 1);
    }

    #[tokio::test]
    async fn malformed_prose_is_recovered() {
        let model = Arc::new(ScriptedModel::new().otherwise(
            "Could not parse LLM output: `1. Left-click the search box 2. Type the contact name 3. Verify the chat opens`",
        ));
        let result = agent(model, None, 5).run("find a contact".to_string(), vec![]).await;
        assert_eq!(result.outcome, ReasoningOutcome::Recovered);
        assert!(result.text.starts_with("1. Left-click the search box"));
    }
}
