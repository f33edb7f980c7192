use super::markdown::extract_section;
use super::render_history;
use crate::knowledge::ArchivedRun;
use crate::services::CompletionModel;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

const VERDICT_TITLES: &[&str] = &["Verdict", "判断结果"];
const REASON_TITLES: &[&str] = &["Reason", "判断理由"];

const SYSTEM_PROMPT: &str = "You are a task feasibility analyst. Decide whether the given test task \
can be executed by a GUI automation framework on the Feishu desktop client. When history tasks are \
provided, use how they went as a reference.

Consider:
1. Whether the task is clear and unambiguous.
2. Whether a GUI automation tool can perform it.
3. Whether it has concrete execution steps.";

fn user_prompt(history: &str, task: &str) -> String {
    format!(
        "# History tasks\n{}\n\n# Task\n{}\n\n\
         Answer strictly in this structure, using markdown headings:\n\
         ## Analysis\nyour reasoning\n\n\
         ## Verdict\nonly \"YES\" or \"NO\"\n\n\
         ## Reason\nthe basis for the verdict",
        history, task
    )
}

/// Feasibility verdict with its rationale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feasibility {
    pub can_execute: bool,
    pub reason: String,
}

impl Feasibility {
    fn rejected(reason: impl Into<String>) -> Self {
        Self {
            can_execute: false,
            reason: reason.into(),
        }
    }
}

/// Classifies a task as executable or not.
pub struct FeasibilityCheck {
    model: Arc<dyn CompletionModel>,
}

impl FeasibilityCheck {
    pub fn new(model: Arc<dyn CompletionModel>) -> Self {
        Self { model }
    }

    pub async fn check(&self, task: &str, history: &[ArchivedRun]) -> Feasibility {
        let prompt = user_prompt(&render_history(history), task);
        let verdict = match self.model.complete(SYSTEM_PROMPT, &prompt).await {
            Ok(raw) => parse_feasibility(&raw),
            Err(e) => {
                tracing::warn!(target: "taskpilot::actions", error = %e, "feasibility check failed");
                Feasibility::rejected(format!("feasibility check failed: {}", e))
            }
        };
        tracing::info!(target: "taskpilot::actions", can_execute = verdict.can_execute, "feasibility verdict");
        verdict
    }
}

/// A missing verdict or reason section means not executable, with no reason.
/// The verdict is decided by its first word only, so "YES (NO blockers)" is a yes.
pub fn parse_feasibility(raw: &str) -> Feasibility {
    let (Some(verdict), Some(reason)) = (
        extract_section(raw, VERDICT_TITLES),
        extract_section(raw, REASON_TITLES),
    ) else {
        return Feasibility::rejected("");
    };
    Feasibility {
        can_execute: verdict_word(&verdict).eq_ignore_ascii_case("YES"),
        reason,
    }
}

/// First word of the verdict with markdown emphasis and punctuation stripped.
fn verdict_word(verdict: &str) -> &str {
    verdict
        .split(|c: char| c.is_whitespace() || c == '(' || c == '（')
        .map(|word| word.trim_matches(|c: char| !c.is_alphanumeric()))
        .find(|word| !word.is_empty())
        .unwrap_or("")
}
