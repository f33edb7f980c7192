use super::markdown::extract_json;
use super::render_history;
use crate::knowledge::ArchivedRun;
use crate::orchestrator::Step;
use crate::services::CompletionModel;
use std::collections::HashSet;
use std::sync::Arc;

/// Most steps a task may be split into.
pub const MAX_STEPS: usize = 5;

const STEPS_TITLES: &[&str] = &["Steps", "步骤列表"];

const SYSTEM_PROMPT: &str = r#"You split Feishu desktop client test tasks into steps for a Windows GUI automation framework. When history tasks are provided, you may reuse how they were split.

# Environment
1. Windows 10/11, Chinese locale.
2. The Feishu desktop client is installed, running, and logged in to the test account.

# Rules
1. Every operation happens under the single logged-in test account.
2. No vague concepts or references. Do not re-check earlier steps, but every step must visibly change the client.
3. Operations with a strong logical order, such as copy then paste, belong in one step.
4. Every step must be executable on its own.
5. All messages are sent to the test account.
6. At most 5 steps.

# Output structure
Use markdown headings.
## Analysis
your reasoning

## Steps
The step list as JSON:
```json
{
  "steps": [
    {"id": "1", "step": "step description"},
    {"id": "2", "step": "step description"}
  ]
}
```"#;

fn user_prompt(history: &str, task: &str) -> String {
    format!("# History tasks\n{}\n\n# Task\n{}", history, task)
}

/// Expands a task into an ordered step list.
pub struct Decomposer {
    model: Arc<dyn CompletionModel>,
}

impl Decomposer {
    pub fn new(model: Arc<dyn CompletionModel>) -> Self {
        Self { model }
    }

    /// Empty on any failure.
    pub async fn decompose(&self, task: &str, history: &[ArchivedRun]) -> Vec<Step> {
        let prompt = user_prompt(&render_history(history), task);
        match self.model.complete(SYSTEM_PROMPT, &prompt).await {
            Ok(raw) => {
                let steps = parse_steps(&raw);
                tracing::info!(target: "taskpilot::actions", steps = steps.len(), "task decomposed");
                steps
            }
            Err(e) => {
                tracing::warn!(target: "taskpilot::actions", error = %e, "decomposition failed");
                Vec::new()
            }
        }
    }
}

/// Reads `{"steps": [{"id", "step"}]}` (or a bare array). Entries without text are
/// dropped, the list is capped at [`MAX_STEPS`], and missing or repeated ids are
/// replaced by positions.
pub fn parse_steps(raw: &str) -> Vec<Step> {
    let Some(value) = extract_json(raw, STEPS_TITLES) else {
        tracing::warn!(target: "taskpilot::actions", "no step list found in decomposition output");
        return Vec::new();
    };
    let items = match value.get("steps").unwrap_or(&value).as_array() {
        Some(items) => items.clone(),
        None => return Vec::new(),
    };

    let mut steps: Vec<Step> = items
        .iter()
        .filter_map(|item| {
            let description = item
                .get("step")
                .or_else(|| item.get("description"))
                .and_then(|v| v.as_str())?
                .trim();
            if description.is_empty() {
                return None;
            }
            let id = match item.get("id") {
                Some(serde_json::Value::String(s)) => s.trim().to_string(),
                Some(serde_json::Value::Number(n)) => n.to_string(),
                _ => String::new(),
            };
            Some(Step::new(id, description))
        })
        .collect();

    if steps.len() > MAX_STEPS {
        tracing::warn!(
            target: "taskpilot::actions",
            returned = steps.len(),
            kept = MAX_STEPS,
            "step list over limit, truncating"
        );
        steps.truncate(MAX_STEPS);
    }

    let mut seen = HashSet::new();
    let ids_usable = steps.iter().all(|s| !s.id.is_empty() && seen.insert(s.id.clone()));
    if !ids_usable {
        for (i, step) in steps.iter_mut().enumerate() {
            step.id = (i + 1).to_string();
        }
    }
    steps
}
