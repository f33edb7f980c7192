//! LLM-backed transformations over structured markdown answers: feasibility and decomposition.

mod decompose;
mod feasibility;
mod markdown;

pub use decompose::{parse_steps, Decomposer, MAX_STEPS};
pub use feasibility::{parse_feasibility, Feasibility, FeasibilityCheck};

use crate::knowledge::ArchivedRun;

/// History block shared by both prompts.
pub fn render_history(runs: &[ArchivedRun]) -> String {
    if runs.is_empty() {
        return "None".to_string();
    }
    runs.iter()
        .enumerate()
        .map(|(i, run)| format!("[{}] {}", i + 1, run.history_summary()))
        .collect::<Vec<_>>()
        .join("\n\n")
}
