//! Steps paired positionally with their results.

use serde::{Deserialize, Serialize};

/// One atomic instruction produced by decomposition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    pub id: String,
    #[serde(alias = "step")]
    pub description: String,
}

impl Step {
    pub fn new(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
        }
    }
}

/// Outcome of executing one step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepResult {
    pub step_id: String,
    pub step_description: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Steps and results indexed identically: `results[i]` belongs to `steps[i]`.
/// Results can only be appended for the next pending step, so the pairing holds by
/// construction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepLedger {
    steps: Vec<Step>,
    results: Vec<StepResult>,
}

impl StepLedger {
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            steps,
            results: Vec::new(),
        }
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn results(&self) -> &[StepResult] {
        &self.results
    }

    /// Index of the next step to run.
    pub fn cursor(&self) -> usize {
        self.results.len()
    }

    pub fn next_step(&self) -> Option<&Step> {
        self.steps.get(self.cursor())
    }

    /// Records the outcome of the next pending step. Returns None when every step already
    /// has a result.
    pub fn record(&mut self, success: bool, error: Option<String>) -> Option<&StepResult> {
        let step = self.steps.get(self.results.len())?;
        self.results.push(StepResult {
            step_id: step.id.clone(),
            step_description: step.description.clone(),
            success,
            error,
        });
        self.results.last()
    }

    pub fn is_complete(&self) -> bool {
        self.results.len() == self.steps.len()
    }

    /// True when every recorded result succeeded (vacuously for no steps).
    pub fn all_success(&self) -> bool {
        self.results.iter().all(|r| r.success)
    }

    pub fn into_parts(self) -> (Vec<Step>, Vec<StepResult>) {
        (self.steps, self.results)
    }
}

/// Aggregate produced at finalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalReport {
    pub original_task: String,
    pub enhanced_task: String,
    pub total_subtasks: usize,
    pub completed_subtasks: usize,
    pub all_success: bool,
    pub subtask_results: Vec<StepResult>,
    pub summary: String,
}
