//! Execution orchestrator: enhance, check feasibility, decompose, execute each step, finalize.
//!
//! ```text
//! Enhance -> CheckFeasibility --(can_execute)--> Decompose -> ExecuteStep* -> Finalize
//!                     \------------(otherwise)-------------------------------/
//! ```
//!
//! Steps run strictly in order on one actuator. A failed, erroring, or panicking step is
//! recorded and the loop moves on.

mod ledger;

pub use ledger::{FinalReport, Step, StepLedger, StepResult};

use crate::actions::{Decomposer, FeasibilityCheck};
use crate::knowledge::{now_ms, ArchivedRun, TaskArchive};
use crate::pipeline::{EnhanceResult, TaskEnhancer};
use crate::services::{Actuator, CompletionModel, Embedder};
use crate::shared::{HistorySettings, DEFAULT_TARGET};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Enhance,
    CheckFeasibility,
    Decompose,
    ExecuteStep,
    Finalize,
}

/// One orchestration run. Owned by the run; returned once finalized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub original_text: String,
    pub enhanced_text: Option<String>,
    pub can_execute: Option<bool>,
    pub execution_reason: String,
    pub steps: Vec<Step>,
    pub step_results: Vec<StepResult>,
    pub final_result: Option<FinalReport>,
    /// Enhancement details (source, cache hit, sources).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enhancement: Option<EnhanceResult>,
    /// States visited, in order.
    pub states: Vec<RunState>,
    /// Whether the run reached the task archive.
    pub archived: bool,
}

impl Task {
    fn new(original_text: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            original_text: original_text.to_string(),
            enhanced_text: None,
            can_execute: None,
            execution_reason: String::new(),
            steps: Vec::new(),
            step_results: Vec::new(),
            final_result: None,
            enhancement: None,
            states: Vec::new(),
            archived: false,
        }
    }

    /// Enhanced text once set, else the original.
    pub fn working_text(&self) -> &str {
        self.enhanced_text.as_deref().unwrap_or(&self.original_text)
    }
}

/// Sequences the pipeline, both actions, and the actuator for one task at a time.
pub struct TaskOrchestrator {
    enhancer: Arc<TaskEnhancer>,
    feasibility: FeasibilityCheck,
    decomposer: Decomposer,
    actuator: Arc<dyn Actuator>,
    embedder: Arc<dyn Embedder>,
    archive: Option<TaskArchive>,
    history: HistorySettings,
    target: String,
    step_timeout: Option<Duration>,
}

impl TaskOrchestrator {
    pub fn new(
        enhancer: Arc<TaskEnhancer>,
        model: Arc<dyn CompletionModel>,
        actuator: Arc<dyn Actuator>,
    ) -> Self {
        let embedder = enhancer.knowledge().embedder();
        Self {
            enhancer,
            feasibility: FeasibilityCheck::new(Arc::clone(&model)),
            decomposer: Decomposer::new(model),
            actuator,
            embedder,
            archive: None,
            history: HistorySettings::default(),
            target: DEFAULT_TARGET.to_string(),
            step_timeout: None,
        }
    }

    /// Finished runs are stored here and similar ones are fed back as history.
    pub fn with_archive(mut self, archive: TaskArchive, history: HistorySettings) -> Self {
        self.archive = Some(archive);
        self.history = history;
        self
    }

    pub fn with_target(mut self, target: impl Into<String>, step_timeout: Option<Duration>) -> Self {
        self.target = target.into();
        self.step_timeout = step_timeout;
        self
    }

    pub fn actuator_name(&self) -> &str {
        self.actuator.name()
    }

    /// Runs a task to completion. Never fails; every failure is folded into the result.
    pub async fn run_task(&self, text: &str) -> Task {
        let mut task = Task::new(text);
        let mut ledger = StepLedger::default();
        let mut history = Vec::new();
        let mut enhanced_vector = None;
        let mut state = RunState::Enhance;
        tracing::info!(target: "taskpilot::orchestrator", run_id = %task.id, "task run started");

        while state != RunState::Finalize {
            task.states.push(state);
            state = match state {
                RunState::Enhance => {
                    let enhanced = self.enhancer.enhance(text, false).await;
                    task.enhanced_text = Some(enhanced.enhanced_text.clone());
                    task.enhancement = Some(enhanced);
                    RunState::CheckFeasibility
                }
                RunState::CheckFeasibility => {
                    let (runs, vector) = self.lookup_history(task.working_text()).await;
                    history = runs;
                    enhanced_vector = vector;
                    let verdict = self.feasibility.check(task.working_text(), &history).await;
                    task.can_execute = Some(verdict.can_execute);
                    task.execution_reason = verdict.reason;
                    if verdict.can_execute {
                        RunState::Decompose
                    } else {
                        RunState::Finalize
                    }
                }
                RunState::Decompose => {
                    ledger = StepLedger::new(self.decomposer.decompose(task.working_text(), &history).await);
                    if ledger.is_complete() {
                        RunState::Finalize
                    } else {
                        RunState::ExecuteStep
                    }
                }
                RunState::ExecuteStep => {
                    if let Some(step) = ledger.next_step().cloned() {
                        let (success, error) = self.execute_step(&step, ledger.cursor()).await;
                        ledger.record(success, error);
                    }
                    if ledger.is_complete() {
                        RunState::Finalize
                    } else {
                        RunState::ExecuteStep
                    }
                }
                RunState::Finalize => RunState::Finalize,
            };
        }
        task.states.push(RunState::Finalize);

        self.finalize(&mut task, ledger);
        self.archive_run(&mut task, enhanced_vector);
        task
    }

    /// Similar completed runs and the vector of `enhanced` (kept for archiving).
    async fn lookup_history(&self, enhanced: &str) -> (Vec<ArchivedRun>, Option<Vec<f32>>) {
        let Some(archive) = &self.archive else {
            return (Vec::new(), None);
        };
        let vector = match self.embedder.embed(enhanced).await {
            Ok(vector) => vector,
            Err(e) => {
                tracing::warn!(target: "taskpilot::orchestrator", error = %e, "history lookup skipped");
                return (Vec::new(), None);
            }
        };
        if !self.history.enabled {
            return (Vec::new(), Some(vector));
        }
        let runs: Vec<ArchivedRun> = archive
            .search_by_enhanced_task(&vector, self.history.top_k, self.history.threshold)
            .into_iter()
            .map(|(run, _)| run)
            .collect();
        tracing::debug!(target: "taskpilot::orchestrator", similar_runs = runs.len(), "history lookup");
        (runs, Some(vector))
    }

    /// The actuator runs on its own task so a panic becomes a failed step.
    async fn execute_step(&self, step: &Step, index: usize) -> (bool, Option<String>) {
        let actuator = Arc::clone(&self.actuator);
        let instruction = step.description.clone();
        let target = self.target.clone();
        let timeout = self.step_timeout;
        tracing::info!(
            target: "taskpilot::orchestrator",
            step = index + 1,
            step_id = %step.id,
            instruction = %step.description,
            "executing step"
        );
        let call = tokio::spawn(async move { actuator.execute(&instruction, &target, timeout).await });
        let (success, error) = match call.await {
            Ok(Ok(outcome)) if outcome.success => (true, None),
            Ok(Ok(outcome)) => {
                let error = outcome
                    .error
                    .filter(|e| !e.trim().is_empty())
                    .or_else(|| Some(outcome.stderr.trim().to_string()).filter(|s| !s.is_empty()))
                    .unwrap_or_else(|| "step failed".to_string());
                (false, Some(error))
            }
            Ok(Err(e)) => (false, Some(e.to_string())),
            Err(e) => (false, Some(format!("actuator aborted: {}", e))),
        };
        if let Some(error) = &error {
            tracing::warn!(target: "taskpilot::orchestrator", step_id = %step.id, error = %error, "step failed");
        }
        (success, error)
    }

    fn finalize(&self, task: &mut Task, ledger: StepLedger) {
        let all_success = ledger.all_success();
        let (steps, results) = ledger.into_parts();
        let summary = if task.can_execute == Some(true) {
            format!(
                "Executed {} subtasks, {}",
                results.len(),
                if all_success { "all succeeded" } else { "some failed" }
            )
        } else if task.execution_reason.is_empty() {
            "Task not executable".to_string()
        } else {
            format!("Task not executable: {}", task.execution_reason)
        };
        tracing::info!(
            target: "taskpilot::orchestrator",
            run_id = %task.id,
            total = steps.len(),
            completed = results.len(),
            all_success,
            "{}",
            summary
        );
        task.final_result = Some(FinalReport {
            original_task: task.original_text.clone(),
            enhanced_task: task.working_text().to_string(),
            total_subtasks: steps.len(),
            completed_subtasks: results.len(),
            all_success,
            subtask_results: results.clone(),
            summary,
        });
        task.steps = steps;
        task.step_results = results;
    }

    /// Best-effort; a failed write only clears `archived`.
    fn archive_run(&self, task: &mut Task, enhanced_vector: Option<Vec<f32>>) {
        let Some(archive) = &self.archive else {
            return;
        };
        let run = ArchivedRun {
            id: task.id,
            original_task: task.original_text.clone(),
            enhanced_task: task.working_text().to_string(),
            can_execute: task.can_execute,
            execution_reason: task.execution_reason.clone(),
            steps: task.steps.clone(),
            step_results: task.step_results.clone(),
            all_success: task.final_result.as_ref().is_some_and(|r| r.all_success),
            final_report: task.final_result.clone(),
            enhanced_vector,
            created_at: now_ms(),
        };
        match archive.record(&run) {
            Ok(_) => task.archived = true,
            Err(e) => {
                tracing::warn!(target: "taskpilot::orchestrator", run_id = %task.id, error = %e, "archiving run failed")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::{HashingEmbedder, KnowledgeBase, KnowledgeDb};
    use crate::shared::EnhancerSettings;
    use crate::testing::{RecordingActuator, ScriptedModel};

    const FEASIBILITY: &str = "task feasibility analyst";
    const DECOMPOSE: &str = "You split Feishu desktop";

    struct Fixture {
        _dir: tempfile::TempDir,
        db: KnowledgeDb,
        model: Arc<ScriptedModel>,
        actuator: Arc<RecordingActuator>,
        orchestrator: TaskOrchestrator,
    }

    fn fixture(model: ScriptedModel, actuator: RecordingActuator, archive: bool) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let db = KnowledgeDb::open_path(dir.path()).unwrap();
        let kb = KnowledgeBase::new(Arc::new(db.business().unwrap()), Arc::new(HashingEmbedder::new(128)));
        let model = Arc::new(model);
        let actuator = Arc::new(actuator);
        let enhancer = TaskEnhancer::new(kb, model.clone(), EnhancerSettings::default()).unwrap();
        let mut orchestrator = TaskOrchestrator::new(Arc::new(enhancer), model.clone(), actuator.clone())
            .with_target("nut-js", Some(Duration::from_secs(90)));
        if archive {
            orchestrator = orchestrator.with_archive(db.task_archive().unwrap(), HistorySettings::default());
        }
        Fixture {
            _dir: dir,
            db,
            model,
            actuator,
            orchestrator,
        }
    }

    fn steps_json(steps: &[&str]) -> String {
        let items: Vec<String> = steps
            .iter()
            .enumerate()
            .map(|(i, s)| format!("{{\"id\": \"{}\", \"step\": \"{}\"}}", i + 1, s))
            .collect();
        format!("## Analysis\nok\n## Steps\n```json\n{{\"steps\": [{}]}}\n```", items.join(", "))
    }

    #[tokio::test]
    async fn infeasible_task_goes_straight_to_finalize() {
        let model = ScriptedModel::new().on(FEASIBILITY, "## Verdict\nNO\n## Reason\nNo target conversation.");
        let f = fixture(model, RecordingActuator::new(), false);

        let task = f.orchestrator.run_task("do the thing").await;
        assert_eq!(
            task.states,
            vec![RunState::Enhance, RunState::CheckFeasibility, RunState::Finalize]
        );
        assert_eq!(task.can_execute, Some(false));
        let report = task.final_result.unwrap();
        assert_eq!(report.completed_subtasks, 0);
        assert_eq!(report.total_subtasks, 0);
        assert!(report.all_success);
        assert_eq!(report.summary, "Task not executable: No target conversation.");
        assert!(f.actuator.calls().is_empty());
        assert!(f.model.calls_matching(DECOMPOSE).is_empty());
    }

    #[tokio::test]
    async fn failures_do_not_stop_later_steps() {
        let model = ScriptedModel::new()
            .on(FEASIBILITY, "## Verdict\nYES\n## Reason\nclear")
            .on(
                DECOMPOSE,
                &steps_json(&["open chat", "send broken file", "crash here", "raise error", "verify banner"]),
            );
        let actuator = RecordingActuator::new()
            .fail_on("broken")
            .panic_on("crash")
            .error_on("raise");
        let f = fixture(model, actuator, false);

        let task = f.orchestrator.run_task("send a file to the test account").await;
        assert_eq!(task.step_results.len(), task.steps.len());
        let outcome: Vec<(String, bool)> = task
            .step_results
            .iter()
            .map(|r| (r.step_id.clone(), r.success))
            .collect();
        assert_eq!(
            outcome,
            vec![
                ("1".to_string(), true),
                ("2".to_string(), false),
                ("3".to_string(), false),
                ("4".to_string(), false),
                ("5".to_string(), true),
            ]
        );
        assert!(task.step_results[1].error.as_deref().unwrap().contains("could not perform"));
        assert!(task.step_results[2].error.as_deref().unwrap().starts_with("actuator aborted"));
        assert!(task.step_results[3].error.as_deref().unwrap().contains("ui-tars not installed"));

        let report = task.final_result.unwrap();
        assert!(!report.all_success);
        assert_eq!(report.completed_subtasks, 5);
        assert_eq!(report.summary, "Executed 5 subtasks, some failed");
        assert_eq!(task.states.iter().filter(|s| **s == RunState::ExecuteStep).count(), 5);

        let calls = f.actuator.calls();
        assert_eq!(calls[0], ("open chat".to_string(), "nut-js".to_string(), Some(Duration::from_secs(90))));
        assert_eq!(f.actuator.instructions().last().map(String::as_str), Some("verify banner"));
    }

    #[tokio::test]
    async fn empty_decomposition_finalizes_successfully() {
        let model = ScriptedModel::new()
            .on(FEASIBILITY, "## Verdict\nYES\n## Reason\nclear")
            .on(DECOMPOSE, "I could not produce steps.");
        let f = fixture(model, RecordingActuator::new(), false);

        let task = f.orchestrator.run_task("open settings").await;
        assert_eq!(
            task.states,
            vec![RunState::Enhance, RunState::CheckFeasibility, RunState::Decompose, RunState::Finalize]
        );
        let report = task.final_result.unwrap();
        assert!(report.all_success);
        assert_eq!(report.summary, "Executed 0 subtasks, all succeeded");
    }

    #[tokio::test]
    async fn finished_runs_are_archived_and_fed_back() {
        let model = ScriptedModel::new()
            .on(FEASIBILITY, "## Verdict\nYES\n## Reason\nclear")
            .on(DECOMPOSE, &steps_json(&["right-click the group", "choose Pin"]));
        let f = fixture(model, RecordingActuator::new(), true);

        let first = f.orchestrator.run_task("pin the project group").await;
        assert!(first.archived);
        assert_eq!(first.final_result.as_ref().unwrap().summary, "Executed 2 subtasks, all succeeded");

        let archive = f.db.task_archive().unwrap();
        let stored = archive.get(&first.id).unwrap().unwrap();
        assert!(stored.all_success);
        assert_eq!(stored.steps.len(), 2);
        assert!(stored.enhanced_vector.is_some());

        f.orchestrator.run_task("pin the project group").await;
        let prompts = f.model.calls_matching(FEASIBILITY);
        assert!(prompts[0].1.contains("# History tasks\nNone"));
        assert!(prompts[1].1.contains("[1] Task: pin the project group"));
        assert!(prompts[1].1.contains("right-click the group [ok]"));
        assert!(f.model.calls_matching(DECOMPOSE)[1].1.contains("Verdict: executable (clear)"));
        assert_eq!(archive.count(), 2);
    }
}
