//! Archive of finalized task runs (`task_runs` tree).
//!
//! Each run is stored denormalized so it can be replayed as history for later runs:
//! feasibility verdict, steps, per-step results, the final report, and optionally a
//! vector of the enhanced text for similarity lookup.

use super::cosine_similarity;
use crate::error::StoreError;
use crate::orchestrator::{FinalReport, Step, StepResult};
use serde::{Deserialize, Serialize};
use sled::Tree;
use uuid::Uuid;

const RUN_PREFIX: &str = "run/";

/// One completed orchestration run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchivedRun {
    pub id: Uuid,
    pub original_task: String,
    pub enhanced_task: String,
    pub can_execute: Option<bool>,
    #[serde(default)]
    pub execution_reason: String,
    #[serde(default)]
    pub steps: Vec<Step>,
    #[serde(default)]
    pub step_results: Vec<StepResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_report: Option<FinalReport>,
    pub all_success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enhanced_vector: Option<Vec<f32>>,
    /// Unix timestamp (milliseconds).
    pub created_at: i64,
}

impl ArchivedRun {
    pub fn to_bytes(&self) -> Result<Vec<u8>, StoreError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        serde_json::from_slice(bytes).ok()
    }

    /// Short block used in feasibility/decomposition prompts.
    pub fn history_summary(&self) -> String {
        let verdict = match self.can_execute {
            Some(true) => "executable",
            Some(false) => "not executable",
            None => "unknown",
        };
        let mut out = format!("Task: {}\nVerdict: {}", self.enhanced_task, verdict);
        if !self.execution_reason.is_empty() {
            out.push_str(&format!(" ({})", self.execution_reason));
        }
        for (step, result) in self.steps.iter().zip(self.step_results.iter()) {
            out.push_str(&format!(
                "\n  {}. {} [{}]",
                step.id,
                step.description,
                if result.success { "ok" } else { "failed" }
            ));
        }
        out
    }
}

/// Sled tree of [`ArchivedRun`] records keyed by run id.
#[derive(Clone)]
pub struct TaskArchive {
    tree: Tree,
}

impl TaskArchive {
    pub(crate) fn new(tree: Tree) -> Self {
        Self { tree }
    }

    fn key(id: &Uuid) -> String {
        format!("{}{}", RUN_PREFIX, id)
    }

    fn runs(&self) -> impl Iterator<Item = ArchivedRun> + '_ {
        self.tree
            .scan_prefix(RUN_PREFIX)
            .filter_map(|item| item.ok())
            .filter_map(|(_, v)| ArchivedRun::from_bytes(&v))
    }

    /// Persists a run (overwrites an existing run with the same id).
    pub fn record(&self, run: &ArchivedRun) -> Result<Uuid, StoreError> {
        self.tree.insert(Self::key(&run.id).as_bytes(), run.to_bytes()?)?;
        self.tree.flush()?;
        tracing::info!(
            target: "taskpilot::archive",
            run_id = %run.id,
            steps = run.steps.len(),
            all_success = run.all_success,
            "task run archived"
        );
        Ok(run.id)
    }

    pub fn get(&self, id: &Uuid) -> Result<Option<ArchivedRun>, StoreError> {
        let key = Self::key(id);
        match self.tree.get(key.as_bytes())? {
            Some(bytes) => ArchivedRun::from_bytes(&bytes)
                .map(Some)
                .ok_or(StoreError::Corrupt { key }),
            None => Ok(None),
        }
    }

    /// Runs ordered newest first.
    pub fn list(&self, skip: usize, limit: usize) -> Vec<ArchivedRun> {
        let mut runs: Vec<ArchivedRun> = self.runs().collect();
        runs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        runs.into_iter().skip(skip).take(limit).collect()
    }

    pub fn delete(&self, id: &Uuid) -> Result<bool, StoreError> {
        let prev = self.tree.remove(Self::key(id).as_bytes())?;
        self.tree.flush()?;
        Ok(prev.is_some())
    }

    pub fn count(&self) -> usize {
        self.tree.scan_prefix(RUN_PREFIX).count()
    }

    /// Runs whose enhanced-text vector is similar to `vector`, best first.
    /// Runs without a vector, or with a vector of another dimension, are skipped.
    pub fn search_by_enhanced_task(&self, vector: &[f32], top_k: usize, threshold: f32) -> Vec<(ArchivedRun, f32)> {
        let mut scored: Vec<(ArchivedRun, f32)> = self
            .runs()
            .filter_map(|run| {
                let similarity = match run.enhanced_vector.as_deref() {
                    Some(stored) if stored.len() == vector.len() => cosine_similarity(vector, stored),
                    _ => return None,
                };
                (similarity >= threshold).then_some((run, similarity))
            })
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);
        scored
    }
}
