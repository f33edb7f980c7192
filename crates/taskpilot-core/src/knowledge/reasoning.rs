//! Reasoning knowledge: task descriptions paired with one concrete GUI step.
//!
//! Stored in the `reasoning_knowledge` tree through the same adapter as the enhancement
//! cache. The task text occupies the question slot and the step text the answer slot, so
//! each side keeps its own embedding and can be searched on its own.

use super::{KnowledgeBackend, KnowledgeBase, KnowledgeEntry, ScoredEntry, VectorField};
use crate::error::StoreError;
use crate::services::Embedder;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Which side of a (task, step) pair a search runs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasoningField {
    #[default]
    Task,
    Step,
}

impl From<ReasoningField> for VectorField {
    fn from(field: ReasoningField) -> Self {
        match field {
            ReasoningField::Task => VectorField::Question,
            ReasoningField::Step => VectorField::Answer,
        }
    }
}

/// CRUD and similarity search over (task, step) pairs.
#[derive(Clone)]
pub struct ReasoningKnowledge {
    inner: KnowledgeBase,
}

impl ReasoningKnowledge {
    pub fn new(backend: Arc<dyn KnowledgeBackend>, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            inner: KnowledgeBase::new(backend, embedder).with_field_names("task_text", "step_text"),
        }
    }

    /// Pairs whose task is similar to `query_text`, best first.
    pub async fn search_by_task(&self, query_text: &str, top_k: usize, threshold: f32) -> Vec<ScoredEntry> {
        self.search(ReasoningField::Task, query_text, top_k, threshold).await
    }

    /// Pairs whose step is similar to `query_text`, best first.
    pub async fn search_by_step(&self, query_text: &str, top_k: usize, threshold: f32) -> Vec<ScoredEntry> {
        self.search(ReasoningField::Step, query_text, top_k, threshold).await
    }

    pub async fn search(
        &self,
        field: ReasoningField,
        query_text: &str,
        top_k: usize,
        threshold: f32,
    ) -> Vec<ScoredEntry> {
        self.inner.search(field.into(), query_text, top_k, threshold).await
    }

    pub async fn create(&self, task_text: &str, step_text: &str) -> Result<KnowledgeEntry, StoreError> {
        self.inner.create(task_text, step_text).await
    }

    pub fn get(&self, id: u64) -> Result<Option<KnowledgeEntry>, StoreError> {
        self.inner.get(id)
    }

    pub fn list(&self, skip: usize, limit: usize) -> Result<Vec<KnowledgeEntry>, StoreError> {
        self.inner.list(skip, limit)
    }

    pub async fn update(
        &self,
        id: u64,
        task_text: Option<&str>,
        step_text: Option<&str>,
    ) -> Result<Option<KnowledgeEntry>, StoreError> {
        self.inner.update(id, task_text, step_text).await
    }

    pub fn delete(&self, id: u64) -> Result<bool, StoreError> {
        self.inner.delete(id)
    }

    pub fn count(&self) -> Result<usize, StoreError> {
        self.inner.count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::{HashingEmbedder, KnowledgeDb};

    fn open_reasoning(dir: &std::path::Path) -> ReasoningKnowledge {
        let db = KnowledgeDb::open_path(dir).unwrap();
        ReasoningKnowledge::new(Arc::new(db.reasoning().unwrap()), Arc::new(HashingEmbedder::new(128)))
    }

    #[tokio::test]
    async fn search_by_task_and_by_step() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_reasoning(dir.path());
        store
            .create("pin the project group", "Right-click the group and choose Pin")
            .await
            .unwrap();
        store
            .create("start a video meeting", "Left-click the camera icon in the chat header")
            .await
            .unwrap();

        let by_task = store.search_by_task("pin the project group", 1, 0.9).await;
        assert_eq!(by_task.len(), 1);
        assert_eq!(by_task[0].entry.answer_text, "Right-click the group and choose Pin");

        let by_step = store
            .search_by_step("Left-click the camera icon in the chat header", 1, 0.9)
            .await;
        assert_eq!(by_step.len(), 1);
        assert_eq!(by_step[0].entry.question_text, "start a video meeting");
    }

    #[tokio::test]
    async fn crud_reports_task_and_step_names() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_reasoning(dir.path());
        assert!(matches!(
            store.create("  ", "step").await,
            Err(StoreError::EmptyText("task_text"))
        ));

        let entry = store.create("mute a chat", "Choose Mute").await.unwrap();
        assert!(matches!(
            store.update(entry.id, None, Some("")).await,
            Err(StoreError::EmptyText("step_text"))
        ));
        let updated = store
            .update(entry.id, None, Some("Right-click the chat and choose Mute"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.question_vector, entry.question_vector);
        assert_ne!(updated.answer_vector, entry.answer_vector);

        assert_eq!(store.count().unwrap(), 1);
        assert!(store.delete(entry.id).unwrap());
        assert!(store.get(entry.id).unwrap().is_none());
    }
}
