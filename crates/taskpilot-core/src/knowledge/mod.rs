//! Semantic cache of (question, answer) pairs, the (task, step) reasoning store, and the
//! archive of completed runs.
//!
//! [`KnowledgeBase`] is the adapter the pipeline talks to. It embeds text through an
//! [`Embedder`] and delegates storage to a [`KnowledgeBackend`]. When the backend's vector
//! query fails, searches degrade to a case-insensitive substring match and report
//! [`DEGRADED_SIMILARITY`] instead of raising.

mod archive;
mod embedding;
mod reasoning;
mod store;

pub use archive::{ArchivedRun, TaskArchive};
pub use embedding::HashingEmbedder;
pub use reasoning::{ReasoningField, ReasoningKnowledge};
pub use store::{DomainStatus, EntryDraft, KnowledgeDb, KnowledgeDomain, KnowledgeEntry, SledKnowledgeTree};

pub(crate) use store::now_ms;

use crate::error::StoreError;
use crate::services::Embedder;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Similarity reported for matches found by the substring fallback.
pub const DEGRADED_SIMILARITY: f32 = 0.5;

/// Which text/vector pair of an entry a search runs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VectorField {
    #[default]
    Question,
    Answer,
}

/// An entry with its similarity to the query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredEntry {
    pub entry: KnowledgeEntry,
    pub similarity: f32,
    /// Set when the match came from the substring fallback rather than a vector query.
    #[serde(default)]
    pub degraded: bool,
}

impl ScoredEntry {
    pub fn scored(entry: KnowledgeEntry, similarity: f32) -> Self {
        Self {
            entry,
            similarity,
            degraded: false,
        }
    }

    fn fallback(entry: KnowledgeEntry) -> Self {
        Self {
            entry,
            similarity: DEGRADED_SIMILARITY,
            degraded: true,
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded
    }
}

/// Storage engine behind the adapter. Every write commits before returning.
pub trait KnowledgeBackend: Send + Sync {
    fn insert(&self, draft: EntryDraft) -> Result<KnowledgeEntry, StoreError>;

    fn get(&self, id: u64) -> Result<Option<KnowledgeEntry>, StoreError>;

    /// Overwrites an existing entry. Returns false if the id is unknown.
    fn replace(&self, entry: &KnowledgeEntry) -> Result<bool, StoreError>;

    fn remove(&self, id: u64) -> Result<bool, StoreError>;

    fn list(&self, skip: usize, limit: usize) -> Result<Vec<KnowledgeEntry>, StoreError>;

    /// At most `top_k` entries ordered by cosine similarity, descending.
    fn nearest(
        &self,
        field: VectorField,
        query: &[f32],
        top_k: usize,
    ) -> Result<Vec<ScoredEntry>, StoreError>;

    /// Entries whose text contains `needle`, ignoring case.
    fn text_contains(
        &self,
        field: VectorField,
        needle: &str,
        limit: usize,
    ) -> Result<Vec<KnowledgeEntry>, StoreError>;

    fn count(&self) -> Result<usize, StoreError>;

    /// Discards uncommitted work after a failed query. Engines that commit every write
    /// immediately have nothing to undo.
    fn rollback(&self) {}
}

/// Cosine similarity in [-1, 1]; 0 when either vector has no magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0_f64;
    let mut norm_a = 0.0_f64;
    let mut norm_b = 0.0_f64;
    for (x, y) in a.iter().zip(b.iter()) {
        let (x, y) = (*x as f64, *y as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    ((dot / (norm_a.sqrt() * norm_b.sqrt())) as f32).clamp(-1.0, 1.0)
}

/// Knowledge store adapter used by the enhancement pipeline and the gateway.
#[derive(Clone)]
pub struct KnowledgeBase {
    backend: Arc<dyn KnowledgeBackend>,
    embedder: Arc<dyn Embedder>,
    /// Names reported for the (question, answer) texts in validation errors.
    field_names: (&'static str, &'static str),
}

impl KnowledgeBase {
    pub fn new(backend: Arc<dyn KnowledgeBackend>, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            backend,
            embedder,
            field_names: ("question_text", "answer_text"),
        }
    }

    pub fn with_field_names(mut self, question: &'static str, answer: &'static str) -> Self {
        self.field_names = (question, answer);
        self
    }

    pub fn embedder(&self) -> Arc<dyn Embedder> {
        Arc::clone(&self.embedder)
    }

    /// Entries whose question is similar to `query_text`, best first.
    pub async fn search_by_question(
        &self,
        query_text: &str,
        top_k: usize,
        threshold: f32,
    ) -> Vec<ScoredEntry> {
        self.search(VectorField::Question, query_text, top_k, threshold)
            .await
    }

    /// Entries whose answer is similar to `query_text`, best first.
    pub async fn search_by_answer(
        &self,
        query_text: &str,
        top_k: usize,
        threshold: f32,
    ) -> Vec<ScoredEntry> {
        self.search(VectorField::Answer, query_text, top_k, threshold)
            .await
    }

    pub async fn search(
        &self,
        field: VectorField,
        query_text: &str,
        top_k: usize,
        threshold: f32,
    ) -> Vec<ScoredEntry> {
        if top_k == 0 || query_text.trim().is_empty() {
            return Vec::new();
        }
        let vector_hits = match self.embedder.embed(query_text).await {
            Ok(vector) => self.backend.nearest(field, &vector, top_k),
            Err(e) => Err(StoreError::from(e)),
        };
        match vector_hits {
            Ok(hits) => hits
                .into_iter()
                .filter(|hit| hit.similarity >= threshold)
                .take(top_k)
                .collect(),
            Err(e) => {
                tracing::warn!(
                    target: "taskpilot::knowledge",
                    error = %e,
                    field = ?field,
                    "vector search unavailable, falling back to substring match"
                );
                self.backend.rollback();
                self.substring_fallback(field, query_text, top_k)
            }
        }
    }

    fn substring_fallback(&self, field: VectorField, query_text: &str, top_k: usize) -> Vec<ScoredEntry> {
        match self.backend.text_contains(field, query_text.trim(), top_k) {
            Ok(entries) => entries.into_iter().map(ScoredEntry::fallback).collect(),
            Err(e) => {
                tracing::warn!(target: "taskpilot::knowledge", error = %e, "substring fallback failed");
                Vec::new()
            }
        }
    }

    /// Embeds both texts and persists a new entry.
    pub async fn create(&self, question_text: &str, answer_text: &str) -> Result<KnowledgeEntry, StoreError> {
        let question_text = non_empty(question_text, self.field_names.0)?;
        let answer_text = non_empty(answer_text, self.field_names.1)?;
        let question_vector = self.embedder.embed(question_text).await?;
        let answer_vector = self.embedder.embed(answer_text).await?;
        self.backend.insert(EntryDraft {
            question_text: question_text.to_string(),
            answer_text: answer_text.to_string(),
            question_vector,
            answer_vector,
        })
    }

    pub fn get(&self, id: u64) -> Result<Option<KnowledgeEntry>, StoreError> {
        self.backend.get(id)
    }

    pub fn list(&self, skip: usize, limit: usize) -> Result<Vec<KnowledgeEntry>, StoreError> {
        self.backend.list(skip, limit)
    }

    /// Changes either text; the matching vector is recomputed. Returns None for unknown ids.
    pub async fn update(
        &self,
        id: u64,
        question_text: Option<&str>,
        answer_text: Option<&str>,
    ) -> Result<Option<KnowledgeEntry>, StoreError> {
        let Some(mut entry) = self.backend.get(id)? else {
            return Ok(None);
        };
        if let Some(question) = question_text {
            let question = non_empty(question, self.field_names.0)?;
            if question != entry.question_text {
                entry.question_vector = self.embedder.embed(question).await?;
                entry.question_text = question.to_string();
            }
        }
        if let Some(answer) = answer_text {
            let answer = non_empty(answer, self.field_names.1)?;
            if answer != entry.answer_text {
                entry.answer_vector = self.embedder.embed(answer).await?;
                entry.answer_text = answer.to_string();
            }
        }
        entry.updated_at = now_ms();
        if self.backend.replace(&entry)? {
            Ok(Some(entry))
        } else {
            Ok(None)
        }
    }

    pub fn delete(&self, id: u64) -> Result<bool, StoreError> {
        self.backend.remove(id)
    }

    pub fn count(&self) -> Result<usize, StoreError> {
        self.backend.count()
    }
}

fn non_empty<'a>(text: &'a str, field: &'static str) -> Result<&'a str, StoreError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        Err(StoreError::EmptyText(field))
    } else {
        Ok(trimmed)
    }
}
