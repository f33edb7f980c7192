//! Sled-backed persistence: one tree per knowledge domain plus the completed-run archive.
//!
//! | Tree                 | Domain     | Contents                                        |
//! |----------------------|------------|-------------------------------------------------|
//! | `business_knowledge` | Business   | (question, answer) cache with both vectors      |
//! | `reasoning_knowledge`| Reasoning  | (task, step) pairs with both vectors            |
//! | `task_runs`          | TaskRuns   | finalized task runs, optional enhanced vector   |

use super::{cosine_similarity, KnowledgeBackend, ScoredEntry, VectorField};
use crate::error::StoreError;
use crate::knowledge::archive::TaskArchive;
use serde::{Deserialize, Serialize};
use sled::{Db, Tree};
use std::path::Path;

const ENTRY_PREFIX: &str = "entry/";

/// Durable knowledge domains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KnowledgeDomain {
    /// Enhancement cache: task text -> enhanced procedure.
    Business,
    /// Task descriptions paired with one concrete step.
    Reasoning,
    /// Completed orchestration runs.
    TaskRuns,
}

impl KnowledgeDomain {
    pub fn tree_name(&self) -> &'static str {
        match self {
            Self::Business => "business_knowledge",
            Self::Reasoning => "reasoning_knowledge",
            Self::TaskRuns => "task_runs",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Business => "Business knowledge (enhancement cache)",
            Self::Reasoning => "Reasoning knowledge (task to step)",
            Self::TaskRuns => "Completed task runs",
        }
    }

    pub fn all() -> [Self; 3] {
        [Self::Business, Self::Reasoning, Self::TaskRuns]
    }
}

/// Connectivity and size of one durable tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainStatus {
    pub domain: KnowledgeDomain,
    pub name: String,
    pub tree_name: String,
    pub connected: bool,
    pub entry_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// One (question, answer) pair. In the reasoning tree the question is the task and the
/// answer is the step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeEntry {
    pub id: u64,
    pub question_text: String,
    pub answer_text: String,
    pub question_vector: Vec<f32>,
    pub answer_vector: Vec<f32>,
    /// Unix timestamp (milliseconds).
    pub created_at: i64,
    /// Unix timestamp (milliseconds).
    pub updated_at: i64,
}

impl KnowledgeEntry {
    pub fn to_bytes(&self) -> Result<Vec<u8>, StoreError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        serde_json::from_slice(bytes).ok()
    }

    pub fn text(&self, field: VectorField) -> &str {
        match field {
            VectorField::Question => &self.question_text,
            VectorField::Answer => &self.answer_text,
        }
    }

    pub fn vector(&self, field: VectorField) -> &[f32] {
        match field {
            VectorField::Question => &self.question_vector,
            VectorField::Answer => &self.answer_vector,
        }
    }
}

/// Fields of an entry that does not have an id yet.
#[derive(Debug, Clone)]
pub struct EntryDraft {
    pub question_text: String,
    pub answer_text: String,
    pub question_vector: Vec<f32>,
    pub answer_vector: Vec<f32>,
}

pub(crate) fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

fn entry_key(id: u64) -> String {
    format!("{}{:020}", ENTRY_PREFIX, id)
}

/// Sled database holding every knowledge domain.
#[derive(Clone)]
pub struct KnowledgeDb {
    db: Db,
}

impl KnowledgeDb {
    /// Opens or creates the database at the given path.
    pub fn open_path<P: AsRef<Path>>(path: P) -> Result<Self, sled::Error> {
        let db = sled::open(path)?;
        Ok(Self { db })
    }

    /// Backend for the business (enhancement cache) domain.
    pub fn business(&self) -> Result<SledKnowledgeTree, sled::Error> {
        self.knowledge_tree(KnowledgeDomain::Business)
    }

    /// Backend for the (task, step) reasoning domain.
    pub fn reasoning(&self) -> Result<SledKnowledgeTree, sled::Error> {
        self.knowledge_tree(KnowledgeDomain::Reasoning)
    }

    fn knowledge_tree(&self, domain: KnowledgeDomain) -> Result<SledKnowledgeTree, sled::Error> {
        let tree = self.db.open_tree(domain.tree_name())?;
        Ok(SledKnowledgeTree {
            db: self.db.clone(),
            tree,
            domain,
        })
    }

    /// Archive of finalized task runs.
    pub fn task_archive(&self) -> Result<TaskArchive, sled::Error> {
        let tree = self.db.open_tree(KnowledgeDomain::TaskRuns.tree_name())?;
        Ok(TaskArchive::new(tree))
    }

    /// Returns status information for every domain tree.
    pub fn domain_status(&self) -> Vec<DomainStatus> {
        KnowledgeDomain::all()
            .iter()
            .map(|domain| match self.db.open_tree(domain.tree_name()) {
                Ok(tree) => DomainStatus {
                    domain: *domain,
                    name: domain.label().to_string(),
                    tree_name: domain.tree_name().to_string(),
                    connected: true,
                    entry_count: tree.len(),
                    error: None,
                },
                Err(e) => DomainStatus {
                    domain: *domain,
                    name: domain.label().to_string(),
                    tree_name: domain.tree_name().to_string(),
                    connected: false,
                    entry_count: 0,
                    error: Some(e.to_string()),
                },
            })
            .collect()
    }
}

/// One domain tree. Nearest-neighbour queries are an exact cosine scan.
pub struct SledKnowledgeTree {
    db: Db,
    tree: Tree,
    domain: KnowledgeDomain,
}

impl SledKnowledgeTree {
    pub fn domain(&self) -> KnowledgeDomain {
        self.domain
    }

    fn entries(&self) -> impl Iterator<Item = Result<KnowledgeEntry, StoreError>> + '_ {
        self.tree.scan_prefix(ENTRY_PREFIX).map(|item| {
            let (k, v) = item?;
            KnowledgeEntry::from_bytes(&v).ok_or_else(|| StoreError::Corrupt {
                key: String::from_utf8_lossy(&k).into_owned(),
            })
        })
    }

    fn write(&self, entry: &KnowledgeEntry) -> Result<bool, StoreError> {
        let key = entry_key(entry.id);
        let prev = self.tree.insert(key.as_bytes(), entry.to_bytes()?)?;
        self.tree.flush()?;
        let is_update = prev.is_some();
        tracing::info!(
            target: "taskpilot::knowledge",
            tree = self.domain.tree_name(),
            id = entry.id,
            action = if is_update { "UPDATE" } else { "INSERT" },
            "knowledge entry {} {}",
            entry.id,
            if is_update { "updated" } else { "inserted" }
        );
        Ok(is_update)
    }
}

impl KnowledgeBackend for SledKnowledgeTree {
    fn insert(&self, draft: EntryDraft) -> Result<KnowledgeEntry, StoreError> {
        let now = now_ms();
        let entry = KnowledgeEntry {
            id: self.db.generate_id()?,
            question_text: draft.question_text,
            answer_text: draft.answer_text,
            question_vector: draft.question_vector,
            answer_vector: draft.answer_vector,
            created_at: now,
            updated_at: now,
        };
        self.write(&entry)?;
        Ok(entry)
    }

    fn get(&self, id: u64) -> Result<Option<KnowledgeEntry>, StoreError> {
        let key = entry_key(id);
        match self.tree.get(key.as_bytes())? {
            Some(bytes) => KnowledgeEntry::from_bytes(&bytes)
                .map(Some)
                .ok_or(StoreError::Corrupt { key }),
            None => Ok(None),
        }
    }

    fn replace(&self, entry: &KnowledgeEntry) -> Result<bool, StoreError> {
        if !self.tree.contains_key(entry_key(entry.id).as_bytes())? {
            return Ok(false);
        }
        self.write(entry)
    }

    fn remove(&self, id: u64) -> Result<bool, StoreError> {
        let prev = self.tree.remove(entry_key(id).as_bytes())?;
        self.tree.flush()?;
        if prev.is_some() {
            tracing::info!(
                target: "taskpilot::knowledge",
                tree = self.domain.tree_name(),
                id,
                action = "REMOVE",
                "knowledge entry {} removed",
                id
            );
        }
        Ok(prev.is_some())
    }

    fn list(&self, skip: usize, limit: usize) -> Result<Vec<KnowledgeEntry>, StoreError> {
        self.entries().skip(skip).take(limit).collect()
    }

    fn nearest(
        &self,
        field: VectorField,
        query: &[f32],
        top_k: usize,
    ) -> Result<Vec<ScoredEntry>, StoreError> {
        let mut scored = Vec::new();
        for entry in self.entries() {
            let entry = entry?;
            let stored = entry.vector(field);
            if stored.len() != query.len() {
                return Err(StoreError::DimensionMismatch {
                    query: query.len(),
                    stored: stored.len(),
                });
            }
            let similarity = cosine_similarity(query, stored);
            scored.push(ScoredEntry::scored(entry, similarity));
        }
        scored.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(top_k);
        Ok(scored)
    }

    fn text_contains(
        &self,
        field: VectorField,
        needle: &str,
        limit: usize,
    ) -> Result<Vec<KnowledgeEntry>, StoreError> {
        let needle = needle.to_lowercase();
        let mut out = Vec::new();
        for entry in self.entries() {
            // A corrupt record must not sink the degraded path as well.
            let Ok(entry) = entry else { continue };
            if entry.text(field).to_lowercase().contains(&needle) {
                out.push(entry);
                if out.len() >= limit {
                    break;
                }
            }
        }
        Ok(out)
    }

    fn count(&self) -> Result<usize, StoreError> {
        Ok(self.tree.scan_prefix(ENTRY_PREFIX).count())
    }
}
