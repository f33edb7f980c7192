//! taskpilot-core: task enhancement pipeline, semantic cache, and execution orchestrator.
//!
//! Everything slow and external (completion model, embedding function, web search, GUI
//! actuator) is reached through the traits in [`services`] so the gateway can plug in
//! live clients and tests can plug in doubles.

mod actions;
mod error;
mod knowledge;
mod orchestrator;
mod pipeline;
mod reasoning;
mod search;
pub mod services;
mod shared;

#[cfg(test)]
mod testing;

// Configuration and errors
pub use error::{ActuatorError, ConfigError, EmbedError, LlmError, SearchError, StoreError};
pub use shared::{
    ActuatorSettings, CoreConfig, EmbeddingSettings, EnhancerSettings, HistorySettings, LlmSettings,
    SearchSettings, DEFAULT_MAX_ITERATIONS, DEFAULT_SIMILARITY_THRESHOLD, DEFAULT_TARGET,
};

// Collaborator seams
pub use services::{Actuator, ActuatorOutcome, CompletionModel, Embedder, RawHit, WebSearch};

// Knowledge store and run archive
pub use knowledge::{
    cosine_similarity, ArchivedRun, DomainStatus, EntryDraft, HashingEmbedder, KnowledgeBackend,
    KnowledgeBase, KnowledgeDb, KnowledgeDomain, KnowledgeEntry, ReasoningField, ReasoningKnowledge,
    ScoredEntry, SledKnowledgeTree, TaskArchive, VectorField, DEGRADED_SIMILARITY,
};

// Web retrieval
pub use search::{
    merge_unique, rank_hits, render_observation, score_hit, HitClass, OfficialDocSearch, RankerPolicy,
    SearchHit, TOOL_NAME,
};

// Reasoning and enhancement
pub use pipeline::{parse_keywords, EnhanceResult, EnhanceSource, TaskEnhancer};
pub use reasoning::{Reasoning, ReasoningEngine, ReasoningOutcome, ReasoningStrategy};

// Actions and orchestration
pub use actions::{parse_feasibility, parse_steps, Decomposer, Feasibility, FeasibilityCheck, MAX_STEPS};
pub use orchestrator::{FinalReport, RunState, Step, StepLedger, StepResult, Task, TaskOrchestrator};
