//! Error taxonomy shared by the core and the concrete collaborators.
//!
//! Only [`ConfigError`] is fatal. Every other error is recovered inside the layer that
//! observes it (substring fallback, empty hit list, diagnostic text, failed step result).

use thiserror::Error;

/// Fatal construction-time error: bad settings or missing external-service credentials.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
    #[error("missing required credential `{0}`")]
    MissingCredential(&'static str),
    #[error("invalid setting `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Failure of the embedding function.
#[derive(Debug, Error)]
pub enum EmbedError {
    #[error("embedding request failed: {0}")]
    Request(String),
    #[error("embedding service returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("embedding response malformed: {0}")]
    Malformed(String),
}

/// Failure inside the knowledge store or task archive.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage engine error: {0}")]
    Sled(#[from] sled::Error),
    #[error(transparent)]
    Embedding(#[from] EmbedError),
    #[error("vector dimension mismatch: query has {query}, stored record has {stored}")]
    DimensionMismatch { query: usize, stored: usize },
    #[error("record {key} could not be decoded")]
    Corrupt { key: String },
    #[error("record could not be encoded: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("{0} must not be empty")]
    EmptyText(&'static str),
}

/// Failure of the completion function.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("completion request failed: {0}")]
    Request(String),
    #[error("completion service returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("completion response contained no text")]
    EmptyResponse,
    #[error("completion timed out after {0}s")]
    Timeout(u64),
}

/// Network or API failure during web search.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("search request failed: {0}")]
    Request(String),
    #[error("search service returned status {0}")]
    Status(u16),
    #[error("search API error: {0}")]
    Api(String),
    #[error("search timed out after {0}s")]
    Timeout(u64),
}

/// The actuator could not be invoked at all (as opposed to a step that ran and failed).
#[derive(Debug, Error)]
pub enum ActuatorError {
    #[error("instruction must not be empty")]
    EmptyInstruction,
    #[error("failed to launch actuator: {0}")]
    Spawn(String),
    #[error("actuator i/o error: {0}")]
    Io(#[from] std::io::Error),
}
