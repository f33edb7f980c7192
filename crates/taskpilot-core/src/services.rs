//! Collaborator seams: every slow external dependency is reached through one of these traits.

use crate::error::{ActuatorError, EmbedError, LlmError, SearchError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Text completion: `complete(system, user) -> text`.
#[async_trait::async_trait]
pub trait CompletionModel: Send + Sync {
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String, LlmError>;
}

/// Text to fixed-length vector. Implementations must be deterministic and dimension-stable.
#[async_trait::async_trait]
pub trait Embedder: Send + Sync {
    /// Output dimension.
    fn dimensions(&self) -> usize;

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError>;
}

/// One unranked hit as returned by a search engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawHit {
    pub url: String,
    pub title: String,
    pub summary: String,
}

impl RawHit {
    pub fn new(url: impl Into<String>, title: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
            summary: summary.into(),
        }
    }
}

/// Web search. The caller has already prepended the domain restriction token to `query`.
#[async_trait::async_trait]
pub trait WebSearch: Send + Sync {
    async fn search(&self, query: &str, count: usize) -> Result<Vec<RawHit>, SearchError>;
}

/// Outcome of one actuator invocation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActuatorOutcome {
    pub success: bool,
    #[serde(default)]
    pub stdout: String,
    #[serde(default)]
    pub stderr: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
}

impl ActuatorOutcome {
    pub fn succeeded(stdout: impl Into<String>) -> Self {
        Self {
            success: true,
            stdout: stdout.into(),
            ..Self::default()
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Self::default()
        }
    }
}

/// GUI automation executor. Invoked once per step with a natural-language instruction.
#[async_trait::async_trait]
pub trait Actuator: Send + Sync {
    /// Short identifier for logs and status output.
    fn name(&self) -> &str;

    /// Performs `instruction` against `target`. A timeout, when given, bounds the whole call
    /// and expiry is reported as a failed outcome, not an error.
    async fn execute(
        &self,
        instruction: &str,
        target: &str,
        timeout: Option<Duration>,
    ) -> Result<ActuatorOutcome, ActuatorError>;
}
