//! In-test collaborator doubles.

use crate::error::{ActuatorError, LlmError, SearchError};
use crate::services::{Actuator, ActuatorOutcome, CompletionModel, RawHit, WebSearch};
use std::sync::Mutex;
use std::time::Duration;

/// Completion model that answers by matching a needle against the system prompt.
/// Rules are checked in insertion order; a rule with a queue pops one reply per call
/// and keeps repeating its last reply.
pub struct ScriptedModel {
    rules: Mutex<Vec<(String, Vec<Result<String, String>>)>>,
    fallback: Result<String, String>,
    calls: Mutex<Vec<(String, String)>>,
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self {
            rules: Mutex::new(Vec::new()),
            fallback: Err("no scripted reply".to_string()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self::new()
    }

    pub fn on(self, needle: &str, reply: &str) -> Self {
        self.on_sequence(needle, vec![Ok(reply.to_string())])
    }

    pub fn on_sequence(self, needle: &str, replies: Vec<Result<String, String>>) -> Self {
        self.rules.lock().unwrap().push((needle.to_string(), replies));
        self
    }

    pub fn otherwise(mut self, reply: &str) -> Self {
        self.fallback = Ok(reply.to_string());
        self
    }

    /// Every (system, user) pair received so far.
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_matching(&self, needle: &str) -> Vec<(String, String)> {
        self.calls()
            .into_iter()
            .filter(|(system, _)| system.contains(needle))
            .collect()
    }
}

#[async_trait::async_trait]
impl CompletionModel for ScriptedModel {
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String, LlmError> {
        self.calls
            .lock()
            .unwrap()
            .push((system_prompt.to_string(), user_prompt.to_string()));
        let reply = {
            let mut rules = self.rules.lock().unwrap();
            rules
                .iter_mut()
                .find(|(needle, _)| system_prompt.contains(needle.as_str()))
                .map(|(_, replies)| {
                    if replies.len() > 1 {
                        replies.remove(0)
                    } else {
                        replies[0].clone()
                    }
                })
                .unwrap_or_else(|| self.fallback.clone())
        };
        reply.map_err(LlmError::Request)
    }
}

/// Search backend returning a fixed hit list (or always failing), recording queries.
pub struct StaticSearch {
    hits: Option<Vec<RawHit>>,
    queries: Mutex<Vec<String>>,
}

impl StaticSearch {
    pub fn new(hits: Vec<RawHit>) -> Self {
        Self {
            hits: Some(hits),
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            hits: None,
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl WebSearch for StaticSearch {
    async fn search(&self, query: &str, _count: usize) -> Result<Vec<RawHit>, SearchError> {
        self.queries.lock().unwrap().push(query.to_string());
        self.hits
            .clone()
            .ok_or_else(|| SearchError::Status(503))
    }
}

/// Actuator that fails any instruction containing one of `failing` and records calls.
pub struct RecordingActuator {
    failing: Vec<String>,
    erroring: Vec<String>,
    panicking: Vec<String>,
    calls: Mutex<Vec<(String, String, Option<Duration>)>>,
}

impl RecordingActuator {
    pub fn new() -> Self {
        Self {
            failing: Vec::new(),
            erroring: Vec::new(),
            panicking: Vec::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Reports a failed outcome for matching instructions.
    pub fn fail_on(mut self, needle: &str) -> Self {
        self.failing.push(needle.to_string());
        self
    }

    /// Returns an invocation error for matching instructions.
    pub fn error_on(mut self, needle: &str) -> Self {
        self.erroring.push(needle.to_string());
        self
    }

    /// Panics for matching instructions.
    pub fn panic_on(mut self, needle: &str) -> Self {
        self.panicking.push(needle.to_string());
        self
    }

    pub fn instructions(&self) -> Vec<String> {
        self.calls.lock().unwrap().iter().map(|c| c.0.clone()).collect()
    }

    pub fn calls(&self) -> Vec<(String, String, Option<Duration>)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Actuator for RecordingActuator {
    fn name(&self) -> &str {
        "recording"
    }

    async fn execute(
        &self,
        instruction: &str,
        target: &str,
        timeout: Option<Duration>,
    ) -> Result<ActuatorOutcome, ActuatorError> {
        self.calls
            .lock()
            .unwrap()
            .push((instruction.to_string(), target.to_string(), timeout));
        if self.panicking.iter().any(|n| instruction.contains(n.as_str())) {
            panic!("actuator crashed on {}", instruction);
        }
        if self.erroring.iter().any(|n| instruction.contains(n.as_str())) {
            return Err(ActuatorError::Spawn("ui-tars not installed".to_string()));
        }
        if self.failing.iter().any(|n| instruction.contains(n.as_str())) {
            return Ok(ActuatorOutcome::failed(format!("could not perform: {}", instruction)));
        }
        Ok(ActuatorOutcome::succeeded("done"))
    }
}
