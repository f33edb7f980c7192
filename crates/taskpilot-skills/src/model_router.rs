//! Model Router: sends (system, user) prompts to a mock generator or an OpenAI-compatible
//! chat completion API.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use taskpilot_core::{CompletionModel, ConfigError, LlmError, LlmSettings};

const SKILL_NAME: &str = "ModelRouter";

/// Mode for LLM invocation: mock (deterministic local text) or live (chat completion API).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LlmMode {
    #[default]
    Mock,
    Live,
}

impl LlmMode {
    pub fn parse(mode: &str) -> Result<Self, ConfigError> {
        match mode.trim().to_lowercase().as_str() {
            "" | "mock" => Ok(LlmMode::Mock),
            "live" => Ok(LlmMode::Live),
            other => Err(ConfigError::Invalid {
                key: "llm.mode",
                reason: format!("expected `mock` or `live`, got `{}`", other),
            }),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LlmMode::Mock => "mock",
            LlmMode::Live => "live",
        }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: [ChatMessage<'a>; 2],
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

/// Routes a prompt pair to a mock generator or a live chat completion endpoint.
pub struct ModelRouter {
    mode: LlmMode,
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
    timeout: Duration,
}

impl ModelRouter {
    /// Live mode requires `llm.api_key`.
    pub fn from_settings(settings: &LlmSettings) -> Result<Self, ConfigError> {
        let mode = LlmMode::parse(&settings.mode)?;
        if mode == LlmMode::Live && settings.api_key.trim().is_empty() {
            return Err(ConfigError::MissingCredential("llm.api_key"));
        }
        let timeout = Duration::from_secs(settings.timeout_secs.max(1));
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ConfigError::Invalid {
                key: "llm",
                reason: format!("failed to create HTTP client: {}", e),
            })?;
        Ok(Self {
            mode,
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            api_key: settings.api_key.clone(),
            model: settings.model.clone(),
            temperature: settings.temperature,
            timeout,
        })
    }

    pub fn mock() -> Self {
        Self {
            mode: LlmMode::Mock,
            client: reqwest::Client::new(),
            base_url: String::new(),
            api_key: String::new(),
            model: "mock".to_string(),
            temperature: 0.0,
            timeout: Duration::from_secs(1),
        }
    }

    pub fn mode(&self) -> LlmMode {
        self.mode
    }

    pub fn model_name(&self) -> &str {
        &self.model
    }

    /// Mock LLM: recognizes which prompt it was given and answers in that prompt's format,
    /// so the whole pipeline can run offline.
    fn mock_generate(&self, system_prompt: &str, user_prompt: &str) -> String {
        if system_prompt.contains("search keywords") {
            return field(user_prompt, "Task:").unwrap_or(user_prompt).trim().to_string();
        }
        if system_prompt.contains("feasibility") {
            let task = field(user_prompt, "# Task\n").unwrap_or_default();
            let executable = !task.trim().is_empty();
            return format!(
                "## Analysis\nMock analysis of the task.\n\n## Verdict\n{}\n\n## Reason\n{}",
                if executable { "YES" } else { "NO" },
                if executable {
                    "The task describes a concrete desktop operation."
                } else {
                    "The task is empty."
                }
            );
        }
        if system_prompt.contains("\"steps\"") {
            let task = field(user_prompt, "# Task\n").unwrap_or(user_prompt);
            let steps: Vec<serde_json::Value> = split_sentences(task)
                .into_iter()
                .take(5)
                .enumerate()
                .map(|(i, step)| serde_json::json!({ "id": (i + 1).to_string(), "step": step }))
                .collect();
            return format!(
                "## Analysis\nMock decomposition.\n\n## Steps\n```json\n{}\n```",
                serde_json::json!({ "steps": steps })
            );
        }
        if system_prompt.contains("Final Answer") {
            let task = field(user_prompt, "Test point:").unwrap_or(user_prompt);
            return format!("Thought: I now know the final answer\nFinal Answer: {}", mock_steps(task));
        }
        let task = field(user_prompt, "[Original test point]\n").unwrap_or(user_prompt);
        mock_steps(task)
    }

    async fn live_generate(&self, system_prompt: &str, user_prompt: &str) -> Result<String, LlmError> {
        let url = format!("{}/chat/completions", self.base_url);
        let request = ChatRequest {
            model: &self.model,
            temperature: self.temperature,
            messages: [
                ChatMessage {
                    role: "system",
                    content: system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: user_prompt,
                },
            ],
        };
        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| self.request_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Status {
                status: status.as_u16(),
                body,
            });
        }
        let body: ChatResponse = response.json().await.map_err(|e| self.request_error(e))?;
        body.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|text| !text.trim().is_empty())
            .ok_or(LlmError::EmptyResponse)
    }

    fn request_error(&self, e: reqwest::Error) -> LlmError {
        if e.is_timeout() {
            LlmError::Timeout(self.timeout.as_secs())
        } else {
            LlmError::Request(e.to_string())
        }
    }
}

impl Default for ModelRouter {
    fn default() -> Self {
        Self::mock()
    }
}

#[async_trait::async_trait]
impl CompletionModel for ModelRouter {
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String, LlmError> {
        let generated = match self.mode {
            LlmMode::Mock => self.mock_generate(system_prompt, user_prompt),
            LlmMode::Live => self.live_generate(system_prompt, user_prompt).await?,
        };
        tracing::debug!(
            target: "taskpilot::reasoning",
            skill = SKILL_NAME,
            mode = self.mode.as_str(),
            prompt_len = user_prompt.len(),
            reply_len = generated.len(),
            "completion"
        );
        Ok(generated)
    }
}

/// Text after `marker` up to the next blank line.
fn field<'a>(text: &'a str, marker: &str) -> Option<&'a str> {
    let start = text.find(marker)? + marker.len();
    let rest = &text[start..];
    let end = rest.find("\n\n").unwrap_or(rest.len());
    Some(rest[..end].trim())
}

fn split_sentences(text: &str) -> Vec<String> {
    let parts: Vec<String> = text
        .split(['。', ';', '；', '\n'])
        .map(|s| s.trim().trim_end_matches('.').trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    if parts.is_empty() {
        vec![text.trim().to_string()]
    } else {
        parts
    }
}

fn mock_steps(task: &str) -> String {
    format!(
        "1. Left-click the Feishu window to focus the desktop client. 2. {} 3. Verify the result is shown on the current screen.",
        task.trim().trim_end_matches('.')
    )
}
