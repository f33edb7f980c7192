//! Configuration shared by the core, the skills crate, and the gateway.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default similarity a cached question must reach to be returned verbatim.
pub const DEFAULT_SIMILARITY_THRESHOLD: f32 = 0.85;

/// Default cap on reasoning rounds for the iterative strategy.
pub const DEFAULT_MAX_ITERATIONS: usize = 5;

/// Default actuator operator ("nut-js" drives the desktop, "adb" an Android device).
pub const DEFAULT_TARGET: &str = "nut-js";

/// Completion service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    /// "mock" (deterministic local text) or "live" (OpenAI-compatible chat API).
    pub mode: String,
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub temperature: f32,
    pub timeout_secs: u64,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            mode: "mock".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: String::new(),
            model: "gpt-4o-mini".to_string(),
            temperature: 0.3,
            timeout_secs: 60,
        }
    }
}

/// Embedding function settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    /// "hashing" (local, deterministic) or "remote" (OpenAI-compatible `/embeddings`).
    pub mode: String,
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub dimensions: usize,
    pub timeout_secs: u64,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            mode: "hashing".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: String::new(),
            model: "text-embedding-3-small".to_string(),
            dimensions: 256,
            timeout_secs: 30,
        }
    }
}

/// Web search settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchSettings {
    pub api_key: String,
    pub base_url: String,
    /// Domain restriction token prepended to every query.
    pub scope_prefix: String,
    /// Raw hits requested from the search API per query.
    pub fetch_count: usize,
    /// Ranked hits kept per keyword variant.
    pub results_per_keyword: usize,
    pub timeout_secs: u64,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://api.bochaai.com/v1".to_string(),
            scope_prefix: "site:feishu.cn 帮助中心".to_string(),
            fetch_count: 30,
            results_per_keyword: 3,
            timeout_secs: 30,
        }
    }
}

impl SearchSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

/// Enhancement pipeline settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnhancerSettings {
    pub enable_cache: bool,
    pub enable_web_search: bool,
    pub similarity_threshold: f32,
    pub cache_top_k: usize,
    /// "single_shot" or "iterative".
    pub strategy: String,
    pub max_iterations: usize,
    /// Conversation used when a task names no recipient.
    pub default_target: String,
}

impl Default for EnhancerSettings {
    fn default() -> Self {
        Self {
            enable_cache: true,
            enable_web_search: true,
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            cache_top_k: 3,
            strategy: "single_shot".to_string(),
            max_iterations: DEFAULT_MAX_ITERATIONS,
            default_target: "文件传输助手".to_string(),
        }
    }
}

/// Automation actuator settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ActuatorSettings {
    /// "dry_run" (log only) or "ui_tars" (UI-TARS CLI subprocess).
    pub mode: String,
    pub target: String,
    /// Absent means the actuator call is not bounded.
    pub timeout_secs: Option<u64>,
    pub cli_path: Option<String>,
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub use_responses_api: bool,
}

impl Default for ActuatorSettings {
    fn default() -> Self {
        Self {
            mode: "dry_run".to_string(),
            target: DEFAULT_TARGET.to_string(),
            timeout_secs: None,
            cli_path: None,
            base_url: String::new(),
            api_key: String::new(),
            model: String::new(),
            use_responses_api: false,
        }
    }
}

impl ActuatorSettings {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

/// Lookup of similar completed runs fed into the feasibility and decomposition prompts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistorySettings {
    pub enabled: bool,
    pub top_k: usize,
    pub threshold: f32,
}

impl Default for HistorySettings {
    fn default() -> Self {
        Self {
            enabled: true,
            top_k: 3,
            threshold: 0.8,
        }
    }
}

/// Global application configuration. Load from TOML or env.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    pub app_name: String,
    /// HTTP port for the gateway.
    pub port: u16,
    /// Base directory for the sled database.
    pub storage_path: String,
    #[serde(default)]
    pub llm: LlmSettings,
    #[serde(default)]
    pub embedding: EmbeddingSettings,
    #[serde(default)]
    pub search: SearchSettings,
    #[serde(default)]
    pub enhancer: EnhancerSettings,
    #[serde(default)]
    pub actuator: ActuatorSettings,
    #[serde(default)]
    pub history: HistorySettings,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            app_name: "Taskpilot Gateway".to_string(),
            port: 8002,
            storage_path: "./data".to_string(),
            llm: LlmSettings::default(),
            embedding: EmbeddingSettings::default(),
            search: SearchSettings::default(),
            enhancer: EnhancerSettings::default(),
            actuator: ActuatorSettings::default(),
            history: HistorySettings::default(),
        }
    }
}

impl CoreConfig {
    /// Load config from file and environment. Precedence: env `TASKPILOT__*` > file at
    /// `TASKPILOT_CONFIG` (default `config/taskpilot.toml`) > defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path =
            std::env::var("TASKPILOT_CONFIG").unwrap_or_else(|_| "config/taskpilot".to_string());
        let builder = config::Config::builder()
            .set_default("app_name", "Taskpilot Gateway")?
            .set_default("port", 8002_i64)?
            .set_default("storage_path", "./data")?;

        let path = Path::new(&config_path);
        let with_ext = path.with_extension("toml");
        let builder = if path.is_file() {
            builder.add_source(config::File::from(path))
        } else if with_ext.is_file() {
            builder.add_source(config::File::from(with_ext.as_path()))
        } else {
            builder
        };

        let built = builder
            .add_source(config::Environment::with_prefix("TASKPILOT").separator("__"))
            .build()?;

        let config: Self = built.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Range checks that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let threshold = self.enhancer.similarity_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(ConfigError::Invalid {
                key: "enhancer.similarity_threshold",
                reason: format!("{} is outside [0, 1]", threshold),
            });
        }
        if !(0.0..=1.0).contains(&self.history.threshold) {
            return Err(ConfigError::Invalid {
                key: "history.threshold",
                reason: format!("{} is outside [0, 1]", self.history.threshold),
            });
        }
        if self.enhancer.max_iterations == 0 {
            return Err(ConfigError::Invalid {
                key: "enhancer.max_iterations",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.embedding.dimensions == 0 {
            return Err(ConfigError::Invalid {
                key: "embedding.dimensions",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}
