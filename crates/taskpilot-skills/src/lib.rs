//! Concrete collaborators for taskpilot-core: completion model, embedder, web search,
//! and GUI actuators, plus factories that pick one from configuration.

mod bocha_search;
mod embedding;
mod model_router;
mod ui_tars;

pub use bocha_search::{parse_response, BochaSearch};
pub use embedding::{build_embedder, RemoteEmbedder};
pub use model_router::{LlmMode, ModelRouter};
pub use ui_tars::{write_cli_config, DryRunActuator, UiTarsCli};

use std::sync::Arc;
use taskpilot_core::{Actuator, ActuatorSettings, ConfigError, CoreConfig, OfficialDocSearch};

/// Actuator selected by `actuator.mode`.
pub fn build_actuator(settings: &ActuatorSettings) -> Result<Arc<dyn Actuator>, ConfigError> {
    match settings.mode.trim().to_lowercase().as_str() {
        "" | "dry_run" | "dry-run" => Ok(Arc::new(DryRunActuator)),
        "ui_tars" | "ui-tars" => Ok(Arc::new(UiTarsCli::from_settings(settings)?)),
        other => Err(ConfigError::Invalid {
            key: "actuator.mode",
            reason: format!("expected `dry_run` or `ui_tars`, got `{}`", other),
        }),
    }
}

/// Scoped documentation search, or `None` when web search is disabled.
/// Enabling it without `search.api_key` is a configuration error.
pub fn build_search(config: &CoreConfig) -> Result<Option<Arc<OfficialDocSearch>>, ConfigError> {
    if !config.enhancer.enable_web_search {
        return Ok(None);
    }
    let backend = BochaSearch::from_settings(&config.search)?;
    let search = OfficialDocSearch::new(Arc::new(backend), config.search.scope_prefix.clone())
        .with_fetch_count(config.search.fetch_count)
        .with_timeout(config.search.timeout());
    Ok(Some(Arc::new(search)))
}
