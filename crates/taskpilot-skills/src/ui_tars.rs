//! GUI actuators: the UI-TARS command-line agent, and a dry-run stand-in that only logs.

use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use taskpilot_core::{Actuator, ActuatorError, ActuatorOutcome, ActuatorSettings, ConfigError};

const CLI_CONFIG_FILE: &str = ".ui-tars-cli.json";

/// Model settings the UI-TARS CLI reads at start-up.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CliConfig<'a> {
    #[serde(rename = "baseURL")]
    base_url: &'a str,
    api_key: &'a str,
    model: &'a str,
    use_responses_api: bool,
}

/// Writes the CLI's model config to `path` (normally `~/.ui-tars-cli.json`).
pub fn write_cli_config(path: &Path, settings: &ActuatorSettings) -> std::io::Result<()> {
    let config = CliConfig {
        base_url: &settings.base_url,
        api_key: &settings.api_key,
        model: &settings.model,
        use_responses_api: settings.use_responses_api,
    };
    let body = serde_json::to_string_pretty(&config).map_err(std::io::Error::other)?;
    std::fs::write(path, body)
}

fn home_config_path() -> Option<PathBuf> {
    std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(|home| PathBuf::from(home).join(CLI_CONFIG_FILE))
}

/// Runs `<cli> start -t <target> -q <instruction>` once per step.
pub struct UiTarsCli {
    command: Vec<String>,
}

impl UiTarsCli {
    /// Requires `actuator.base_url`, `actuator.api_key` and `actuator.model`.
    pub fn from_settings(settings: &ActuatorSettings) -> Result<Self, ConfigError> {
        if settings.base_url.trim().is_empty() {
            return Err(ConfigError::MissingCredential("actuator.base_url"));
        }
        if settings.api_key.trim().is_empty() {
            return Err(ConfigError::MissingCredential("actuator.api_key"));
        }
        if settings.model.trim().is_empty() {
            return Err(ConfigError::MissingCredential("actuator.model"));
        }
        let command = match settings.cli_path.as_deref().map(str::trim) {
            Some(path) if !path.is_empty() => vec![path.to_string(), "start".to_string()],
            _ => vec![
                "npx".to_string(),
                "@ui-tars/cli@latest".to_string(),
                "start".to_string(),
            ],
        };
        match home_config_path() {
            Some(path) => {
                if let Err(e) = write_cli_config(&path, settings) {
                    tracing::warn!(target: "taskpilot::actuator", path = %path.display(), error = %e, "could not write UI-TARS config");
                }
            }
            None => tracing::warn!(target: "taskpilot::actuator", "no home directory; UI-TARS config not written"),
        }
        Ok(Self { command })
    }

    /// Replaces the launcher (program plus leading arguments).
    pub fn with_command(mut self, command: Vec<String>) -> Self {
        self.command = command;
        self
    }

    async fn run(
        &self,
        instruction: &str,
        target: &str,
        timeout: Option<Duration>,
    ) -> Result<ActuatorOutcome, ActuatorError> {
        if instruction.trim().is_empty() {
            return Err(ActuatorError::EmptyInstruction);
        }
        let (program, leading) = self
            .command
            .split_first()
            .ok_or_else(|| ActuatorError::Spawn("empty command".to_string()))?;
        let child = tokio::process::Command::new(program)
            .args(leading)
            .args(["-t", target, "-q", instruction])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ActuatorError::Spawn(format!("{}: {}", program, e)))?;

        let output = match timeout {
            Some(limit) => match tokio::time::timeout(limit, child.wait_with_output()).await {
                Ok(output) => output?,
                Err(_) => {
                    tracing::warn!(target: "taskpilot::actuator", secs = limit.as_secs_f32(), "UI-TARS timed out");
                    return Ok(ActuatorOutcome::failed(format!(
                        "timed out after {}s",
                        limit.as_secs_f32()
                    )));
                }
            },
            None => child.wait_with_output().await?,
        };

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let exit_code = output.status.code();
        let success = output.status.success();
        let error = if success {
            None
        } else if !stderr.is_empty() {
            Some(stderr.clone())
        } else {
            Some(match exit_code {
                Some(code) => format!("exited with code {}", code),
                None => "terminated by signal".to_string(),
            })
        };
        Ok(ActuatorOutcome {
            success,
            stdout,
            stderr,
            error,
            exit_code,
        })
    }
}

#[async_trait::async_trait]
impl Actuator for UiTarsCli {
    fn name(&self) -> &str {
        "ui_tars"
    }

    async fn execute(
        &self,
        instruction: &str,
        target: &str,
        timeout: Option<Duration>,
    ) -> Result<ActuatorOutcome, ActuatorError> {
        tracing::info!(target: "taskpilot::actuator", target_operator = target, instruction, "UI-TARS step");
        match self.run(instruction, target, timeout).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                tracing::warn!(target: "taskpilot::actuator", error = %e, "UI-TARS invocation failed");
                Ok(ActuatorOutcome::failed(e.to_string()))
            }
        }
    }
}

/// Logs each instruction and reports success without touching the desktop.
#[derive(Debug, Default, Clone, Copy)]
pub struct DryRunActuator;

#[async_trait::async_trait]
impl Actuator for DryRunActuator {
    fn name(&self) -> &str {
        "dry_run"
    }

    async fn execute(
        &self,
        instruction: &str,
        target: &str,
        _timeout: Option<Duration>,
    ) -> Result<ActuatorOutcome, ActuatorError> {
        if instruction.trim().is_empty() {
            return Err(ActuatorError::EmptyInstruction);
        }
        tracing::info!(target: "taskpilot::actuator", target_operator = target, instruction, "dry run");
        Ok(ActuatorOutcome::succeeded(format!("[dry run] {}", instruction)))
    }
}
