pub mod migrate;
pub mod seed;
pub mod workflow;

use serde::Serialize;

use deskflow_core::config::{AppConfig, LoadOptions};
use deskflow_db::{connect_with_settings, DbPool};

/// Outcome of one CLI invocation: the JSON line to print and the process
/// exit code to return.
#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

/// Structured failure carried through a command's fallible stages. Each
/// stage owns its error class and exit code so callers can script against
/// both the JSON payload and the process status.
#[derive(Debug)]
pub(crate) struct CommandFailure {
    pub error_class: &'static str,
    pub message: String,
    pub exit_code: u8,
}

impl CommandFailure {
    pub fn new(error_class: &'static str, message: impl Into<String>, exit_code: u8) -> Self {
        Self { error_class, message: message.into(), exit_code }
    }
}

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        let message = message.into();
        let output = render_outcome(&CommandOutcome {
            command,
            status: "ok",
            error_class: None,
            message: &message,
        });
        Self { exit_code: 0, output }
    }

    pub(crate) fn failure(command: &str, failure: CommandFailure) -> Self {
        let output = render_outcome(&CommandOutcome {
            command,
            status: "error",
            error_class: Some(failure.error_class),
            message: &failure.message,
        });
        Self { exit_code: failure.exit_code, output }
    }
}

#[derive(Debug, Serialize)]
struct CommandOutcome<'a> {
    command: &'a str,
    status: &'a str,
    error_class: Option<&'a str>,
    message: &'a str,
}

fn render_outcome(outcome: &CommandOutcome<'_>) -> String {
    serde_json::to_string(outcome).unwrap_or_else(|error| {
        serde_json::json!({
            "command": outcome.command,
            "status": "error",
            "error_class": "serialization",
            "message": error.to_string(),
        })
        .to_string()
    })
}

pub(crate) fn load_config() -> Result<AppConfig, CommandFailure> {
    AppConfig::load(LoadOptions::default()).map_err(|error| {
        CommandFailure::new("config_validation", format!("configuration issue: {error}"), 2)
    })
}

pub(crate) fn build_runtime() -> Result<tokio::runtime::Runtime, CommandFailure> {
    tokio::runtime::Builder::new_current_thread().enable_all().build().map_err(|error| {
        CommandFailure::new("runtime_init", format!("failed to initialize async runtime: {error}"), 3)
    })
}

pub(crate) async fn open_pool(config: &AppConfig) -> Result<DbPool, CommandFailure> {
    connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(|error| CommandFailure::new("db_connectivity", error.to_string(), 4))
}
