pub mod config;
pub mod doctor;
pub mod drive;
pub mod pipeline;
pub mod sheets;

use std::future::Future;
use std::path::PathBuf;

use closer_agent::PipelineRuntime;
use closer_core::config::{AppConfig, ConfigOverrides, LoadOptions};
use closer_core::errors::ApplicationError;
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

pub const EXIT_CONFIG: u8 = 2;
pub const EXIT_INVALID_INPUT: u8 = 3;
pub const EXIT_NOT_FOUND: u8 = 4;
pub const EXIT_UPSTREAM: u8 = 5;
pub const EXIT_INTERNAL: u8 = 6;

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome {
    command: String,
    status: String,
    error_class: Option<String>,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    hint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
}

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        Self::success_with(command, message, Value::Null)
    }

    pub fn success_with(command: &str, message: impl Into<String>, data: impl Serialize) -> Self {
        let data = serde_json::to_value(data).ok().filter(|value| !value.is_null());
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "ok".to_string(),
            error_class: None,
            message: message.into(),
            hint: None,
            data,
        };
        Self { exit_code: 0, output: serialize_payload(payload) }
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error".to_string(),
            error_class: Some(error_class.to_string()),
            message: message.into(),
            hint: None,
            data: None,
        };
        Self { exit_code, output: serialize_payload(payload) }
    }

    /// Maps an application failure to an error class, an exit code and the user-facing hint.
    pub fn from_error(command: &str, error: ApplicationError) -> Self {
        let (error_class, exit_code) = match &error {
            ApplicationError::Configuration(_) => ("config_validation", EXIT_CONFIG),
            ApplicationError::Domain(_) | ApplicationError::Template(_) => {
                ("invalid_input", EXIT_INVALID_INPUT)
            }
            ApplicationError::NotFound(_) => ("not_found", EXIT_NOT_FOUND),
            ApplicationError::Integration(_) => ("upstream", EXIT_UPSTREAM),
            ApplicationError::Storage(_) => ("storage", EXIT_INTERNAL),
        };
        let message = error.to_string();
        let hint = error.into_interface(command).user_message().to_string();
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error".to_string(),
            error_class: Some(error_class.to_string()),
            message,
            hint: Some(hint),
            data: None,
        };
        Self { exit_code, output: serialize_payload(payload) }
    }
}

/// Flags shared by every subcommand.
#[derive(Debug, Clone, Default)]
pub struct GlobalOptions {
    pub config_path: Option<PathBuf>,
    pub workspace: Option<PathBuf>,
}

impl GlobalOptions {
    pub fn load_options(&self) -> LoadOptions {
        LoadOptions {
            config_path: self.config_path.clone(),
            require_file: self.config_path.is_some(),
            overrides: ConfigOverrides {
                workspace_root: self.workspace.clone(),
                ..ConfigOverrides::default()
            },
        }
    }

    pub fn load_config(&self) -> Result<AppConfig, ApplicationError> {
        Ok(AppConfig::load(self.load_options())?)
    }
}

/// Loads config, wires the runtime, runs `operation` to completion and renders the result.
pub(crate) fn run_pipeline<F, Fut, T>(command: &str, options: &GlobalOptions, operation: F) -> CommandResult
where
    F: FnOnce(PipelineRuntime) -> Fut,
    Fut: Future<Output = Result<(String, T), ApplicationError>>,
    T: Serialize,
{
    let config = match options.load_config() {
        Ok(config) => config,
        Err(error) => return CommandResult::from_error(command, error),
    };
    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                command,
                "runtime",
                format!("failed to initialize async runtime: {error}"),
                EXIT_INTERNAL,
            );
        }
    };

    let result = runtime.block_on(async {
        let pipeline = PipelineRuntime::from_config(config).await?;
        operation(pipeline).await
    });

    match result {
        Ok((message, data)) => {
            info!(event_name = "cli.command.completed", command, "command completed");
            CommandResult::success_with(command, message, data)
        }
        Err(error) => {
            warn!(event_name = "cli.command.failed", command, error = %error, "command failed");
            CommandResult::from_error(command, error)
        }
    }
}

fn serialize_payload(payload: CommandOutcome) -> String {
    serde_json::to_string(&payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}
