use std::sync::Arc;

use closer_agent::{PipelineRuntime, ToolRegistry};
use closer_core::config::{AppConfig, ConfigError, LoadOptions};
use closer_core::errors::ApplicationError;
use thiserror::Error;
use tracing::info;

use crate::api::AppState;

pub struct Application {
    pub config: AppConfig,
    pub runtime: Arc<PipelineRuntime>,
    pub registry: Arc<ToolRegistry>,
}

impl Application {
    pub fn state(&self) -> AppState {
        AppState::new(self.runtime.clone(), self.registry.clone())
    }
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("pipeline runtime failed to start: {0}")]
    Runtime(#[from] ApplicationError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(event_name = "system.bootstrap.start", "starting application bootstrap");

    let runtime = PipelineRuntime::from_config(config.clone()).await?;
    let registry = ToolRegistry::standard();
    info!(
        event_name = "system.bootstrap.ready",
        tools = registry.len(),
        workspace = %config.workspace.root_dir.display(),
        "pipeline runtime wired"
    );

    Ok(Application { config, runtime: Arc::new(runtime), registry: Arc::new(registry) })
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use closer_core::config::{ConfigOverrides, LoadOptions};

    use crate::bootstrap::bootstrap;

    #[tokio::test]
    async fn bootstrap_wires_every_tool_without_credentials() {
        let dir = tempfile::tempdir().expect("tempdir");
        let app = bootstrap(LoadOptions {
            config_path: Some(dir.path().join("absent.toml")),
            overrides: ConfigOverrides {
                workspace_root: Some(dir.path().to_path_buf()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .await
        .expect("bootstrap should succeed without external credentials");

        assert_eq!(app.registry.len(), 16);
        assert_eq!(app.config.workspace.root_dir, dir.path());
        assert_eq!(app.runtime.health().await.status, "healthy");
    }

    #[tokio::test]
    async fn bootstrap_fails_fast_on_a_missing_required_config_file() {
        let result = bootstrap(LoadOptions {
            config_path: Some(PathBuf::from("/definitely/not/here/closer.toml")),
            require_file: true,
            ..LoadOptions::default()
        })
        .await;

        let message = result.err().expect("error").to_string();
        assert!(message.contains("closer.toml"));
    }
}
