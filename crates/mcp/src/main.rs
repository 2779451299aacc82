//! Closer MCP server binary
//!
//! ```bash
//! # Register with an assistant as a stdio server
//! closer-mcp
//!
//! # Point at a config file and workspace
//! CLOSER_CONFIG=config/closer.toml CLOSER_WORKSPACE_ROOT_DIR=.tmp closer-mcp
//! ```

use anyhow::Result;
use closer_core::config::{load_dotenv, AppConfig, LoadOptions, LogFormat};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    load_dotenv(None);
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    info!(event_name = "mcp.server.starting", workspace = %config.workspace.root_dir.display(), "starting closer MCP server");
    let server = closer_mcp::CloserMcpServer::from_config(config).await?;
    server.run_stdio().await
}

fn init_logging(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.as_str()));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(false)
        .with_writer(std::io::stderr);

    match config.logging.format {
        LogFormat::Compact => builder.compact().init(),
        LogFormat::Pretty => builder.pretty().init(),
        LogFormat::Json => builder.json().init(),
    }
}
