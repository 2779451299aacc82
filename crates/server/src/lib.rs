//! HTTP surface over the pipeline tool registry.

pub mod api;
pub mod bootstrap;
pub mod health;

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Result;
use closer_core::config::{load_dotenv, AppConfig, LoadOptions, LogFormat};
use tokio::sync::oneshot;
use tracing::{info, warn};

pub fn init_logging(config: &AppConfig) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.as_str()));
    let builder = tracing_subscriber::fmt().with_target(false).with_env_filter(filter);

    match config.logging.format {
        LogFormat::Compact => builder.compact().init(),
        LogFormat::Pretty => builder.pretty().init(),
        LogFormat::Json => builder.json().init(),
    }
}

pub async fn run() -> Result<()> {
    load_dotenv(None);
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;
    let address: SocketAddr =
        format!("{}:{}", app.config.server.bind_address, app.config.server.port).parse()?;
    let grace = Duration::from_secs(app.config.server.graceful_shutdown_secs);
    let router = api::router(app.state());

    let listener = tokio::net::TcpListener::bind(address).await?;
    info!(event_name = "system.server.started", bind_address = %address, "closer-server listening");

    let (draining_tx, draining_rx) = oneshot::channel::<()>();
    let server = axum::serve(listener, router).with_graceful_shutdown(async move {
        wait_for_shutdown().await;
        info!(event_name = "system.server.stopping", "draining in-flight requests");
        let _ = draining_tx.send(());
    });

    tokio::select! {
        result = server => result?,
        _ = async {
            if draining_rx.await.is_ok() {
                tokio::time::sleep(grace).await;
            } else {
                std::future::pending::<()>().await;
            }
        } => {
            warn!(event_name = "system.server.drain_timeout", grace_secs = grace.as_secs(), "requests still running at shutdown");
        }
    }

    info!(event_name = "system.server.stopped", "closer-server stopped");
    Ok(())
}

async fn wait_for_shutdown() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        warn!(event_name = "system.server.signal_error", error = %error, "ctrl-c handler failed");
        std::future::pending::<()>().await;
    }
}
