use std::path::PathBuf;

use closer_core::errors::{ApplicationError, DomainError};
use thiserror::Error;

const MAX_BODY_CHARS: usize = 500;

#[derive(Debug, Error)]
pub enum IntegrationError {
    #[error("{service} request failed: {source}")]
    Transport {
        service: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("{service} returned HTTP {status}: {body}")]
    Status { service: &'static str, status: u16, body: String },
    #[error("{service} response could not be decoded: {message}")]
    Decode { service: &'static str, message: String },
    #[error("google authorization failed: {0}")]
    Auth(String),
    #[error("{what} is not configured; {hint}")]
    NotConfigured { what: &'static str, hint: String },
    #[error("io failure on `{path}`: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("workspace access failed: {0}")]
    Workspace(String),
    #[error("`{command}` failed: {message}")]
    Command { command: String, message: String },
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    InvalidRequest(String),
}

impl IntegrationError {
    pub fn transport(service: &'static str) -> impl FnOnce(reqwest::Error) -> Self {
        move |source| Self::Transport { service, source }
    }

    pub fn decode(service: &'static str) -> impl FnOnce(reqwest::Error) -> Self {
        move |error| Self::Decode { service, message: error.to_string() }
    }

    pub fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| Self::Io { path, source }
    }
}

/// Turns a non-2xx response into [`IntegrationError::Status`] with a trimmed body.
pub async fn ensure_success(
    service: &'static str,
    response: reqwest::Response,
) -> Result<reqwest::Response, IntegrationError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let body: String = body.chars().take(MAX_BODY_CHARS).collect();
    Err(IntegrationError::Status { service, status: status.as_u16(), body })
}

impl From<IntegrationError> for ApplicationError {
    fn from(value: IntegrationError) -> Self {
        match value {
            IntegrationError::NotConfigured { .. } => Self::Configuration(value.to_string()),
            IntegrationError::NotFound(message) => Self::NotFound(message),
            IntegrationError::InvalidRequest(message) => {
                Self::Domain(DomainError::InvalidInput(message))
            }
            IntegrationError::Io { .. } | IntegrationError::Workspace(_) => {
                Self::Storage(value.to_string())
            }
            other => Self::Integration(other.to_string()),
        }
    }
}
