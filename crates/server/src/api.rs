use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use closer_agent::{resources, PipelineRuntime, ToolDescriptor, ToolError, ToolRegistry};
use closer_core::errors::{ApplicationError, DomainError, InterfaceError};
use serde::Serialize;
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use crate::health;

#[derive(Clone)]
pub struct AppState {
    pub runtime: Arc<PipelineRuntime>,
    pub registry: Arc<ToolRegistry>,
}

impl AppState {
    pub fn new(runtime: Arc<PipelineRuntime>, registry: Arc<ToolRegistry>) -> Self {
        Self { runtime, registry }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health::health))
        .route("/tools", get(list_tools))
        .route("/tools/last_deployment_url", get(last_deployment_url))
        .route("/tools/{name}", post(call_tool))
        .route("/resources", get(list_resources))
        .route("/resources/{*uri}", get(read_resource))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct ServiceInfo {
    service: &'static str,
    version: &'static str,
    tools: usize,
    endpoints: [&'static str; 6],
}

async fn index(State(state): State<AppState>) -> Json<ServiceInfo> {
    Json(ServiceInfo {
        service: "closer",
        version: env!("CARGO_PKG_VERSION"),
        tools: state.registry.len(),
        endpoints: [
            "GET /health",
            "GET /tools",
            "POST /tools/{name}",
            "GET /tools/last_deployment_url",
            "GET /resources",
            "GET /resources/{uri}",
        ],
    })
}

#[derive(Debug, Serialize)]
struct ToolList {
    tools: Vec<ToolDescriptor>,
}

async fn list_tools(State(state): State<AppState>) -> Json<ToolList> {
    Json(ToolList { tools: state.registry.descriptors() })
}

#[derive(Debug, Serialize)]
struct ToolResponse {
    tool: String,
    result: Value,
}

async fn call_tool(
    State(state): State<AppState>,
    Path(name): Path<String>,
    body: Bytes,
) -> Result<Json<ToolResponse>, ApiError> {
    let arguments = if body.iter().all(u8::is_ascii_whitespace) {
        Value::Null
    } else {
        let value = serde_json::from_slice(&body).map_err(|error| {
            ApplicationError::from(DomainError::InvalidInput(format!("request body is not JSON: {error}")))
        })?;
        unwrap_arguments(value)
    };
    info!(event_name = "api.tool.called", tool = %name, "tool call");

    let result = state.registry.call(&state.runtime, &name, arguments).await?;
    Ok(Json(ToolResponse { tool: name, result }))
}

/// Accepts `{"arguments": {...}}` or the arguments object itself.
fn unwrap_arguments(body: Value) -> Value {
    match body {
        Value::Object(mut map) if map.len() == 1 && map.contains_key("arguments") => {
            map.remove("arguments").unwrap_or(Value::Null)
        }
        other => other,
    }
}

async fn last_deployment_url(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let url = state.runtime.last_deployment_url().await?;
    Ok(Json(json!({ "url": url })))
}

async fn list_resources() -> Json<Value> {
    Json(json!({ "resources": resources::RESOURCES }))
}

async fn read_resource(
    State(state): State<AppState>,
    Path(uri): Path<String>,
) -> Result<Response, ApiError> {
    // `proposal/template` is accepted for clients that cannot put `://` in a path.
    let uri = if uri.contains("://") { uri } else { uri.replacen('/', "://", 1) };
    let descriptor = resources::descriptor(&uri)
        .ok_or_else(|| ApplicationError::NotFound(format!("resource `{uri}`")))?;
    let text = resources::read(&state.runtime, descriptor.uri)?;
    Ok(([(header::CONTENT_TYPE, descriptor.mime_type)], text).into_response())
}

#[derive(Debug)]
pub struct ApiError(InterfaceError);

impl From<ApplicationError> for ApiError {
    fn from(error: ApplicationError) -> Self {
        Self(error.into_interface(uuid::Uuid::new_v4().to_string()))
    }
}

impl From<ToolError> for ApiError {
    fn from(error: ToolError) -> Self {
        match error {
            ToolError::UnknownTool(name) => {
                Self::from(ApplicationError::NotFound(format!("unknown tool `{name}`")))
            }
            ToolError::Application(error) => Self::from(error),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self.0 {
            InterfaceError::BadRequest { .. } => (StatusCode::BAD_REQUEST, "bad_request"),
            InterfaceError::NotFound { .. } => (StatusCode::NOT_FOUND, "not_found"),
            InterfaceError::Upstream { .. } => (StatusCode::BAD_GATEWAY, "upstream"),
            InterfaceError::Internal { .. } => (StatusCode::BAD_GATEWAY, "internal"),
        };
        warn!(
            event_name = "api.request.failed",
            correlation_id = %self.0.correlation_id(),
            code,
            error = %self.0,
            "request failed"
        );
        let body = json!({
            "error": {
                "code": code,
                "message": self.0.message(),
                "user_message": self.0.user_message(),
                "correlation_id": self.0.correlation_id(),
            }
        });
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::unwrap_arguments;

    #[test]
    fn wrapped_and_bare_arguments_are_equivalent() {
        let bare = json!({ "client_name": "Acme" });
        assert_eq!(unwrap_arguments(json!({ "arguments": bare.clone() })), bare);
        assert_eq!(unwrap_arguments(bare.clone()), bare);
    }

    #[test]
    fn a_tool_argument_named_arguments_is_kept_when_siblings_exist() {
        let body = json!({ "arguments": "x", "query": "acme" });
        assert_eq!(unwrap_arguments(body.clone()), body);
    }
}
