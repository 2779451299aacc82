use axum::{extract::State, http::StatusCode, Json};
use chrono::Utc;
use closer_agent::runtime::HealthReport;
use serde::Serialize;

use crate::api::AppState;

#[derive(Clone, Debug, Serialize)]
pub struct HealthResponse {
    #[serde(flatten)]
    pub report: HealthReport,
    pub tools: usize,
    pub checked_at: String,
}

/// 200 when the workspace is writable and templates loaded, 503 otherwise.
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let report = state.runtime.health().await;
    let status_code =
        if report.status == "healthy" { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };

    let payload =
        HealthResponse { report, tools: state.registry.len(), checked_at: Utc::now().to_rfc3339() };
    (status_code, Json(payload))
}
