use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use chrono::NaiveDate;
use closer_agent::{PipelineRuntime, RuntimeServices, ToolRegistry};
use closer_core::config::AppConfig;
use closer_core::email::OutgoingEmail;
use closer_core::template::TemplateSet;
use closer_integrations::{Deployer, Deployment, IntegrationError, Mailer, SentMessage, StaticSite};
use closer_server::api::{router, AppState};
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

struct FakeDeployer;

#[async_trait]
impl Deployer for FakeDeployer {
    async fn deploy(&self, site: &StaticSite) -> Result<Deployment, IntegrationError> {
        Ok(Deployment {
            url: format!("https://{}.vercel.app", site.project_name),
            project: site.project_name.clone(),
            id: None,
        })
    }

    fn mode(&self) -> &'static str {
        "fake"
    }
}

struct FakeMailer;

#[async_trait]
impl Mailer for FakeMailer {
    async fn send(&self, _email: &OutgoingEmail) -> Result<SentMessage, IntegrationError> {
        Ok(SentMessage { id: "msg-1".to_string(), thread_id: None })
    }
}

fn app() -> (Router, TempDir) {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut config = AppConfig::default();
    config.workspace.root_dir = dir.path().to_path_buf();

    let runtime = PipelineRuntime::new(
        config,
        TemplateSet::embedded().expect("embedded templates"),
        RuntimeServices {
            llm: None,
            deployer: Arc::new(FakeDeployer),
            mailer: Arc::new(FakeMailer),
            sheets: None,
            drive: None,
        },
    )
    .with_today(NaiveDate::from_ymd_opt(2025, 6, 1).expect("date"));

    let state = AppState::new(Arc::new(runtime), Arc::new(ToolRegistry::standard()));
    (router(state), dir)
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let (status, _, bytes) = send_raw(app, method, uri, body.map(|value| value.to_string())).await;
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("response should be JSON")
    };
    (status, json)
}

async fn send_raw(
    app: &Router,
    method: Method,
    uri: &str,
    body: Option<String>,
) -> (StatusCode, Option<String>, Vec<u8>) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(body.map(Body::from).unwrap_or_else(Body::empty))
        .expect("request");
    let response = app.clone().oneshot(request).await.expect("router should respond");
    let status = response.status();
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
    (status, content_type, bytes.to_vec())
}

#[tokio::test]
async fn index_and_health_describe_the_service() {
    let (app, _dir) = app();

    let (status, info) = send(&app, Method::GET, "/", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(info["service"], "closer");
    assert_eq!(info["tools"], 16);

    let (status, health) = send(&app, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["status"], "healthy");
    assert_eq!(health["workspace_writable"], true);
    assert_eq!(health["templates_loaded"], true);
    assert_eq!(health["deploy_mode"], "fake");
}

#[tokio::test]
async fn tools_listing_carries_schemas() {
    let (app, _dir) = app();
    let (status, body) = send(&app, Method::GET, "/tools", None).await;

    assert_eq!(status, StatusCode::OK);
    let tools = body["tools"].as_array().expect("tools array");
    assert_eq!(tools.len(), 16);
    let quick = tools.iter().find(|tool| tool["name"] == "quick_proposal").expect("quick tool");
    assert_eq!(quick["input_schema"]["type"], "object");
}

#[tokio::test]
async fn generate_then_deploy_records_the_last_url() {
    let (app, _dir) = app();

    let (status, generated) = send(
        &app,
        Method::POST,
        "/tools/generate_proposal",
        Some(json!({ "arguments": { "client_name": "Acme Co" } })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{generated}");
    assert_eq!(generated["tool"], "generate_proposal");
    assert!(generated["result"]["proposal_path"]
        .as_str()
        .expect("path")
        .ends_with("acme_co_20250601.html"));

    let (status, deployed) = send(&app, Method::POST, "/tools/deploy_proposal", None).await;
    assert_eq!(status, StatusCode::OK, "{deployed}");
    assert_eq!(deployed["result"]["url"], "https://proposal-acme-co.vercel.app");

    let (status, last) = send(&app, Method::GET, "/tools/last_deployment_url", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(last["url"], "https://proposal-acme-co.vercel.app");
}

#[tokio::test]
async fn bare_arguments_are_accepted() {
    let (app, _dir) = app();
    let (status, body) =
        send(&app, Method::POST, "/tools/list_proposals", Some(json!({ "limit": 3 }))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["result"]["count"], 0);
}

#[tokio::test]
async fn unknown_tool_is_not_found() {
    let (app, _dir) = app();
    let (status, body) = send(&app, Method::POST, "/tools/make_coffee", Some(json!({}))).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "not_found");
    assert!(body["error"]["message"].as_str().expect("message").contains("make_coffee"));
}

#[tokio::test]
async fn bad_arguments_are_a_bad_request() {
    let (app, _dir) = app();

    let (status, body) = send(&app, Method::POST, "/tools/find_client", Some(json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "bad_request");

    let (status, _, _) =
        send_raw(&app, Method::POST, "/tools/search", Some("{not json".to_string())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn failures_return_bad_gateway_with_a_user_message() {
    let (app, _dir) = app();
    let (status, body) = send(&app, Method::POST, "/tools/read_sheet", Some(json!({}))).await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(body["error"]["user_message"].as_str().expect("user message").contains("retry"));
    assert!(!body["error"]["correlation_id"].as_str().expect("id").is_empty());
}

#[tokio::test]
async fn resources_are_listed_and_served() {
    let (app, _dir) = app();

    let (status, listing) = send(&app, Method::GET, "/resources", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listing["resources"].as_array().expect("resources").len(), 3);

    let (status, content_type, bytes) =
        send_raw(&app, Method::GET, "/resources/proposal%3A%2F%2Ftemplate", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(content_type.as_deref(), Some("text/html"));
    assert!(String::from_utf8_lossy(&bytes).contains("{{"));

    let (status, content_type, _) =
        send_raw(&app, Method::GET, "/resources/directive/proposal-workflow", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(content_type.as_deref(), Some("text/markdown"));

    let (status, _) = send(&app, Method::GET, "/resources/proposal/nothing", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
