use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use closer_agent::{PipelineRuntime, RuntimeServices, ToolRegistry};
use closer_core::config::AppConfig;
use closer_core::email::OutgoingEmail;
use closer_core::template::TemplateSet;
use closer_integrations::{Deployer, Deployment, IntegrationError, Mailer, SentMessage, StaticSite};
use closer_mcp::CloserMcpServer;
use rmcp::handler::server::ServerHandler;
use serde_json::{json, Map, Value};
use tempfile::TempDir;

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

fn server() -> (CloserMcpServer, TempDir) {
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

    (CloserMcpServer::new(Arc::new(runtime), Arc::new(ToolRegistry::standard())), dir)
}

fn arguments(value: Value) -> Option<Map<String, Value>> {
    value.as_object().cloned()
}

#[test]
fn advertises_tools_and_resources() {
    let (server, _dir) = server();
    let info = server.get_info();

    assert_eq!(info.server_info.name, "closer");
    assert!(info.capabilities.tools.is_some());
    assert!(info.capabilities.resources.is_some());

    let tools = server.tools();
    assert_eq!(tools.len(), 16);
    assert!(tools.iter().all(|tool| tool.input_schema.get("type") == Some(&json!("object"))));
    assert!(tools.iter().any(|tool| tool.name == "quick_proposal"));
}

#[tokio::test]
async fn successful_calls_return_structured_json() {
    let (server, _dir) = server();

    let result = server
        .invoke("generate_proposal", arguments(json!({ "client_name": "Acme Co" })))
        .await
        .expect("protocol-level success");
    let result = serde_json::to_value(&result).expect("serialize");

    assert_ne!(result["isError"], json!(true));
    assert!(result["structuredContent"]["proposal_path"]
        .as_str()
        .expect("path")
        .ends_with("acme_co_20250601.html"));

    let deployed = server.invoke("deploy_proposal", None).await.expect("deploy");
    let deployed = serde_json::to_value(&deployed).expect("serialize");
    assert_eq!(deployed["structuredContent"]["url"], "https://proposal-acme-co.vercel.app");
}

#[tokio::test]
async fn pipeline_failures_are_error_results_with_a_user_message() {
    let (server, _dir) = server();

    let result = server.invoke("package_proposal", None).await.expect("protocol-level success");
    let result = serde_json::to_value(&result).expect("serialize");

    assert_eq!(result["isError"], json!(true));
    let text = result["content"][0]["text"].as_str().expect("text content");
    assert!(text.contains("does not exist"));
    assert!(text.contains("correlation id"));
}

#[tokio::test]
async fn unknown_tools_are_protocol_errors() {
    let (server, _dir) = server();
    let error = server.invoke("make_coffee", None).await.expect_err("unknown tool");
    assert!(error.message.contains("make_coffee"));
}

#[test]
fn resources_are_listed_and_readable() {
    let (server, _dir) = server();

    let uris: Vec<String> = server.resources().iter().map(|resource| resource.uri.clone()).collect();
    assert_eq!(
        uris,
        ["proposal://template", "proposal://email-template", "directive://proposal-workflow"]
    );

    let read = server.read("directive://proposal-workflow").expect("directive");
    let read = serde_json::to_value(&read).expect("serialize");
    assert_eq!(read["contents"][0]["uri"], "directive://proposal-workflow");
    assert!(!read["contents"][0]["text"].as_str().expect("text").is_empty());

    assert!(server.read("proposal://missing").is_err());
}
