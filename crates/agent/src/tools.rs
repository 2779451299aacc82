use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use closer_core::errors::{ApplicationError, DomainError};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

use crate::runtime::{AnalyzeRequest, EmailRequest, GenerateRequest, PipelineRuntime};

const DEFAULT_LIST_LIMIT: usize = 10;

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    fn input_schema(&self) -> Value;
    async fn execute(&self, runtime: &PipelineRuntime, input: Value) -> Result<Value, ApplicationError>;
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ToolDescriptor {
    pub name: &'static str,
    pub description: &'static str,
    pub input_schema: Value,
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("unknown tool `{0}`")]
    UnknownTool(String),
    #[error(transparent)]
    Application(#[from] ApplicationError),
}

#[derive(Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    /// Every pipeline tool, as served over HTTP and MCP.
    pub fn standard() -> Self {
        let mut registry = Self::default();
        registry.register(AnalyzeTranscript);
        registry.register(GenerateProposal);
        registry.register(DeployProposal);
        registry.register(SendProposalEmail);
        registry.register(QuickProposal);
        registry.register(PackageProposal);
        registry.register(ReadSheet);
        registry.register(FindClient);
        registry.register(ListProposals);
        registry.register(ListTranscripts);
        registry.register(GetLastDeploymentUrl);
        registry.register(SyncToDrive);
        registry.register(ListDriveFiles);
        registry.register(DownloadFromDrive);
        registry.register(Search);
        registry.register(Fetch);
        registry
    }

    pub fn register<T>(&mut self, tool: T)
    where
        T: Tool + 'static,
    {
        self.tools.insert(tool.name().to_string(), Arc::new(tool));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        self.tools
            .values()
            .map(|tool| ToolDescriptor {
                name: tool.name(),
                description: tool.description(),
                input_schema: tool.input_schema(),
            })
            .collect()
    }

    pub async fn call(
        &self,
        runtime: &PipelineRuntime,
        name: &str,
        input: Value,
    ) -> Result<Value, ToolError> {
        let tool = self.get(name).ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;
        let input = if input.is_null() { json!({}) } else { input };
        Ok(tool.execute(runtime, input).await?)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

fn parse_args<T: DeserializeOwned>(tool: &str, input: Value) -> Result<T, ApplicationError> {
    serde_json::from_value(input).map_err(|error| {
        DomainError::InvalidInput(format!("invalid arguments for `{tool}`: {error}")).into()
    })
}

/// Tool callers are remote, so every path they name is held inside the workspace.
fn workspace_path(
    runtime: &PipelineRuntime,
    path: Option<PathBuf>,
) -> Result<Option<PathBuf>, ApplicationError> {
    Ok(path.map(|path| runtime.workspace().confine(&path)).transpose()?)
}

fn to_value<T: Serialize>(value: T) -> Result<Value, ApplicationError> {
    serde_json::to_value(value)
        .map_err(|error| ApplicationError::Storage(format!("could not serialize result: {error}")))
}

fn schema(properties: Value, required: &[&str]) -> Value {
    json!({ "type": "object", "properties": properties, "required": required })
}

struct AnalyzeTranscript;

#[derive(Deserialize)]
struct AnalyzeArgs {
    transcript_text: String,
    client_name: String,
    #[serde(default)]
    model: Option<String>,
}

#[async_trait]
impl Tool for AnalyzeTranscript {
    fn name(&self) -> &'static str {
        "analyze_transcript"
    }

    fn description(&self) -> &'static str {
        "Analyze a sales call transcript and extract structured proposal data as JSON."
    }

    fn input_schema(&self) -> Value {
        schema(
            json!({
                "transcript_text": { "type": "string", "description": "Full transcript text" },
                "client_name": { "type": "string", "description": "Client or company name" },
                "model": { "type": "string", "description": "Optional model override" }
            }),
            &["transcript_text", "client_name"],
        )
    }

    async fn execute(&self, runtime: &PipelineRuntime, input: Value) -> Result<Value, ApplicationError> {
        let args: AnalyzeArgs = parse_args(self.name(), input)?;
        let outcome = runtime
            .analyze_transcript(AnalyzeRequest {
                client_name: args.client_name,
                transcript: args.transcript_text,
                model: args.model,
            })
            .await?;
        to_value(outcome)
    }
}

struct GenerateProposal;

#[derive(Deserialize)]
struct GenerateArgs {
    #[serde(default)]
    client_data_path: Option<PathBuf>,
    #[serde(default)]
    client_name: Option<String>,
    #[serde(default)]
    website: Option<String>,
    #[serde(default)]
    output_path: Option<PathBuf>,
}

#[async_trait]
impl Tool for GenerateProposal {
    fn name(&self) -> &'static str {
        "generate_proposal"
    }

    fn description(&self) -> &'static str {
        "Render the HTML proposal from analyzed client data, or from a client name alone."
    }

    fn input_schema(&self) -> Value {
        schema(
            json!({
                "client_data_path": { "type": "string", "description": "Path to the analyzed JSON" },
                "client_name": { "type": "string", "description": "Used when no client data is given" },
                "website": { "type": "string" },
                "output_path": { "type": "string", "description": "Workspace-relative HTML path" }
            }),
            &[],
        )
    }

    async fn execute(&self, runtime: &PipelineRuntime, input: Value) -> Result<Value, ApplicationError> {
        let args: GenerateArgs = parse_args(self.name(), input)?;
        let outcome = runtime
            .generate_proposal(GenerateRequest {
                client_data: workspace_path(runtime, args.client_data_path)?,
                client_name: args.client_name,
                website: args.website,
                output: workspace_path(runtime, args.output_path)?,
            })
            .await?;
        to_value(outcome)
    }
}

struct DeployProposal;

#[derive(Deserialize)]
struct DeployArgs {
    #[serde(default)]
    proposal_path: Option<PathBuf>,
    #[serde(default, alias = "client_name")]
    client_slug: Option<String>,
}

#[async_trait]
impl Tool for DeployProposal {
    fn name(&self) -> &'static str {
        "deploy_proposal"
    }

    fn description(&self) -> &'static str {
        "Publish a proposal to Vercel. Defaults to the newest generated proposal."
    }

    fn input_schema(&self) -> Value {
        schema(
            json!({
                "proposal_path": { "type": "string" },
                "client_slug": {
                    "type": "string",
                    "description": "Client name or slug for the project name; `client_name` is accepted too"
                }
            }),
            &[],
        )
    }

    async fn execute(&self, runtime: &PipelineRuntime, input: Value) -> Result<Value, ApplicationError> {
        let args: DeployArgs = parse_args(self.name(), input)?;
        let proposal_path = workspace_path(runtime, args.proposal_path)?;
        to_value(runtime.deploy_proposal(proposal_path, args.client_slug).await?)
    }
}

struct SendProposalEmail;

#[derive(Deserialize)]
struct EmailArgs {
    to_email: String,
    client_name: String,
    #[serde(default)]
    proposal_link: Option<String>,
    #[serde(default)]
    subject: Option<String>,
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    attachment_path: Option<PathBuf>,
}

#[async_trait]
impl Tool for SendProposalEmail {
    fn name(&self) -> &'static str {
        "send_proposal_email"
    }

    fn description(&self) -> &'static str {
        "Send the branded proposal email through Gmail with a link, an attachment, or both."
    }

    fn input_schema(&self) -> Value {
        schema(
            json!({
                "to_email": { "type": "string" },
                "client_name": { "type": "string" },
                "proposal_link": { "type": "string" },
                "subject": { "type": "string" },
                "body": { "type": "string" },
                "attachment_path": { "type": "string", "description": "Workspace-relative file to attach" }
            }),
            &["to_email", "client_name"],
        )
    }

    async fn execute(&self, runtime: &PipelineRuntime, input: Value) -> Result<Value, ApplicationError> {
        let args: EmailArgs = parse_args(self.name(), input)?;
        let outcome = runtime
            .send_proposal_email(EmailRequest {
                to: args.to_email,
                client_name: args.client_name,
                proposal_link: args.proposal_link,
                subject: args.subject,
                body: args.body,
                attachment_path: workspace_path(runtime, args.attachment_path)?,
            })
            .await?;
        to_value(outcome)
    }
}

struct QuickProposal;

#[derive(Deserialize)]
struct QuickArgs {
    client_name: String,
    transcript_text: String,
}

#[async_trait]
impl Tool for QuickProposal {
    fn name(&self) -> &'static str {
        "quick_proposal"
    }

    fn description(&self) -> &'static str {
        "Analyze, generate, deploy and sync in one step. Returns the live URL."
    }

    fn input_schema(&self) -> Value {
        schema(
            json!({
                "client_name": { "type": "string" },
                "transcript_text": { "type": "string", "minLength": 50 }
            }),
            &["client_name", "transcript_text"],
        )
    }

    async fn execute(&self, runtime: &PipelineRuntime, input: Value) -> Result<Value, ApplicationError> {
        let args: QuickArgs = parse_args(self.name(), input)?;
        to_value(runtime.quick_proposal(&args.client_name, &args.transcript_text).await?)
    }
}

struct PackageProposal;

#[derive(Deserialize)]
struct PackageArgs {
    #[serde(default)]
    proposal_path: Option<PathBuf>,
}

#[async_trait]
impl Tool for PackageProposal {
    fn name(&self) -> &'static str {
        "package_proposal"
    }

    fn description(&self) -> &'static str {
        "Produce copy-and-paste delivery email text for sending a proposal file by hand."
    }

    fn input_schema(&self) -> Value {
        schema(json!({ "proposal_path": { "type": "string" } }), &[])
    }

    async fn execute(&self, runtime: &PipelineRuntime, input: Value) -> Result<Value, ApplicationError> {
        let args: PackageArgs = parse_args(self.name(), input)?;
        to_value(runtime.package_proposal(workspace_path(runtime, args.proposal_path)?).await?)
    }
}

struct ReadSheet;

#[derive(Deserialize)]
struct ReadSheetArgs {
    #[serde(default)]
    sheet_name: Option<String>,
    #[serde(default)]
    headers_only: bool,
}

#[async_trait]
impl Tool for ReadSheet {
    fn name(&self) -> &'static str {
        "read_sheet"
    }

    fn description(&self) -> &'static str {
        "Read the onboarding sheet as records keyed by the header row."
    }

    fn input_schema(&self) -> Value {
        schema(
            json!({
                "sheet_name": { "type": "string", "description": "Defaults to the first sheet" },
                "headers_only": { "type": "boolean", "default": false }
            }),
            &[],
        )
    }

    async fn execute(&self, runtime: &PipelineRuntime, input: Value) -> Result<Value, ApplicationError> {
        let args: ReadSheetArgs = parse_args(self.name(), input)?;
        to_value(runtime.read_sheet(args.sheet_name.as_deref(), args.headers_only).await?)
    }
}

struct FindClient;

#[derive(Deserialize)]
struct FindClientArgs {
    search_value: String,
    #[serde(default)]
    column: Option<String>,
    #[serde(default)]
    exact: bool,
    #[serde(default)]
    limit: Option<usize>,
    #[serde(default)]
    sheet_name: Option<String>,
}

#[async_trait]
impl Tool for FindClient {
    fn name(&self) -> &'static str {
        "find_client"
    }

    fn description(&self) -> &'static str {
        "Find onboarding sheet rows matching a value, in one column or all of them."
    }

    fn input_schema(&self) -> Value {
        schema(
            json!({
                "search_value": { "type": "string" },
                "column": { "type": "string" },
                "exact": { "type": "boolean", "default": false },
                "limit": { "type": "integer", "minimum": 1 },
                "sheet_name": { "type": "string" }
            }),
            &["search_value"],
        )
    }

    async fn execute(&self, runtime: &PipelineRuntime, input: Value) -> Result<Value, ApplicationError> {
        let args: FindClientArgs = parse_args(self.name(), input)?;
        let matches = runtime
            .find_client(&args.search_value, args.column, args.exact, args.limit, args.sheet_name.as_deref())
            .await?;
        Ok(json!({ "count": matches.len(), "matches": to_value(matches)? }))
    }
}

#[derive(Deserialize)]
struct LimitArgs {
    #[serde(default = "default_limit")]
    limit: usize,
}

fn default_limit() -> usize {
    DEFAULT_LIST_LIMIT
}

struct ListProposals;

#[async_trait]
impl Tool for ListProposals {
    fn name(&self) -> &'static str {
        "list_proposals"
    }

    fn description(&self) -> &'static str {
        "List generated proposals, newest first."
    }

    fn input_schema(&self) -> Value {
        schema(json!({ "limit": { "type": "integer", "default": DEFAULT_LIST_LIMIT } }), &[])
    }

    async fn execute(&self, runtime: &PipelineRuntime, input: Value) -> Result<Value, ApplicationError> {
        let args: LimitArgs = parse_args(self.name(), input)?;
        let proposals = runtime.list_proposals(args.limit).await?;
        Ok(json!({ "count": proposals.len(), "proposals": to_value(proposals)? }))
    }
}

struct ListTranscripts;

#[async_trait]
impl Tool for ListTranscripts {
    fn name(&self) -> &'static str {
        "list_transcripts"
    }

    fn description(&self) -> &'static str {
        "List saved transcripts and their analyzed data files, newest first."
    }

    fn input_schema(&self) -> Value {
        schema(json!({ "limit": { "type": "integer", "default": DEFAULT_LIST_LIMIT } }), &[])
    }

    async fn execute(&self, runtime: &PipelineRuntime, input: Value) -> Result<Value, ApplicationError> {
        let args: LimitArgs = parse_args(self.name(), input)?;
        let transcripts = runtime.list_transcripts(args.limit).await?;
        Ok(json!({ "count": transcripts.len(), "transcripts": to_value(transcripts)? }))
    }
}

struct GetLastDeploymentUrl;

#[async_trait]
impl Tool for GetLastDeploymentUrl {
    fn name(&self) -> &'static str {
        "get_last_deployment_url"
    }

    fn description(&self) -> &'static str {
        "Return the URL of the most recent deployment, if any."
    }

    fn input_schema(&self) -> Value {
        schema(json!({}), &[])
    }

    async fn execute(&self, runtime: &PipelineRuntime, _input: Value) -> Result<Value, ApplicationError> {
        Ok(json!({ "url": runtime.last_deployment_url().await? }))
    }
}

struct SyncToDrive;

#[async_trait]
impl Tool for SyncToDrive {
    fn name(&self) -> &'static str {
        "sync_to_drive"
    }

    fn description(&self) -> &'static str {
        "Upload all transcripts, proposals and the last deployment URL to Google Drive."
    }

    fn input_schema(&self) -> Value {
        schema(json!({}), &[])
    }

    async fn execute(&self, runtime: &PipelineRuntime, _input: Value) -> Result<Value, ApplicationError> {
        to_value(runtime.sync_to_drive().await?)
    }
}

struct ListDriveFiles;

#[derive(Deserialize)]
struct ListDriveArgs {
    #[serde(default = "default_folder")]
    folder_type: String,
    #[serde(default = "default_limit")]
    limit: usize,
}

fn default_folder() -> String {
    "proposals".to_string()
}

#[async_trait]
impl Tool for ListDriveFiles {
    fn name(&self) -> &'static str {
        "list_drive_files"
    }

    fn description(&self) -> &'static str {
        "List files in a Drive folder (transcripts, proposals, deployments or exports)."
    }

    fn input_schema(&self) -> Value {
        schema(
            json!({
                "folder_type": {
                    "type": "string",
                    "enum": ["transcripts", "proposals", "deployments", "exports"],
                    "default": "proposals"
                },
                "limit": { "type": "integer", "default": DEFAULT_LIST_LIMIT }
            }),
            &[],
        )
    }

    async fn execute(&self, runtime: &PipelineRuntime, input: Value) -> Result<Value, ApplicationError> {
        let args: ListDriveArgs = parse_args(self.name(), input)?;
        let files = runtime.list_drive_files(&args.folder_type, args.limit).await?;
        Ok(json!({ "count": files.len(), "files": to_value(files)? }))
    }
}

struct DownloadFromDrive;

#[derive(Deserialize)]
struct DownloadArgs {
    file_id: String,
    #[serde(default)]
    output_path: Option<PathBuf>,
}

#[async_trait]
impl Tool for DownloadFromDrive {
    fn name(&self) -> &'static str {
        "download_from_drive"
    }

    fn description(&self) -> &'static str {
        "Download a Drive file into the workspace downloads folder or a given path."
    }

    fn input_schema(&self) -> Value {
        schema(
            json!({
                "file_id": { "type": "string" },
                "output_path": { "type": "string" }
            }),
            &["file_id"],
        )
    }

    async fn execute(&self, runtime: &PipelineRuntime, input: Value) -> Result<Value, ApplicationError> {
        let args: DownloadArgs = parse_args(self.name(), input)?;
        let output = workspace_path(runtime, args.output_path)?;
        let path = runtime.download_from_drive(&args.file_id, output).await?;
        Ok(json!({ "file_id": args.file_id, "path": path }))
    }
}

struct Search;

#[derive(Deserialize)]
struct SearchArgs {
    query: String,
}

#[async_trait]
impl Tool for Search {
    fn name(&self) -> &'static str {
        "search"
    }

    fn description(&self) -> &'static str {
        "Search transcripts and proposals by file name."
    }

    fn input_schema(&self) -> Value {
        schema(json!({ "query": { "type": "string" } }), &["query"])
    }

    async fn execute(&self, runtime: &PipelineRuntime, input: Value) -> Result<Value, ApplicationError> {
        let args: SearchArgs = parse_args(self.name(), input)?;
        Ok(json!({ "results": to_value(runtime.search(&args.query).await?)? }))
    }
}

struct Fetch;

#[derive(Deserialize)]
struct FetchArgs {
    id: String,
}

#[async_trait]
impl Tool for Fetch {
    fn name(&self) -> &'static str {
        "fetch"
    }

    fn description(&self) -> &'static str {
        "Fetch a transcript or proposal by the id returned from search."
    }

    fn input_schema(&self) -> Value {
        schema(json!({ "id": { "type": "string" } }), &["id"])
    }

    /// Lookup failures come back as `{id, error}` rather than as a tool error.
    async fn execute(&self, runtime: &PipelineRuntime, input: Value) -> Result<Value, ApplicationError> {
        let args: FetchArgs = parse_args(self.name(), input)?;
        match runtime.fetch(&args.id).await {
            Ok(document) => to_value(document),
            Err(error @ (ApplicationError::NotFound(_) | ApplicationError::Domain(_))) => {
                Ok(json!({ "id": args.id, "error": error.to_string() }))
            }
            Err(error) => Err(error),
        }
    }
}
