use std::sync::Arc;

use closer_agent::{resources, PipelineRuntime, ToolError, ToolRegistry};
use closer_core::config::AppConfig;
use closer_core::errors::ApplicationError;
use rmcp::{
    handler::server::ServerHandler,
    model::{
        AnnotateAble, CallToolRequestParam, CallToolResult, Content, ErrorCode, Implementation,
        InitializeRequestParam, InitializeResult, ListResourcesResult, ListToolsResult,
        PaginatedRequestParam, ProtocolVersion, RawResource, ReadResourceRequestParam,
        ReadResourceResult, Resource, ResourceContents, ServerCapabilities, ServerInfo, Tool,
    },
    service::{RequestContext, RoleServer},
    ErrorData as McpError, ServiceExt,
};
use serde_json::{Map, Value};
use tracing::{info, warn};

/// MCP front end over the same tool registry the HTTP API serves.
#[derive(Clone)]
pub struct CloserMcpServer {
    runtime: Arc<PipelineRuntime>,
    registry: Arc<ToolRegistry>,
}

impl CloserMcpServer {
    pub fn new(runtime: Arc<PipelineRuntime>, registry: Arc<ToolRegistry>) -> Self {
        Self { runtime, registry }
    }

    pub async fn from_config(config: AppConfig) -> Result<Self, ApplicationError> {
        let runtime = PipelineRuntime::from_config(config).await?;
        Ok(Self::new(Arc::new(runtime), Arc::new(ToolRegistry::standard())))
    }

    pub async fn run_stdio(self) -> anyhow::Result<()> {
        info!(event_name = "mcp.server.stdio", tools = self.registry.len(), "serving MCP over stdio");
        let service = self.serve(rmcp::transport::stdio()).await?;
        let reason = service.waiting().await?;
        info!(event_name = "mcp.server.stopped", reason = ?reason, "MCP server shutdown complete");
        Ok(())
    }

    pub fn tools(&self) -> Vec<Tool> {
        self.registry
            .descriptors()
            .into_iter()
            .map(|descriptor| Tool {
                name: descriptor.name.into(),
                title: Some(title_case(descriptor.name).into()),
                description: Some(descriptor.description.into()),
                input_schema: Arc::new(
                    descriptor.input_schema.as_object().cloned().unwrap_or_else(Map::new),
                ),
                icons: None,
                annotations: None,
                output_schema: None,
                meta: None,
            })
            .collect()
    }

    /// Runs a tool. Pipeline failures come back as an error result the assistant can read;
    /// only an unknown tool is a protocol error.
    pub async fn invoke(
        &self,
        name: &str,
        arguments: Option<Map<String, Value>>,
    ) -> Result<CallToolResult, McpError> {
        let input = arguments.map(Value::Object).unwrap_or(Value::Null);
        match self.registry.call(&self.runtime, name, input).await {
            Ok(result) => Ok(CallToolResult::structured(result)),
            Err(ToolError::UnknownTool(name)) => Err(McpError {
                code: ErrorCode::METHOD_NOT_FOUND,
                message: format!("unknown tool `{name}`").into(),
                data: None,
            }),
            Err(ToolError::Application(error)) => {
                let error = error.into_interface(uuid::Uuid::new_v4().to_string());
                warn!(
                    event_name = "mcp.tool.failed",
                    tool = name,
                    correlation_id = %error.correlation_id(),
                    error = %error,
                    "tool call failed"
                );
                Ok(CallToolResult::error(vec![Content::text(format!(
                    "{} {} (correlation id {})",
                    error.user_message(),
                    error.message(),
                    error.correlation_id()
                ))]))
            }
        }
    }

    pub fn resources(&self) -> Vec<Resource> {
        resources::RESOURCES
            .iter()
            .map(|descriptor| {
                let mut raw = RawResource::new(descriptor.uri, descriptor.name);
                raw.description = Some(descriptor.description.to_string());
                raw.mime_type = Some(descriptor.mime_type.to_string());
                raw.no_annotation()
            })
            .collect()
    }

    pub fn read(&self, uri: &str) -> Result<ReadResourceResult, McpError> {
        let descriptor = resources::descriptor(uri).ok_or_else(|| {
            McpError::resource_not_found(format!("unknown resource `{uri}`"), None)
        })?;
        let text = resources::read(&self.runtime, descriptor.uri)
            .map_err(|error| McpError::internal_error(error.to_string(), None))?;
        Ok(ReadResourceResult { contents: vec![ResourceContents::text(text, descriptor.uri)] })
    }
}

impl ServerHandler for CloserMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().enable_resources().build(),
            server_info: Implementation {
                name: "closer".to_string(),
                title: Some("Closer proposal pipeline".to_string()),
                version: env!("CARGO_PKG_VERSION").to_string(),
                website_url: None,
                icons: None,
            },
            instructions: Some(
                "Turn sales call transcripts into hosted proposals. Start with quick_proposal, \
                 or read directive://proposal-workflow for the step-by-step flow."
                    .to_string(),
            ),
            ..Default::default()
        }
    }

    async fn initialize(
        &self,
        request: InitializeRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> Result<InitializeResult, McpError> {
        let mut info = self.get_info();
        info.protocol_version = request.protocol_version.clone();
        Ok(info)
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, McpError> {
        Ok(ListToolsResult { tools: self.tools(), ..Default::default() })
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        info!(event_name = "mcp.tool.called", tool = %request.name, "tool call");
        self.invoke(request.name.as_ref(), request.arguments).await
    }

    async fn list_resources(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListResourcesResult, McpError> {
        Ok(ListResourcesResult::with_all_items(self.resources()))
    }

    async fn read_resource(
        &self,
        request: ReadResourceRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> Result<ReadResourceResult, McpError> {
        self.read(&request.uri)
    }
}

fn title_case(name: &str) -> String {
    name.split('_')
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
