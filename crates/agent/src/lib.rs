//! Pipeline runtime: transcript analysis through the LLM, guardrails on what it returns,
//! and orchestration of render, deploy, email and Google sync.
//!
//! The LLM only extracts. It never decides prices: plan strings outside the fixed menu
//! are degraded to "to be confirmed" by [`guardrails::GuardrailPolicy`].
//!
//! - `analyzer` - prompt construction and JSON extraction
//! - `guardrails` - checks on the extracted record
//! - `llm` - OpenAI, Anthropic and Ollama clients behind [`llm::LlmClient`]
//! - `resources` - templates and directives served as read-only documents
//! - `runtime` - [`runtime::PipelineRuntime`], one method per pipeline operation
//! - `tools` - the named tool registry shared by the HTTP and MCP surfaces

pub mod analyzer;
pub mod guardrails;
pub mod llm;
pub mod resources;
pub mod runtime;
pub mod tools;

pub use analyzer::{Analysis, TranscriptAnalyzer};
pub use guardrails::GuardrailPolicy;
pub use llm::{CompletionRequest, LlmClient};
pub use resources::ResourceDescriptor;
pub use runtime::{PipelineRuntime, RuntimeServices};
pub use tools::{Tool, ToolDescriptor, ToolError, ToolRegistry};
