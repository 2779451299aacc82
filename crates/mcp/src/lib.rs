//! Closer MCP (Model Context Protocol) server
//!
//! Exposes the pipeline tool registry to AI assistants over stdio, together with the
//! proposal templates and the workflow directive as readable resources.
//!
//! - `CloserMcpServer`: the `ServerHandler` over a [`closer_agent::PipelineRuntime`]
//!
//! Stdout carries the protocol, so logging must go to stderr.

mod server;

pub use server::CloserMcpServer;
