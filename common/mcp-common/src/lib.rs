//! MCP Common - Shared plumbing for MCP servers
//!
//! This crate provides the protocol side of a stdio MCP server so a server
//! crate only has to describe and execute its tools:
//!
//! - **Protocol**: JSON-RPC 2.0 envelope and handshake payloads
//! - **Session**: the `Uninitialized -> Initializing -> Ready` state machine
//! - **Dispatch**: [`ToolDispatcher`], the trait a server implements
//! - **Transport**: newline-delimited JSON over stdio or any duplex stream
//! - **Results / Errors**: helpers for `CallToolResult` and tagged `McpError`s
//! - **Initialization**: tracing setup that keeps stdout clean
//!
//! # Example
//!
//! ```rust,ignore
//! use mcp_common::{init_tracing, serve_stdio};
//!
//! init_tracing("my_mcp")?;
//! serve_stdio(Arc::new(MyServer::new())).await?;
//! ```

pub mod dispatch;
pub mod error;
pub mod init;
pub mod protocol;
pub mod result;
pub mod session;
pub mod transport;

// Re-export commonly used items at crate root
pub use dispatch::ToolDispatcher;
pub use error::{
    error_kind, invalid_params, tagged_error, IntoMcpError, McpResult, ResultExt,
    SessionError,
};
pub use init::init_tracing;
pub use protocol::{JsonRpcRequest, JsonRpcResponse, SUPPORTED_PROTOCOL_VERSIONS};
pub use result::json_success;
pub use session::{Session, SessionPhase};
pub use transport::{serve_stdio, serve_stream};

// Re-export rmcp types that are commonly needed
pub use rmcp::{
    model::{CallToolResult, Content, ErrorCode, JsonObject, Tool},
    ErrorData as McpError,
};

// Re-export async_trait for implementing ToolDispatcher
pub use async_trait::async_trait;
