//! Tool dispatch seam between the session and a concrete server
//!
//! The session state machine owns the protocol; a server only describes its
//! tools and executes them. Anything implementing [`ToolDispatcher`] can be
//! served over stdio or driven in-process (tests, embedding hosts).
//!
//! # Example
//!
//! ```rust,ignore
//! use mcp_common::{ToolDispatcher, Session};
//!
//! let mut session = Session::new(Arc::new(MyServer::new()));
//! let response = session.handle(request).await;
//! ```

use async_trait::async_trait;
use rmcp::model::{CallToolResult, Tool};
use serde_json::Value;

use crate::error::McpResult;

/// Trait for MCP servers whose tools are routed to by a [`crate::Session`]
///
/// Implementations must be `Send + Sync`; the same dispatcher may back
/// several sessions.
#[async_trait]
pub trait ToolDispatcher: Send + Sync {
    /// Returns the server name reported in the handshake
    fn server_name(&self) -> &str;

    /// Returns the server version reported in the handshake
    fn server_version(&self) -> &str;

    /// Returns a list of all available tools
    ///
    /// Each tool includes its name, description, and input schema.
    fn list_tools(&self) -> Vec<Tool>;

    /// Executes a tool by name with the given JSON arguments
    ///
    /// Returns a JSON-RPC error if the tool is unknown, the arguments are
    /// invalid, or the operation fails in a way the caller must see as an
    /// error rather than as tool output.
    async fn call_tool(&self, name: &str, arguments: Value) -> McpResult<CallToolResult>;

    /// Usage notes returned to the client at initialization
    fn instructions(&self) -> Option<String> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::invalid_params;

    struct TestServer;

    #[async_trait]
    impl ToolDispatcher for TestServer {
        fn server_name(&self) -> &str {
            "test-server"
        }

        fn server_version(&self) -> &str {
            "0.0.1"
        }

        fn list_tools(&self) -> Vec<Tool> {
            vec![]
        }

        async fn call_tool(&self, name: &str, _arguments: Value) -> McpResult<CallToolResult> {
            Err(invalid_params(format!("Unknown tool: {}", name)))
        }
    }

    #[test]
    fn test_server_identity() {
        let server = TestServer;
        assert_eq!(server.server_name(), "test-server");
        assert!(server.instructions().is_none());
    }

    #[tokio::test]
    async fn test_call_unknown_tool() {
        let server = TestServer;
        let result = server.call_tool("unknown", serde_json::json!({})).await;
        assert!(result.unwrap_err().message.contains("unknown"));
    }
}
