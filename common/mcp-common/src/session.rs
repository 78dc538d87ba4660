//! Per-connection MCP session state machine
//!
//! A session moves `Uninitialized -> Initializing -> Ready` and never back.
//! `initialize` is only accepted while uninitialized, the client's
//! `notifications/initialized` moves the session to ready, and tool requests
//! are rejected with `InvalidSessionState` until then, before the dispatcher
//! is ever consulted.

use std::fmt;
use std::sync::Arc;

use rmcp::model::{
    CallToolRequestParam, CallToolResult, Implementation, InitializeRequestParam,
    InitializeResult, ListToolsResult, ProtocolVersion, ServerCapabilities,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::dispatch::ToolDispatcher;
use crate::error::{invalid_params, method_not_found, McpResult, ResultExt, SessionError};
use crate::protocol::{
    JsonRpcRequest, JsonRpcResponse, JSONRPC_VERSION, SUPPORTED_PROTOCOL_VERSIONS,
};

/// Handshake phase of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Uninitialized,
    /// `initialize` answered, waiting for the client's acknowledgment
    Initializing,
    Ready,
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionPhase::Uninitialized => "uninitialized",
            SessionPhase::Initializing => "initializing",
            SessionPhase::Ready => "ready",
        };
        f.write_str(name)
    }
}

/// One connected client
pub struct Session<D> {
    dispatcher: Arc<D>,
    phase: SessionPhase,
    negotiated_protocol_version: Option<ProtocolVersion>,
    client_info: Option<Implementation>,
    closed: bool,
}

impl<D: ToolDispatcher> Session<D> {
    pub fn new(dispatcher: Arc<D>) -> Self {
        Self {
            dispatcher,
            phase: SessionPhase::Uninitialized,
            negotiated_protocol_version: None,
            client_info: None,
            closed: false,
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn negotiated_protocol_version(&self) -> Option<&ProtocolVersion> {
        self.negotiated_protocol_version.as_ref()
    }

    pub fn client_info(&self) -> Option<&Implementation> {
        self.client_info.as_ref()
    }

    /// True once a fatal handshake error was answered; the transport should hang up
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    // ========================================================================
    // Handshake
    // ========================================================================

    pub fn handle_initialize(
        &mut self,
        params: InitializeRequestParam,
    ) -> Result<InitializeResult, SessionError> {
        if self.phase != SessionPhase::Uninitialized {
            return Err(SessionError::InvalidSessionState {
                method: "initialize".to_string(),
                phase: self.phase,
            });
        }

        if !SUPPORTED_PROTOCOL_VERSIONS.contains(&params.protocol_version) {
            warn!(
                requested = %params.protocol_version,
                "Rejecting unsupported protocol version"
            );
            self.closed = true;
            return Err(SessionError::VersionMismatch {
                requested: params.protocol_version.to_string(),
                supported: SUPPORTED_PROTOCOL_VERSIONS
                    .iter()
                    .map(|v| v.to_string())
                    .collect(),
            });
        }

        info!(
            protocol_version = %params.protocol_version,
            client = %params.client_info.name,
            client_version = %params.client_info.version,
            "Session initializing"
        );
        debug!(capabilities = ?params.capabilities, "Client capabilities");

        self.phase = SessionPhase::Initializing;
        self.negotiated_protocol_version = Some(params.protocol_version.clone());
        self.client_info = Some(params.client_info);

        Ok(InitializeResult {
            protocol_version: params.protocol_version,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: self.dispatcher.server_name().to_string(),
                title: None,
                version: self.dispatcher.server_version().to_string(),
                icons: None,
                website_url: None,
            },
            instructions: self.dispatcher.instructions(),
        })
    }

    pub fn handle_initialized(&mut self) -> Result<(), SessionError> {
        if self.phase != SessionPhase::Initializing {
            return Err(SessionError::InvalidSessionState {
                method: "notifications/initialized".to_string(),
                phase: self.phase,
            });
        }
        self.phase = SessionPhase::Ready;
        info!("Session ready");
        Ok(())
    }

    fn ensure_ready(&self, method: &str) -> Result<(), SessionError> {
        if self.phase == SessionPhase::Ready {
            Ok(())
        } else {
            Err(SessionError::InvalidSessionState {
                method: method.to_string(),
                phase: self.phase,
            })
        }
    }

    // ========================================================================
    // Tool operations (Ready only)
    // ========================================================================

    pub fn handle_list_tools(&self) -> McpResult<ListToolsResult> {
        self.ensure_ready("tools/list")?;
        Ok(ListToolsResult::with_all_items(self.dispatcher.list_tools()))
    }

    pub async fn handle_tool_call(
        &self,
        params: CallToolRequestParam,
    ) -> McpResult<CallToolResult> {
        self.ensure_ready("tools/call")?;
        debug!(tool = %params.name, "Dispatching tool call");
        let arguments = Value::Object(params.arguments.unwrap_or_default());
        self.dispatcher.call_tool(&params.name, arguments).await
    }

    // ========================================================================
    // Routing
    // ========================================================================

    /// Process one decoded message; notifications produce no response
    pub async fn handle(&mut self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        if request.is_notification() {
            self.handle_notification(&request.method);
            return None;
        }
        let id = request.id.clone().unwrap_or(Value::Null);

        if request.jsonrpc != JSONRPC_VERSION {
            return Some(JsonRpcResponse::failure(
                id,
                rmcp::ErrorData::invalid_request(
                    format!("Unsupported jsonrpc version '{}'", request.jsonrpc),
                    None,
                ),
            ));
        }

        let outcome = self.route(&request.method, request.params).await;
        Some(match outcome {
            Ok(result) => JsonRpcResponse::success(id, result),
            Err(error) => {
                debug!(method = %request.method, code = error.code.0, "Request failed");
                JsonRpcResponse::failure(id, error)
            }
        })
    }

    async fn route(&mut self, method: &str, params: Option<Value>) -> McpResult<Value> {
        match method {
            "initialize" => {
                let params: InitializeRequestParam = parse_params(method, params)?;
                to_json(&self.handle_initialize(params)?)
            }
            "ping" => Ok(json!({})),
            "tools/list" => to_json(&self.handle_list_tools()?),
            "tools/call" => {
                // Gate before parsing so an unready session never inspects the payload
                self.ensure_ready(method)?;
                let params: CallToolRequestParam = parse_params(method, params)?;
                to_json(&self.handle_tool_call(params).await?)
            }
            other => Err(method_not_found(other)),
        }
    }

    fn handle_notification(&mut self, method: &str) {
        match method {
            "notifications/initialized" => {
                if let Err(e) = self.handle_initialized() {
                    warn!("Ignoring initialized notification: {}", e);
                }
            }
            other => debug!(method = other, "Ignoring notification"),
        }
    }
}

fn parse_params<T: DeserializeOwned>(method: &str, params: Option<Value>) -> McpResult<T> {
    serde_json::from_value(params.unwrap_or_else(|| json!({})))
        .map_err(|e| invalid_params(format!("Invalid params for {}: {}", method, e)))
}

fn to_json<T: Serialize>(value: &T) -> McpResult<Value> {
    serde_json::to_value(value).to_mcp_err()
}
