//! Error handling utilities for MCP servers
//!
//! Every error a client sees is an [`McpError`] (JSON-RPC error object). Domain
//! errors attach a `data.kind` tag so clients can branch on the failure class
//! without parsing messages.

use rmcp::model::ErrorCode;
use rmcp::ErrorData as McpError;
use serde_json::{json, Value};
use thiserror::Error;

use crate::session::SessionPhase;

/// Type alias for MCP tool results
pub type McpResult<T> = Result<T, McpError>;

/// Errors raised by the session state machine
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("Unsupported protocol version '{requested}' (supported: {})", .supported.join(", "))]
    VersionMismatch {
        requested: String,
        supported: Vec<String>,
    },

    #[error("'{method}' is not allowed while the session is {phase}")]
    InvalidSessionState { method: String, phase: SessionPhase },
}

impl SessionError {
    pub fn kind(&self) -> &'static str {
        match self {
            SessionError::VersionMismatch { .. } => "VersionMismatch",
            SessionError::InvalidSessionState { .. } => "InvalidSessionState",
        }
    }
}

impl From<SessionError> for McpError {
    fn from(err: SessionError) -> Self {
        let message = err.to_string();
        let kind = err.kind();
        match err {
            SessionError::VersionMismatch {
                requested,
                supported,
            } => McpError::invalid_params(
                message,
                Some(json!({
                    "kind": kind,
                    "requested": requested,
                    "supported": supported,
                })),
            ),
            SessionError::InvalidSessionState { method, phase } => McpError::invalid_request(
                message,
                Some(json!({
                    "kind": kind,
                    "method": method,
                    "phase": phase.to_string(),
                })),
            ),
        }
    }
}

/// Trait for converting errors into MCP-compatible errors
///
/// Implement this for external error types to enable `?` in tool handlers.
pub trait IntoMcpError {
    /// Convert this error into an MCP error
    fn into_mcp_error(self) -> McpError;
}

impl IntoMcpError for serde_json::Error {
    fn into_mcp_error(self) -> McpError {
        McpError::internal_error(format!("JSON error: {}", self), None)
    }
}

/// Extension trait for Result types to convert to MCP errors
pub trait ResultExt<T> {
    /// Convert the error to an MCP error
    fn to_mcp_err(self) -> Result<T, McpError>;
}

impl<T, E: IntoMcpError> ResultExt<T> for Result<T, E> {
    fn to_mcp_err(self) -> Result<T, McpError> {
        self.map_err(|e| e.into_mcp_error())
    }
}

/// Create an invalid params error with a message
///
/// Use this when the tool receives invalid parameters.
pub fn invalid_params(message: impl Into<String>) -> McpError {
    McpError::invalid_params(message.into(), None)
}

/// Create a method-not-found error for an unknown JSON-RPC method
pub fn method_not_found(method: &str) -> McpError {
    McpError::new(
        ErrorCode::METHOD_NOT_FOUND,
        format!("Method not found: {}", method),
        None,
    )
}

/// Create a parse error for a frame that is not valid JSON-RPC
pub fn parse_error(message: impl Into<String>) -> McpError {
    McpError::new(ErrorCode::PARSE_ERROR, message.into(), None)
}

/// Build an error tagged with `data.kind`, merging any extra data fields
pub fn tagged_error(code: ErrorCode, kind: &str, message: impl Into<String>, extra: Value) -> McpError {
    let mut data = json!({ "kind": kind });
    if let (Some(target), Value::Object(fields)) = (data.as_object_mut(), extra) {
        target.extend(fields);
    }
    McpError::new(code, message.into(), Some(data))
}

/// Read the `data.kind` tag of an error, if it has one
pub fn error_kind(err: &McpError) -> Option<&str> {
    err.data.as_ref()?.get("kind")?.as_str()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_ext_json() {
        let result: Result<Value, serde_json::Error> = serde_json::from_str("{oops");
        let err = result.to_mcp_err().unwrap_err();
        assert_eq!(err.code, ErrorCode::INTERNAL_ERROR);
        assert!(err.message.starts_with("JSON error"));
    }

    #[test]
    fn test_version_mismatch_is_tagged() {
        let err: McpError = SessionError::VersionMismatch {
            requested: "1999-01-01".to_string(),
            supported: vec!["2024-11-05".to_string()],
        }
        .into();
        assert_eq!(err.code, ErrorCode::INVALID_PARAMS);
        assert_eq!(error_kind(&err), Some("VersionMismatch"));
        assert!(err.message.contains("1999-01-01"));
    }

    #[test]
    fn test_invalid_state_reports_phase() {
        let err: McpError = SessionError::InvalidSessionState {
            method: "tools/call".to_string(),
            phase: SessionPhase::Initializing,
        }
        .into();
        assert_eq!(err.code, ErrorCode::INVALID_REQUEST);
        assert_eq!(error_kind(&err), Some("InvalidSessionState"));
        assert_eq!(err.data.unwrap()["phase"], "initializing");
    }

    #[test]
    fn test_tagged_error_merges_extra() {
        let err = tagged_error(
            ErrorCode::RESOURCE_NOT_FOUND,
            "ScriptNotFound",
            "Script not found: deploy",
            json!({"script_name": "deploy"}),
        );
        assert_eq!(error_kind(&err), Some("ScriptNotFound"));
        assert_eq!(err.data.unwrap()["script_name"], "deploy");
    }

    #[test]
    fn test_method_not_found_code() {
        let err = method_not_found("resources/list");
        assert_eq!(err.code, ErrorCode::METHOD_NOT_FOUND);
        assert!(err.message.contains("resources/list"));
    }
}
