//! Tool output encoding
//!
//! Tool payloads travel as a single text content block holding pretty-printed
//! JSON, so a client can read them as text or parse them back into structure.

use rmcp::model::{CallToolResult, Content};
use serde::Serialize;

use crate::error::{McpResult, ResultExt};

/// Wrap `data` as a non-error tool result
///
/// A payload that cannot be serialized becomes an internal error.
pub fn json_success<T: Serialize>(data: &T) -> McpResult<CallToolResult> {
    let json = serde_json::to_string_pretty(data).to_mcp_err()?;
    Ok(CallToolResult::success(vec![Content::text(json)]))
}
