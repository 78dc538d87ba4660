//! Tool handlers
//!
//! Each handler reads the current snapshot (or asks the store to replace it)
//! and formats the outcome as a JSON tool result. Domain errors become
//! JSON-RPC errors tagged with their kind.

use mcp_common::{json_success, tagged_error, CallToolResult, ErrorCode, McpError};
use serde_json::json;
use tracing::info;

use crate::config::ConfigStore;
use crate::executor::ScriptExecutor;
use crate::params::*;
use crate::types::{
    ReloadResponse, ScriptList, ScriptRunnerError, ScriptSummary, WorkingDirectoryResponse,
};

// ============================================================================
// Helper Functions
// ============================================================================

pub fn runner_error_to_mcp(err: ScriptRunnerError) -> McpError {
    let message = err.to_string();
    match err {
        ScriptRunnerError::ConfigError(_) => {
            tagged_error(ErrorCode::INTERNAL_ERROR, "ConfigError", message, json!({}))
        }
        ScriptRunnerError::PathError(_) => {
            tagged_error(ErrorCode::INVALID_PARAMS, "PathError", message, json!({}))
        }
        ScriptRunnerError::ScriptNotFound(name) => tagged_error(
            ErrorCode::RESOURCE_NOT_FOUND,
            "ScriptNotFound",
            message,
            json!({ "script_name": name }),
        ),
    }
}

// ============================================================================
// Handler Functions
// ============================================================================

pub async fn list_scripts(store: &ConfigStore) -> Result<CallToolResult, McpError> {
    let snapshot = store.current_snapshot().await;
    let scripts: Vec<ScriptSummary> = snapshot.scripts.iter().map(ScriptSummary::from).collect();

    json_success(&ScriptList {
        count: scripts.len(),
        scripts,
    })
}

pub async fn get_script_info(
    store: &ConfigStore,
    params: ScriptInfoParams,
) -> Result<CallToolResult, McpError> {
    let snapshot = store.current_snapshot().await;
    let definition = snapshot
        .script(&params.script_name)
        .ok_or_else(|| ScriptRunnerError::ScriptNotFound(params.script_name.clone()))
        .map_err(runner_error_to_mcp)?;

    json_success(definition)
}

pub async fn run_script(
    store: &ConfigStore,
    params: RunScriptParams,
) -> Result<CallToolResult, McpError> {
    // Pin the snapshot for the whole run; a concurrent reload cannot alter this definition
    let snapshot = store.current_snapshot().await;
    let definition = snapshot
        .script(&params.script_name)
        .cloned()
        .ok_or_else(|| ScriptRunnerError::ScriptNotFound(params.script_name.clone()))
        .map_err(runner_error_to_mcp)?;

    let cwd = snapshot.run_directory(&definition);
    let result = ScriptExecutor::new(snapshot.max_output_bytes)
        .execute(&definition, &params.arguments, &cwd)
        .await;

    json_success(&result)
}

pub async fn get_working_directory(store: &ConfigStore) -> Result<CallToolResult, McpError> {
    let snapshot = store.current_snapshot().await;
    json_success(&WorkingDirectoryResponse {
        working_directory: snapshot.working_directory.clone(),
        previous: None,
    })
}

pub async fn set_working_directory(
    store: &ConfigStore,
    params: SetWorkingDirectoryParams,
) -> Result<CallToolResult, McpError> {
    let previous = store.current_snapshot().await.working_directory.clone();
    let snapshot = store
        .set_working_directory(&params.path)
        .await
        .map_err(runner_error_to_mcp)?;

    json_success(&WorkingDirectoryResponse {
        working_directory: snapshot.working_directory.clone(),
        previous: Some(previous),
    })
}

pub async fn reload_config(store: &ConfigStore) -> Result<CallToolResult, McpError> {
    let snapshot = store.reload().await.map_err(runner_error_to_mcp)?;
    info!(scripts = snapshot.scripts.len(), "reload_config completed");

    json_success(&ReloadResponse {
        script_count: snapshot.scripts.len(),
        working_directory: snapshot.working_directory.clone(),
        source: snapshot.source.clone(),
    })
}
