//! MCP Server implementation for project scripts
//!
//! This module defines the tool registry the session routes to. Handler
//! implementations are in the handlers module.

use std::sync::Arc;

use mcp_common::{
    async_trait, invalid_params, CallToolResult, JsonObject, McpError, McpResult, Tool,
    ToolDispatcher,
};
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::config::ConfigStore;
use crate::handlers;
use crate::params::*;

/// The Script Runner MCP Server
#[derive(Clone)]
pub struct ScriptRunnerServer {
    store: Arc<ConfigStore>,
}

impl ScriptRunnerServer {
    pub fn new(store: Arc<ConfigStore>) -> Self {
        Self { store }
    }
}

fn input_schema<T: JsonSchema>() -> Arc<JsonObject> {
    match serde_json::to_value(schemars::schema_for!(T)) {
        Ok(Value::Object(schema)) => Arc::new(schema),
        _ => Arc::new(JsonObject::new()),
    }
}

fn parse_arguments<T: DeserializeOwned>(tool: &str, arguments: Value) -> McpResult<T> {
    serde_json::from_value(arguments)
        .map_err(|e| invalid_params(format!("Invalid arguments for {}: {}", tool, e)))
}

// ============================================================================
// Tool Router - Each tool delegates to its handler
// ============================================================================

#[async_trait]
impl ToolDispatcher for ScriptRunnerServer {
    fn server_name(&self) -> &str {
        env!("CARGO_PKG_NAME")
    }

    fn server_version(&self) -> &str {
        env!("CARGO_PKG_VERSION")
    }

    fn instructions(&self) -> Option<String> {
        Some(
            "Runs developer-defined project scripts. \
             Use list_scripts to discover them, get_script_info for details, \
             and run_script to execute one with positional arguments. \
             Scripts run in the current working directory (see get_working_directory)."
                .into(),
        )
    }

    fn list_tools(&self) -> Vec<Tool> {
        vec![
            Tool::new(
                "run_script",
                "Execute a configured script with optional positional arguments",
                input_schema::<RunScriptParams>(),
            ),
            Tool::new(
                "list_scripts",
                "List all configured scripts with their descriptions",
                input_schema::<NoParams>(),
            ),
            Tool::new(
                "get_script_info",
                "Get detailed information about a specific script",
                input_schema::<ScriptInfoParams>(),
            ),
            Tool::new(
                "get_working_directory",
                "Get the directory scripts currently run in",
                input_schema::<NoParams>(),
            ),
            Tool::new(
                "set_working_directory",
                "Set the directory scripts run in",
                input_schema::<SetWorkingDirectoryParams>(),
            ),
            Tool::new(
                "reload_config",
                "Reload the script configuration from disk",
                input_schema::<NoParams>(),
            ),
        ]
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<CallToolResult, McpError> {
        let store = self.store.as_ref();
        match name {
            "run_script" => handlers::run_script(store, parse_arguments(name, arguments)?).await,
            "list_scripts" => handlers::list_scripts(store).await,
            "get_script_info" => {
                handlers::get_script_info(store, parse_arguments(name, arguments)?).await
            }
            "get_working_directory" => handlers::get_working_directory(store).await,
            "set_working_directory" => {
                handlers::set_working_directory(store, parse_arguments(name, arguments)?).await
            }
            "reload_config" => handlers::reload_config(store).await,
            other => Err(invalid_params(format!("Unknown tool: {}", other))),
        }
    }
}
