//! Parameter types for Script Runner MCP tools

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct RunScriptParams {
    #[schemars(description = "Name of the configured script to execute")]
    pub script_name: String,

    #[schemars(description = "Positional arguments passed to the script as-is (optional)")]
    #[serde(default)]
    pub arguments: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct ScriptInfoParams {
    #[schemars(description = "Name of the script to describe")]
    pub script_name: String,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct SetWorkingDirectoryParams {
    #[schemars(description = "Directory to run scripts in (absolute, ~, or relative to the current one)")]
    pub path: String,
}

/// Tools that take no input
#[derive(Debug, Default, Serialize, Deserialize, JsonSchema)]
pub struct NoParams {}
