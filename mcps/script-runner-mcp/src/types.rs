//! Type definitions for script runner MCP

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Timeout applied when a script entry does not name one
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Per-stream capture cap (stdout and stderr each)
pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 1024 * 1024;

/// Exit code reported when a script timed out, could not start, or died from a signal
pub const FAILURE_EXIT_CODE: i32 = -1;

// ============================================================================
// Registry Types
// ============================================================================

/// One configured script, immutable once loaded
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScriptDefinition {
    pub name: String,
    /// Relative paths resolve against the working directory the script runs in
    pub path: PathBuf,
    pub description: String,
    /// Informational labels for positional arguments; never validated
    pub argument_names: Vec<String>,
    pub timeout_seconds: u64,
    /// Overrides the session working directory for this script
    #[serde(skip_serializing_if = "Option::is_none")]
    pub working_directory: Option<PathBuf>,
    /// Program that runs the script (e.g. `bash`); executed directly when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interpreter: Option<String>,
}

impl ScriptDefinition {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            description: String::new(),
            argument_names: Vec::new(),
            timeout_seconds: DEFAULT_TIMEOUT_SECS,
            working_directory: None,
            interpreter: None,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

/// A complete, consistent view of the configuration
///
/// Never mutated after construction; changes produce a new snapshot that
/// replaces the old one wholesale.
#[derive(Debug, Clone)]
pub struct ConfigSnapshot {
    /// Absolute, canonical directory scripts run in
    pub working_directory: PathBuf,
    /// Scripts in document order; names are unique
    pub scripts: Arc<Vec<ScriptDefinition>>,
    pub max_output_bytes: usize,
    /// Document this snapshot was loaded from (None for the built-in default)
    pub source: Option<PathBuf>,
}

impl ConfigSnapshot {
    pub fn empty(working_directory: PathBuf) -> Self {
        Self {
            working_directory,
            scripts: Arc::new(Vec::new()),
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
            source: None,
        }
    }

    pub fn script(&self, name: &str) -> Option<&ScriptDefinition> {
        self.scripts.iter().find(|s| s.name == name)
    }

    /// Copy of this snapshot pointed at another directory; the script list is shared
    pub fn with_working_directory(&self, working_directory: PathBuf) -> Self {
        Self {
            working_directory,
            scripts: Arc::clone(&self.scripts),
            max_output_bytes: self.max_output_bytes,
            source: self.source.clone(),
        }
    }

    /// Directory a given script runs in
    pub fn run_directory(&self, definition: &ScriptDefinition) -> PathBuf {
        match &definition.working_directory {
            Some(dir) => self.working_directory.join(dir),
            None => self.working_directory.clone(),
        }
    }
}

// ============================================================================
// Response Types
// ============================================================================

/// Outcome of one script execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub script_name: String,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration_millis: u64,
    pub timed_out: bool,
    /// Either stream hit the capture cap
    pub truncated: bool,
    pub success: bool,
}

impl ExecutionResult {
    /// Result for a script that never ran (missing file, spawn failure)
    pub fn failed_to_start(script_name: &str, message: String, elapsed: Duration) -> Self {
        Self {
            script_name: script_name.to_string(),
            exit_code: FAILURE_EXIT_CODE,
            stdout: String::new(),
            stderr: message,
            duration_millis: elapsed.as_millis() as u64,
            timed_out: false,
            truncated: false,
            success: false,
        }
    }
}

/// Entry returned by `list_scripts`
#[derive(Debug, Serialize)]
pub struct ScriptSummary {
    pub name: String,
    pub description: String,
    pub arguments: Vec<String>,
    pub timeout_seconds: u64,
}

impl From<&ScriptDefinition> for ScriptSummary {
    fn from(definition: &ScriptDefinition) -> Self {
        Self {
            name: definition.name.clone(),
            description: definition.description.clone(),
            arguments: definition.argument_names.clone(),
            timeout_seconds: definition.timeout_seconds,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ScriptList {
    pub count: usize,
    pub scripts: Vec<ScriptSummary>,
}

#[derive(Debug, Serialize)]
pub struct WorkingDirectoryResponse {
    pub working_directory: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
pub struct ReloadResponse {
    pub script_count: usize,
    pub working_directory: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<PathBuf>,
}

// ============================================================================
// Error Types
// ============================================================================

#[derive(Error, Debug)]
pub enum ScriptRunnerError {
    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("Invalid working directory: {0}")]
    PathError(String),

    #[error("Script not found: {0}")]
    ScriptNotFound(String),
}
