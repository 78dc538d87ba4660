//! Script Runner MCP Library
//!
//! Exposes a project's own scripts (build, test, deploy helpers) to MCP
//! clients. Scripts are declared in a JSON or TOML config file, listed and
//! described on request, and executed with a timeout and capped output.
//!
//! # Usage as Library
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use script_runner_mcp::{ConfigStore, ScriptRunnerServer};
//!
//! let store = Arc::new(ConfigStore::open(".mcp-config.json")?);
//! let server = Arc::new(ScriptRunnerServer::new(store));
//! mcp_common::serve_stdio(server).await?;
//! ```

pub mod config;
pub mod executor;
pub mod handlers;
pub mod params;
pub mod server;
pub mod types;

// Re-export main server type
pub use server::ScriptRunnerServer;

pub use config::{ConfigStore, DEFAULT_CONFIG_FILE};
pub use executor::ScriptExecutor;
pub use types::{ConfigSnapshot, ExecutionResult, ScriptDefinition, ScriptRunnerError};

// Re-export parameter types for direct API usage
pub use params::*;
