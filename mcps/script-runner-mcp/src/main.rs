//! Script Runner MCP - Run project-defined scripts over MCP stdio
//!
//! Usage:
//!   script-runner-mcp [--config <PATH>]
//!
//! The config path falls back to `SCRIPT_RUNNER_CONFIG`, then to
//! `.mcp-config.json` in the current directory.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use script_runner_mcp::{ConfigStore, ScriptRunnerServer, DEFAULT_CONFIG_FILE};

#[derive(Parser)]
#[command(name = "script-runner-mcp")]
#[command(about = "MCP server exposing project scripts as tools")]
struct Cli {
    /// Script configuration file (.json or .toml)
    #[arg(short, long, env = "SCRIPT_RUNNER_CONFIG", default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    mcp_common::init_tracing("script_runner_mcp")?;

    let store = ConfigStore::open(&cli.config)?;
    tracing::info!(config = %store.path().display(), "Starting script-runner-mcp");

    let server = Arc::new(ScriptRunnerServer::new(Arc::new(store)));
    mcp_common::serve_stdio(server).await
}
