//! End-to-end tests for script-runner-mcp
//!
//! Each test writes a config and scripts into a temp dir, then talks
//! newline-delimited JSON-RPC to a session over an in-memory duplex stream.
//!
//! ```bash
//! cargo test -p script-runner-mcp --test protocol
//! ```

#![cfg(unix)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use mcp_common::{serve_stream, Session};
use script_runner_mcp::{handlers, ConfigStore, RunScriptParams, ScriptRunnerServer};
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, Lines};
use tokio::task::JoinHandle;

// ============================================================================
// Fixtures
// ============================================================================

struct Project {
    dir: TempDir,
}

impl Project {
    fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
        }
    }

    fn path(&self) -> &Path {
        self.dir.path()
    }

    fn config_path(&self) -> PathBuf {
        self.path().join(".mcp-config.json")
    }

    fn script(&self, name: &str, body: &str) -> &Self {
        std::fs::write(self.path().join(name), body).unwrap();
        self
    }

    fn config(&self, document: Value) -> &Self {
        std::fs::write(self.config_path(), document.to_string()).unwrap();
        self
    }

    fn raw_config(&self, content: &str) -> &Self {
        std::fs::write(self.config_path(), content).unwrap();
        self
    }

    fn store(&self) -> Arc<ConfigStore> {
        Arc::new(ConfigStore::open(self.config_path()).unwrap())
    }

    /// The usual fixture: a greeting, a sleeper, and a script whose file is missing
    fn standard() -> Self {
        let project = Self::new();
        project
            .script("hello.sh", "echo 'Hello from MCP Script Runner!'\n")
            .script("slow.sh", "sleep 5\necho finished\n")
            .config(json!({
                "working_directory": ".",
                "scripts": {
                    "hello": {
                        "path": "hello.sh",
                        "description": "Say hello",
                        "interpreter": "sh"
                    },
                    "slow": {
                        "path": "slow.sh",
                        "description": "Sleeps past its timeout",
                        "timeout": 1,
                        "interpreter": "sh"
                    },
                    "ghost": {
                        "path": "does-not-exist.sh",
                        "description": "Points at nothing"
                    }
                }
            }));
        project
    }
}

struct TestClient {
    writer: DuplexStream,
    lines: Lines<BufReader<DuplexStream>>,
    server: JoinHandle<anyhow::Result<()>>,
    next_id: i64,
}

impl TestClient {
    fn connect(store: Arc<ConfigStore>) -> Self {
        let (writer, server_reader) = tokio::io::duplex(64 * 1024);
        let (server_writer, reader) = tokio::io::duplex(64 * 1024);

        let dispatcher = Arc::new(ScriptRunnerServer::new(store));
        let server = tokio::spawn(async move {
            let mut session = Session::new(dispatcher);
            serve_stream(&mut session, server_reader, server_writer).await
        });

        Self {
            writer,
            lines: BufReader::new(reader).lines(),
            server,
            next_id: 0,
        }
    }

    async fn send(&mut self, message: Value) {
        let mut line = message.to_string();
        line.push('\n');
        self.writer.write_all(line.as_bytes()).await.unwrap();
    }

    async fn recv(&mut self) -> Option<Value> {
        let line = tokio::time::timeout(Duration::from_secs(20), self.lines.next_line())
            .await
            .expect("server did not answer in time")
            .unwrap()?;
        Some(serde_json::from_str(&line).unwrap())
    }

    async fn request(&mut self, method: &str, params: Value) -> Value {
        self.next_id += 1;
        let id = self.next_id;
        self.send(json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params}))
            .await;
        let response = self.recv().await.expect("connection closed");
        assert_eq!(response["id"], json!(id));
        response
    }

    async fn notify(&mut self, method: &str) {
        self.send(json!({"jsonrpc": "2.0", "method": method})).await;
    }

    async fn initialize(&mut self, version: &str) -> Value {
        self.request(
            "initialize",
            json!({
                "protocolVersion": version,
                "capabilities": {},
                "clientInfo": {"name": "test-client", "version": "0.0.1"}
            }),
        )
        .await
    }

    async fn handshake(&mut self) {
        let response = self.initialize("2025-06-18").await;
        assert!(response.get("error").is_none(), "{}", response);
        self.notify("notifications/initialized").await;
    }

    async fn call(&mut self, tool: &str, arguments: Value) -> Value {
        self.request("tools/call", json!({"name": tool, "arguments": arguments}))
            .await
    }

    /// Call a tool and decode the JSON payload of its text content
    async fn call_ok(&mut self, tool: &str, arguments: Value) -> Value {
        let response = self.call(tool, arguments).await;
        assert!(response.get("error").is_none(), "{}", response);
        tool_payload(&response)
    }
}

fn tool_payload(response: &Value) -> Value {
    let text = response["result"]["content"][0]["text"]
        .as_str()
        .expect("text content");
    serde_json::from_str(text).unwrap()
}

fn error_kind(response: &Value) -> &str {
    response["error"]["data"]["kind"].as_str().unwrap_or_default()
}

fn script_names(list: &Value) -> Vec<String> {
    list["scripts"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["name"].as_str().unwrap().to_string())
        .collect()
}

// ============================================================================
// Handshake
// ============================================================================

#[tokio::test]
async fn tool_call_before_handshake_is_invalid_session_state() {
    let project = Project::standard();
    let mut client = TestClient::connect(project.store());

    let response = client.call("run_script", json!({"script_name": "hello"})).await;
    assert_eq!(response["error"]["code"], json!(-32600));
    assert_eq!(error_kind(&response), "InvalidSessionState");
    assert_eq!(response["error"]["data"]["phase"], json!("uninitialized"));

    let response = client.initialize("2025-06-18").await;
    assert_eq!(response["result"]["protocolVersion"], json!("2025-06-18"));
    assert_eq!(response["result"]["serverInfo"]["name"], json!("script-runner-mcp"));
    assert!(response["result"]["capabilities"].get("tools").is_some());

    // Still waiting for notifications/initialized
    let response = client.request("tools/list", json!({})).await;
    assert_eq!(error_kind(&response), "InvalidSessionState");
    assert_eq!(response["error"]["data"]["phase"], json!("initializing"));

    client.notify("notifications/initialized").await;
    let response = client.request("tools/list", json!({})).await;
    let tools = response["result"]["tools"].as_array().unwrap();
    assert_eq!(tools.len(), 6);
    assert!(tools.iter().all(|t| t["inputSchema"].is_object()));
}

#[tokio::test]
async fn unsupported_version_closes_the_session() {
    let project = Project::standard();
    let mut client = TestClient::connect(project.store());

    let response = client.initialize("1999-01-01").await;
    assert_eq!(response["error"]["code"], json!(-32602));
    assert_eq!(error_kind(&response), "VersionMismatch");
    assert!(response["error"]["data"]["supported"]
        .as_array()
        .unwrap()
        .contains(&json!("2024-11-05")));

    assert!(client.recv().await.is_none());
    client.server.await.unwrap().unwrap();
}

#[tokio::test]
async fn malformed_line_gets_parse_error_and_session_continues() {
    let project = Project::standard();
    let mut client = TestClient::connect(project.store());

    client.writer.write_all(b"{this is not json\n\n").await.unwrap();
    let response = client.recv().await.unwrap();
    assert_eq!(response["id"], Value::Null);
    assert_eq!(response["error"]["code"], json!(-32700));

    let response = client.request("ping", json!({})).await;
    assert_eq!(response["result"], json!({}));
}

// ============================================================================
// Tools
// ============================================================================

#[tokio::test]
async fn hello_script_runs() {
    let project = Project::standard();
    let mut client = TestClient::connect(project.store());
    client.handshake().await;

    let result = client
        .call_ok("run_script", json!({"script_name": "hello", "arguments": []}))
        .await;

    assert_eq!(result["exit_code"], json!(0));
    assert_eq!(result["success"], json!(true));
    assert_eq!(result["timed_out"], json!(false));
    assert!(result["stdout"]
        .as_str()
        .unwrap()
        .contains("Hello from MCP Script Runner!"));
}

#[tokio::test]
async fn missing_script_file_is_an_execution_failure() {
    let project = Project::standard();
    let mut client = TestClient::connect(project.store());
    client.handshake().await;

    let result = client.call_ok("run_script", json!({"script_name": "ghost"})).await;

    assert_eq!(result["exit_code"], json!(-1));
    assert_eq!(result["success"], json!(false));
    assert!(result["stderr"].as_str().unwrap().contains("does-not-exist.sh"));
}

#[tokio::test]
async fn slow_script_times_out() {
    let project = Project::standard();
    let mut client = TestClient::connect(project.store());
    client.handshake().await;

    let result = client.call_ok("run_script", json!({"script_name": "slow"})).await;

    assert_eq!(result["timed_out"], json!(true));
    assert_eq!(result["exit_code"], json!(-1));
    assert_eq!(result["success"], json!(false));
    assert!(!result["stdout"].as_str().unwrap().contains("finished"));
    assert!(result["duration_millis"].as_u64().unwrap() < 5000);
}

#[tokio::test]
async fn unknown_script_is_script_not_found() {
    let project = Project::standard();
    let mut client = TestClient::connect(project.store());
    client.handshake().await;

    let response = client.call("get_script_info", json!({"script_name": "nope"})).await;
    assert_eq!(response["error"]["code"], json!(-32002));
    assert_eq!(error_kind(&response), "ScriptNotFound");
    assert_eq!(response["error"]["data"]["script_name"], json!("nope"));

    let response = client.call("run_script", json!({"script_name": "nope"})).await;
    assert_eq!(error_kind(&response), "ScriptNotFound");
}

#[tokio::test]
async fn script_info_and_listing_follow_document_order() {
    let project = Project::standard();
    let mut client = TestClient::connect(project.store());
    client.handshake().await;

    let list = client.call_ok("list_scripts", json!({})).await;
    assert_eq!(list["count"], json!(3));
    assert_eq!(script_names(&list), vec!["hello", "slow", "ghost"]);

    let info = client.call_ok("get_script_info", json!({"script_name": "slow"})).await;
    assert_eq!(info["timeout_seconds"], json!(1));
    assert_eq!(info["interpreter"], json!("sh"));
}

#[tokio::test]
async fn invalid_reload_keeps_previous_scripts() {
    let project = Project::standard();
    let mut client = TestClient::connect(project.store());
    client.handshake().await;

    let before = client.call_ok("list_scripts", json!({})).await;

    project.raw_config("{ \"scripts\": { broken");
    let response = client.call("reload_config", json!({})).await;
    assert_eq!(response["error"]["code"], json!(-32603));
    assert_eq!(error_kind(&response), "ConfigError");

    let after = client.call_ok("list_scripts", json!({})).await;
    assert_eq!(before, after);
}

#[tokio::test]
async fn reload_picks_up_new_scripts() {
    let project = Project::standard();
    let mut client = TestClient::connect(project.store());
    client.handshake().await;

    project.script("bye.sh", "echo bye\n").config(json!({
        "scripts": {"bye": {"path": "bye.sh", "interpreter": "sh"}}
    }));

    let reloaded = client.call_ok("reload_config", json!({})).await;
    assert_eq!(reloaded["script_count"], json!(1));

    let list = client.call_ok("list_scripts", json!({})).await;
    assert_eq!(script_names(&list), vec!["bye"]);
}

#[tokio::test]
async fn bad_working_directory_is_path_error() {
    let project = Project::standard();
    let mut client = TestClient::connect(project.store());
    client.handshake().await;

    let before = client.call_ok("get_working_directory", json!({})).await;

    let response = client
        .call("set_working_directory", json!({"path": "/nonexistent"}))
        .await;
    assert_eq!(response["error"]["code"], json!(-32602));
    assert_eq!(error_kind(&response), "PathError");

    let after = client.call_ok("get_working_directory", json!({})).await;
    assert_eq!(before["working_directory"], after["working_directory"]);
}

#[tokio::test]
async fn working_directory_change_moves_script_runs() {
    let project = Project::new();
    std::fs::create_dir(project.path().join("other")).unwrap();
    project
        .script("where.sh", "echo root\n")
        .script("other/where.sh", "echo other\n")
        .config(json!({
            "scripts": {"where": {"path": "where.sh", "interpreter": "sh"}}
        }));

    let mut client = TestClient::connect(project.store());
    client.handshake().await;

    let changed = client
        .call_ok("set_working_directory", json!({"path": "other"}))
        .await;
    let expected = project.path().join("other").canonicalize().unwrap();
    assert_eq!(changed["working_directory"], json!(expected));

    let result = client.call_ok("run_script", json!({"script_name": "where"})).await;
    assert_eq!(result["stdout"].as_str().unwrap().trim(), "other");
}

#[tokio::test]
async fn missing_arguments_are_invalid_params() {
    let project = Project::standard();
    let mut client = TestClient::connect(project.store());
    client.handshake().await;

    let response = client.call("get_script_info", json!({})).await;
    assert_eq!(response["error"]["code"], json!(-32602));

    let response = client.call("delete_everything", json!({})).await;
    assert_eq!(response["error"]["code"], json!(-32602));
    assert!(response["error"]["message"]
        .as_str()
        .unwrap()
        .contains("delete_everything"));
}

// ============================================================================
// Snapshot isolation
// ============================================================================

#[tokio::test]
async fn in_flight_run_keeps_its_definition_across_reload() {
    let project = Project::new();
    project
        .script("one.sh", "sleep 1\necho one\n")
        .script("two.sh", "echo two\n")
        .config(json!({
            "scripts": {"job": {"path": "one.sh", "interpreter": "sh"}}
        }));
    let store = project.store();

    let in_flight = {
        let store = Arc::clone(&store);
        tokio::spawn(async move {
            handlers::run_script(
                &store,
                RunScriptParams {
                    script_name: "job".into(),
                    arguments: vec![],
                },
            )
            .await
        })
    };

    tokio::time::sleep(Duration::from_millis(200)).await;
    project.config(json!({
        "scripts": {"job": {"path": "two.sh", "interpreter": "sh"}}
    }));
    store.reload().await.unwrap();

    let first = serde_json::to_value(in_flight.await.unwrap().unwrap()).unwrap();
    let first: Value = serde_json::from_str(first["content"][0]["text"].as_str().unwrap()).unwrap();
    assert_eq!(first["stdout"].as_str().unwrap().trim(), "one");

    let mut client = TestClient::connect(store);
    client.handshake().await;
    let second = client.call_ok("run_script", json!({"script_name": "job"})).await;
    assert_eq!(second["stdout"].as_str().unwrap().trim(), "two");
}
