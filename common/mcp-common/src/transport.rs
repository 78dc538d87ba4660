//! Newline-delimited JSON-RPC transport
//!
//! MCP's stdio framing: one JSON message per line in each direction. Logs
//! must never go to stdout; see [`crate::init_tracing`].

use std::sync::Arc;

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, info, warn};

use crate::dispatch::ToolDispatcher;
use crate::error::parse_error;
use crate::protocol::{JsonRpcRequest, JsonRpcResponse};
use crate::session::Session;

/// Decode one line into a request, or produce the error response to send instead
///
/// Returns `Ok(None)` for frames that need no answer (client responses).
fn decode_line(line: &str) -> Result<Option<JsonRpcRequest>, JsonRpcResponse> {
    let value: Value = serde_json::from_str(line).map_err(|e| {
        JsonRpcResponse::failure(Value::Null, parse_error(format!("Parse error: {}", e)))
    })?;

    if value.get("method").is_none() {
        if value.get("result").is_some() || value.get("error").is_some() {
            debug!("Ignoring response frame from client");
            return Ok(None);
        }
        let id = value.get("id").cloned().unwrap_or(Value::Null);
        return Err(JsonRpcResponse::failure(
            id,
            rmcp::ErrorData::invalid_request("Missing 'method' field".to_string(), None),
        ));
    }

    let id = value.get("id").cloned().unwrap_or(Value::Null);
    serde_json::from_value(value).map(Some).map_err(|e| {
        JsonRpcResponse::failure(
            id,
            rmcp::ErrorData::invalid_request(format!("Invalid request: {}", e), None),
        )
    })
}

async fn write_message<W: AsyncWrite + Unpin>(
    writer: &mut W,
    response: &JsonRpcResponse,
) -> anyhow::Result<()> {
    let json = serde_json::to_string(response)?;
    writer.write_all(json.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;
    Ok(())
}

/// Drive a session over any duplex byte stream until EOF or a fatal handshake error
///
/// Requests are handled strictly one at a time, in arrival order.
pub async fn serve_stream<D, R, W>(
    session: &mut Session<D>,
    reader: R,
    mut writer: W,
) -> anyhow::Result<()>
where
    D: ToolDispatcher,
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let response = match decode_line(line) {
            Ok(Some(request)) => session.handle(request).await,
            Ok(None) => None,
            Err(response) => {
                warn!("Rejected malformed frame");
                Some(response)
            }
        };

        if let Some(response) = response {
            write_message(&mut writer, &response).await?;
        }

        if session.is_closed() {
            info!("Session closed after fatal handshake error");
            break;
        }
    }

    debug!("Transport reached end of input");
    Ok(())
}

/// Serve a dispatcher over the process's stdin/stdout
pub async fn serve_stdio<D: ToolDispatcher>(dispatcher: Arc<D>) -> anyhow::Result<()> {
    let mut session = Session::new(dispatcher);
    serve_stream(&mut session, tokio::io::stdin(), tokio::io::stdout()).await
}
