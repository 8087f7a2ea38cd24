use crate::{config::NetworkMode, toolkit::Toolkit};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt as _, AsyncWrite, BufReader};
use tracing::{info, warn};

mod jsonrpc;
mod state;
mod tools;
mod transport;

pub use jsonrpc::{err, ok, tool_err, JsonRpcResponse};
pub use state::ServerState;
pub use tools::{handle_tools_call, list_tools_result};

use jsonrpc::{JsonRpcRequest, INVALID_REQUEST, METHOD_NOT_FOUND};

/// Lines longer than this end the session.
pub const MAX_JSONRPC_LINE_BYTES: usize = 1024 * 1024;

pub const PROTOCOL_VERSION: &str = "2025-06-18";

#[derive(Debug, Deserialize)]
struct JsonRpcNotification {
    jsonrpc: String,
}

fn handle_initialize(req_id: Value, params: &Value, state: &mut ServerState) -> JsonRpcResponse {
    if let Some(m) = params
        .get("cawallet_network_override")
        .and_then(Value::as_str)
        .and_then(NetworkMode::parse)
    {
        state.network_override = Some(m);
    }
    ok(
        req_id,
        json!({
          "protocolVersion": PROTOCOL_VERSION,
          "serverInfo": { "name": "cawallet", "version": env!("CARGO_PKG_VERSION") },
          "capabilities": { "tools": {} }
        }),
    )
}

pub async fn run(network_override: Option<NetworkMode>) -> eyre::Result<()> {
    let toolkit = Toolkit::open()?;
    let state = ServerState::new(toolkit, network_override);
    info!(network = %state.effective_network(), "mcp server starting");
    serve(
        BufReader::new(tokio::io::stdin()),
        &mut tokio::io::stdout(),
        state,
    )
    .await
}

/// Serve line-delimited JSON-RPC until the reader closes.
pub async fn serve<R, W>(reader: R, out: &mut W, mut state: ServerState) -> eyre::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send,
{
    let mut lines = reader.lines();
    while let Some(line) = lines.next_line().await? {
        if line.len() > MAX_JSONRPC_LINE_BYTES {
            warn!(len = line.len(), "jsonrpc line too long; closing");
            break;
        }
        if line.trim().is_empty() {
            continue;
        }
        let v: Value = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "invalid json on stdin");
                continue;
            }
        };

        // Notifications carry no id and get no reply.
        if v.get("id").is_none() {
            if let Ok(note) = serde_json::from_value::<JsonRpcNotification>(v.clone()) {
                if note.jsonrpc == "2.0" {
                    continue;
                }
            }
        }

        let req: JsonRpcRequest = match serde_json::from_value(v) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(error = %e, "failed to parse jsonrpc request");
                continue;
            }
        };

        if req.jsonrpc != "2.0" {
            transport::write_frame(out, &err(req.id, INVALID_REQUEST, "invalid jsonrpc version"))
                .await?;
            continue;
        }

        let resp = match req.method.as_str() {
            "initialize" => handle_initialize(req.id, &req.params, &mut state),
            "ping" => ok(req.id, json!({})),
            "tools/list" => ok(req.id, list_tools_result()),
            "tools/call" => {
                let name = req
                    .params
                    .get("name")
                    .and_then(Value::as_str)
                    .unwrap_or("");
                let args = req.params.get("arguments").cloned().unwrap_or(Value::Null);
                handle_tools_call(req.id, name, args, &mut state).await
            }
            _ => err(req.id, METHOD_NOT_FOUND, "method not found"),
        };

        transport::write_frame(out, &resp).await?;
    }

    Ok(())
}
