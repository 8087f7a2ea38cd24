use crate::errors::ToolError;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub const INVALID_REQUEST: i64 = -32600;
pub const METHOD_NOT_FOUND: i64 = -32601;

#[derive(Debug, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: Value,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

pub fn ok(id: Value, result: Value) -> JsonRpcResponse {
    JsonRpcResponse {
        jsonrpc: "2.0".into(),
        id,
        result: Some(result),
        error: None,
    }
}

pub fn err(id: Value, code: i64, message: impl Into<String>) -> JsonRpcResponse {
    JsonRpcResponse {
        jsonrpc: "2.0".into(),
        id,
        result: None,
        error: Some(JsonRpcError {
            code,
            message: message.into(),
        }),
    }
}

/// A successful tool call: the payload as JSON text content.
pub fn tool_ok<T: Serialize>(payload: &T) -> eyre::Result<Value> {
    let text = serde_json::to_string(payload)?;
    Ok(json!({
      "content": [{ "type": "text", "text": text }],
      "isError": false
    }))
}

/// A failed tool call. Tool failures are results, not JSON-RPC errors, so the agent sees
/// the structured `{code, message}`.
pub fn tool_err(tool_error: &ToolError) -> Value {
    let text = serde_json::to_string(tool_error).unwrap_or_else(|_e| {
        "{\"code\":\"internal_error\",\"message\":\"failed to serialize error\"}".into()
    });
    json!({
      "content": [{ "type": "text", "text": text }],
      "isError": true
    })
}
