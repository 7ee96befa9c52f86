//! JSON-RPC 2.0 wire types and the domain-error-to-wire-code mapping
//! (`ToolNotFound` ⇒ -32000 class, `InvalidParams` ⇒ -32602,
//! `InternalError` ⇒ -32603, `MethodNotFound` ⇒ -32601, parse errors
//! ⇒ -32700).

use automatosx_types::{Error, ErrorKind};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[derive(Debug, Deserialize)]
pub struct JsonRpcRequest {
    #[allow(dead_code)]
    pub jsonrpc: String,
    pub id: Option<Value>,
    pub method: String,
    pub params: Option<Value>,
}

#[derive(Debug, Serialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    pub fn success(id: Value, result: Value) -> Self {
        Self { jsonrpc: "2.0".to_string(), id, result: Some(result), error: None }
    }

    pub fn failure(id: Value, error: JsonRpcError) -> Self {
        Self { jsonrpc: "2.0".to_string(), id, result: None, error: Some(error) }
    }
}

#[derive(Debug, Serialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcError {
    pub fn parse_error(detail: impl std::fmt::Display) -> Self {
        Self { code: -32700, message: format!("Parse error: {detail}"), data: None }
    }

    pub fn method_not_found(method: &str) -> Self {
        Self { code: -32601, message: format!("Method not found: {method}"), data: None }
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self { code: -32602, message: message.into(), data: None }
    }

    pub fn uninitialized() -> Self {
        Self {
            code: -32603,
            message: "server has not completed initialize".to_string(),
            data: None,
        }
    }
}

/// Maps a core [`Error`] to a protocol-level JSON-RPC error, used for
/// failures in dispatch itself (bad `tools/call` shape, unknown
/// method/tool) rather than for a tool's own domain-level failure,
/// which is instead reported as a successful response with
/// `result.isError = true` so a
/// client can distinguish "the RPC call was malformed" from "the tool
/// ran and reported a business error".
pub fn to_protocol_error(err: &Error) -> JsonRpcError {
    let code = match err.kind() {
        ErrorKind::ToolNotFound => -32000,
        ErrorKind::MethodNotFound => -32601,
        ErrorKind::InvalidParams => -32602,
        ErrorKind::ParseError => -32700,
        _ => -32603,
    };
    JsonRpcError {
        code,
        message: err.message.clone(),
        data: if err.context.is_empty() { None } else { Some(Value::Object(err.context.clone())) },
    }
}

/// Wraps a tool's successful output as `{content:[{type:"text",...}]}`.
pub fn tool_success(value: &Value) -> Value {
    json!({
        "content": [
            {
                "type": "text",
                "text": serde_json::to_string(value).unwrap_or_else(|_| value.to_string()),
            }
        ]
    })
}

/// Wraps a tool's domain-level failure as an `isError` result rather
/// than a JSON-RPC protocol error.
pub fn tool_error(err: &Error) -> Value {
    json!({
        "content": [
            {
                "type": "text",
                "text": err.message,
            }
        ],
        "isError": true,
    })
}
