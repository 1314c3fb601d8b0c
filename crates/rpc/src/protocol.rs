//! JSON-RPC 2.0 wire types for the stdio transport.
//!
//! Grounded on `opal-mcp`'s `protocol.rs` — same newline-delimited JSON-RPC
//! 2.0 shape — but role-reversed: there the crate is the *client* sending
//! requests to a spawned MCP server; here the crate is the *server*
//! receiving requests from a connected editor/CLI client over its own
//! stdin/stdout. The message types below are therefore a superset: they
//! also cover the *notification* shape (`agent/event`, no `id`) and the
//! server-initiated *client request* shape (`client/ask_user` etc., with
//! the `s2c-` id prefix that bidirectional routing calls for).

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A JSON-RPC request id. Clients may use numbers or strings; we accept
/// both and echo back whichever shape we received — a lenient server is
/// cheaper than rejecting a conforming client over id formatting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Hash)]
#[serde(untagged)]
pub enum RequestId {
    Number(i64),
    String(String),
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestId::Number(n) => write!(f, "{n}"),
            RequestId::String(s) => write!(f, "{s}"),
        }
    }
}

/// A single line of incoming JSON from the client: either a request
/// (carries `id`, expects a response) or a notification (no `id`).
/// `serde`'s untagged matching on an `Option<RequestId>` field doesn't
/// distinguish these cleanly, so incoming lines are parsed generically
/// first (see [`RawIncoming`]) and classified by presence of `id`.
#[derive(Debug, Clone, Deserialize)]
pub struct RawIncoming {
    #[serde(default)]
    pub jsonrpc: Option<String>,
    #[serde(default)]
    pub id: Option<RequestId>,
    pub method: String,
    #[serde(default)]
    pub params: Option<Value>,
}

#[derive(Debug, Clone)]
pub enum Incoming {
    Request { id: RequestId, method: String, params: Option<Value> },
    Notification { method: String, params: Option<Value> },
}

impl From<RawIncoming> for Incoming {
    fn from(raw: RawIncoming) -> Self {
        match raw.id {
            Some(id) => Incoming::Request { id, method: raw.method, params: raw.params },
            None => Incoming::Notification { method: raw.method, params: raw.params },
        }
    }
}

/// A JSON-RPC 2.0 response the server writes for a client request.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: &'static str,
    pub id: RequestId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    pub fn ok(id: RequestId, result: Value) -> Self {
        Self { jsonrpc: "2.0", id, result: Some(result), error: None }
    }

    pub fn err(id: RequestId, error: JsonRpcError) -> Self {
        Self { jsonrpc: "2.0", id, result: None, error: Some(error) }
    }
}

/// A JSON-RPC 2.0 error object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

pub const PARSE_ERROR: i64 = -32700;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;
pub const INTERNAL_ERROR: i64 = -32603;

impl JsonRpcError {
    pub fn parse_error(message: impl Into<String>) -> Self {
        Self { code: PARSE_ERROR, message: message.into(), data: None }
    }
    pub fn method_not_found(method: &str) -> Self {
        Self { code: METHOD_NOT_FOUND, message: format!("method not found: {method}"), data: None }
    }
    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self { code: INVALID_PARAMS, message: message.into(), data: None }
    }
    pub fn internal(message: impl Into<String>) -> Self {
        let message = message.into();
        Self { code: INTERNAL_ERROR, message: message.clone(), data: Some(Value::String(message)) }
    }
}

/// A notification the server writes unprompted.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcNotification {
    pub jsonrpc: &'static str,
    pub method: &'static str,
    pub params: Value,
}

impl JsonRpcNotification {
    pub fn new(method: &'static str, params: Value) -> Self {
        Self { jsonrpc: "2.0", method, params }
    }
}

/// A request the *server* issues to the client. Ids are prefixed `s2c-` so they can never
/// collide with an id the client picked for its own requests.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcClientRequest {
    pub jsonrpc: &'static str,
    pub id: String,
    pub method: &'static str,
    pub params: Value,
}

static NEXT_S2C_ID: std::sync::atomic::AtomicU64 = std::sync::atomic::AtomicU64::new(1);

pub fn next_s2c_id() -> String {
    let n = NEXT_S2C_ID.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
    format!("s2c-{n}")
}
