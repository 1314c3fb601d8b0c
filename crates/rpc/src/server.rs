//! Ties the stdio transport, the declarative dispatch table, and
//! `opal-agent`'s [`AgentRuntime`] together into the running server.
//!
//! Grounded on `mcp-client/src/manager.rs`'s connect→read-loop→dispatch
//! shape, role-reversed (there the crate drives a child's stdio as a
//! client; here it owns its own stdio as a server) and generalized from a
//! single long-lived request/response pairing into the full bidirectional
//! picture  describes: client requests, client notifications,
//! server-initiated requests, and the `agent/event` forwarding loop.

use std::sync::Arc;

use serde_json::{json, Value};

use opal_domain::event::AgentEvent;

use crate::dispatch::{self, RpcContext};
use crate::protocol::{Incoming, JsonRpcError, JsonRpcNotification, JsonRpcResponse, RequestId};
use crate::state::ServerState;
use crate::transport::{is_s2c_id, PendingClientRequests, RawClientResponse, StdioReader, StdioWriter};

pub struct RpcServer {
    ctx: RpcContext,
}

impl RpcServer {
    pub fn new(runtime: Arc<opal_agent::AgentRuntime>, state: Arc<ServerState>, writer: Arc<StdioWriter>, pending: Arc<PendingClientRequests>) -> Self {
        Self { ctx: RpcContext { runtime, state, writer, pending } }
    }

    /// Run the read loop to completion. Returns the process exit code
    ///.
    pub async fn run(self) -> i32 {
        let mut reader = StdioReader::new(tokio::io::stdin());
        loop {
            let line = match reader.next().await {
                Ok(Some(line)) => line,
                Ok(None) => {
                    tracing::info!("stdin closed, shutting down");
                    self.ctx.pending.cancel_all().await;
                    return 0;
                }
                Err(e) => {
                    tracing::error!(error = %e, "stdin read error");
                    return 1;
                }
            };

            match line {
                Ok(Incoming::Request { id, method, params }) => {
                    self.handle_request(id, method, params).await;
                }
                Ok(Incoming::Notification { method, params }) => {
                    self.handle_notification(method, params).await;
                }
                Err(raw) => {
                    self.handle_unparsed_line(&raw).await;
                }
            }
        }
    }

    async fn handle_request(&self, id: RequestId, method: String, params: Option<Value>) {
        let ctx = self.ctx.clone();
        tokio::spawn(async move {
            let response = match dispatch::dispatch(&ctx, &method, params).await {
                Ok(result) => JsonRpcResponse::ok(id, result),
                Err(e) => JsonRpcResponse::err(id, e),
            };
            if let Ok(value) = serde_json::to_value(&response) {
                if let Err(e) = ctx.writer.write_line(&value).await {
                    tracing::error!(error = %e, "failed to write response");
                }
            }
        });
    }

    /// Notifications carry no `id`; a client sending one expects no
    /// response at all. Dispatched the same way,
    /// but any error is logged rather than returned anywhere.
    async fn handle_notification(&self, method: String, params: Option<Value>) {
        let ctx = self.ctx.clone();
        tokio::spawn(async move {
            if let Err(e) = dispatch::dispatch(&ctx, &method, params).await {
                tracing::warn!(method = %method, error = %e.message, "notification handling failed");
            }
        });
    }

    /// A line that didn't parse as `RawIncoming` (no `method` field) is
    /// either a reply to one of our own server→client requests, or
    /// genuinely malformed.
    async fn handle_unparsed_line(&self, raw: &str) {
        if let Ok(resp) = serde_json::from_str::<RawClientResponse>(raw) {
            if let Some(id_value) = &resp.id {
                if let Some(id_str) = id_value.as_str() {
                    if is_s2c_id(&RequestId::String(id_str.to_string())) {
                        let outcome = match resp.error {
                            Some(e) => Err(e),
                            None => Ok(resp.result.unwrap_or(Value::Null)),
                        };
                        self.ctx.pending.resolve(id_str, outcome).await;
                        return;
                    }
                }
            }
        }
        tracing::warn!(line = %raw, "received unparseable JSON-RPC line");
    }
}

/// Subscribe to a session's event bus and forward every [`AgentEvent`] as
/// an `agent/event` notification until the channel closes (the session's
/// `close_session` dropping the bus, or a broadcast lag). Spawned exactly
/// once per session, guarded by [`ServerState::mark_subscribed`].
pub fn spawn_event_forwarder(ctx: RpcContext, session_id: String) {
    let mut rx = ctx.runtime.bus.subscribe(&session_id);
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => forward_event(&ctx, &session_id, event).await,
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(session_id = %session_id, skipped, "event forwarder lagged, dropped events");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}

async fn forward_event(ctx: &RpcContext, session_id: &str, event: AgentEvent) {
    let Ok(mut params) = serde_json::to_value(&event) else { return };
    if let Value::Object(ref mut map) = params {
        map.insert("session_id".to_string(), json!(session_id));
    }
    let notification = JsonRpcNotification::new("agent/event", params);
    if let Ok(value) = serde_json::to_value(&notification) {
        if let Err(e) = ctx.writer.write_line(&value).await {
            tracing::error!(session_id = %session_id, error = %e, "failed to forward event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::JsonRpcError as Err2;

    #[test]
    fn error_codes_match_jsonrpc_table() {
        assert_eq!(JsonRpcError::parse_error("x").code, crate::protocol::PARSE_ERROR);
        assert_eq!(JsonRpcError::method_not_found("x").code, crate::protocol::METHOD_NOT_FOUND);
        assert_eq!(Err2::invalid_params("x").code, crate::protocol::INVALID_PARAMS);
        assert_eq!(Err2::internal("x").code, crate::protocol::INTERNAL_ERROR);
    }
}
