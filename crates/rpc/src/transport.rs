//! Newline-delimited JSON-RPC 2.0 over stdio.
//!
//! Grounded on `opal-mcp::transport::StdioTransport`, role-reversed: that
//! transport spawns a child process and owns both ends of the pipe; this
//! one reads the *current process's* stdin and writes its stdout — there
//! is no child to spawn, the "child" is whatever connected the process's
//! own standard streams (an editor extension, a wrapper CLI, a pty).
//! Stdin EOF ends the read loop, which is this transport's definition of
//! "the client disconnected".

use std::sync::Arc;

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Stdin, Stdout};
use tokio::sync::{mpsc, oneshot, Mutex};

use crate::protocol::{Incoming, JsonRpcClientRequest, RawIncoming, RequestId};

/// Owns stdout and serializes writes to it so two concurrently-dispatched
/// requests' responses, or an interleaved `agent/event` notification,
/// never interleave their bytes on the wire.
pub struct StdioWriter {
    out: Mutex<Stdout>,
}

impl StdioWriter {
    pub fn new(out: Stdout) -> Self {
        Self { out: Mutex::new(out) }
    }

    pub async fn write_line(&self, value: &Value) -> std::io::Result<()> {
        let mut line = serde_json::to_vec(value)?;
        line.push(b'\n');
        let mut out = self.out.lock().await;
        out.write_all(&line).await?;
        out.flush().await
    }
}

/// Reads stdin line by line and classifies each as a [`Incoming`] request
/// or notification. Lines that fail to parse at all are reported as a
/// raw parse error so the dispatch loop can answer `-32700` — but since a
/// parse failure has no `id` to respond against, the caller logs and
/// drops it rather than trying to synthesize one (matching JSON-RPC's
/// own ambiguity here: a response to an unparseable request has nothing
/// to correlate against).
pub struct StdioReader {
    lines: tokio::io::Lines<BufReader<Stdin>>,
}

impl StdioReader {
    pub fn new(stdin: Stdin) -> Self {
        Self { lines: BufReader::new(stdin).lines() }
    }

    /// Returns `Ok(None)` on clean EOF. On each non-empty line, returns
    /// `Ok(Some(Ok(incoming)))` if it parses as a request/notification, or
    /// `Ok(Some(Err(raw_line)))` with the *original* line text if it
    /// doesn't — callers try that text again as a [`RawClientResponse`]
    /// (a reply to one of our own server→client requests) before
    /// concluding it's genuinely malformed.
    pub async fn next(&mut self) -> std::io::Result<Option<Result<Incoming, String>>> {
        loop {
            let Some(line) = self.lines.next_line().await? else {
                return Ok(None);
            };
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            return Ok(Some(match serde_json::from_str::<RawIncoming>(trimmed) {
                Ok(raw) => Ok(Incoming::from(raw)),
                Err(_) => Err(trimmed.to_string()),
            }));
        }
    }
}

/// Tracks in-flight server→client requests:
/// each gets an `s2c-`-prefixed id and a oneshot the read loop resolves
/// when the matching response line arrives.
#[derive(Default)]
pub struct PendingClientRequests {
    pending: Mutex<std::collections::HashMap<String, oneshot::Sender<Result<Value, crate::protocol::JsonRpcError>>>>,
}

impl PendingClientRequests {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a request id and get back the receiver half to await.
    pub async fn register(&self, id: String) -> oneshot::Receiver<Result<Value, crate::protocol::JsonRpcError>> {
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);
        rx
    }

    /// Resolve a pending request by id with the client's response,
    /// dropping it from the table. No-op if the id is unknown (a late or
    /// duplicate reply) or the waiter already gave up.
    pub async fn resolve(&self, id: &str, result: Result<Value, crate::protocol::JsonRpcError>) {
        if let Some(tx) = self.pending.lock().await.remove(id) {
            let _ = tx.send(result);
        }
    }

    pub async fn cancel_all(&self) {
        let mut pending = self.pending.lock().await;
        for (_, tx) in pending.drain() {
            let _ = tx.send(Err(crate::protocol::JsonRpcError::internal("client disconnected")));
        }
    }
}

/// Send a server→client request and block for its reply.
/// Used by `ClientRequester`/`client/confirm`/`client/input` callers —
/// this is the one operation in the whole server that can block
/// arbitrarily long.
pub async fn send_client_request(
    writer: &StdioWriter,
    pending: &PendingClientRequests,
    method: &'static str,
    params: Value,
) -> Result<Value, crate::protocol::JsonRpcError> {
    let id = crate::protocol::next_s2c_id();
    let rx = pending.register(id.clone()).await;
    let req = JsonRpcClientRequest { jsonrpc: "2.0", id: id.clone(), method, params };
    if let Err(e) = writer.write_line(&serde_json::to_value(&req).unwrap()).await {
        return Err(crate::protocol::JsonRpcError::internal(format!("failed to write client request: {e}")));
    }
    match rx.await {
        Ok(result) => result,
        Err(_) => Err(crate::protocol::JsonRpcError::internal("client request cancelled")),
    }
}

/// The "is this id one of ours" check the read loop uses to route a
/// response line to [`PendingClientRequests::resolve`] instead of
/// treating it as a malformed request.
pub fn is_s2c_id(id: &RequestId) -> bool {
    matches!(id, RequestId::String(s) if s.starts_with("s2c-"))
}

pub type SharedWriter = Arc<StdioWriter>;
pub type SharedPending = Arc<PendingClientRequests>;

/// A response line the client sent back for one of our own server→client
/// requests. Distinct from [`RawIncoming`] because it carries `result`/
/// `error` instead of `method`/`params`.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct RawClientResponse {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<crate::protocol::JsonRpcError>,
}

/// Channel pair the dispatch loop hands out to background turn/event
/// plumbing that needs to push a notification line without going through
/// the request/response path.
pub fn notification_channel() -> (mpsc::UnboundedSender<Value>, mpsc::UnboundedReceiver<Value>) {
    mpsc::unbounded_channel()
}
