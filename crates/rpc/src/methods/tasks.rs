//! `tasks/list`.
//!
//! Scope key is `session:<id>` when a session id is supplied, else the
//! working directory string — the concrete task record
//! schema is left opaque JSON since the `tasks` tool itself is an
//! external-collaborator concern.

use serde_json::{json, Value};

use crate::dispatch::RpcContext;
use crate::protocol::JsonRpcError;

fn scope_key(params: &Value) -> Result<String, JsonRpcError> {
    if let Some(session_id) = params.get("session_id").and_then(|v| v.as_str()) {
        return Ok(format!("session:{session_id}"));
    }
    if let Some(working_dir) = params.get("working_dir").and_then(|v| v.as_str()) {
        return Ok(working_dir.to_string());
    }
    Err(JsonRpcError::invalid_params("tasks/list requires session_id or working_dir"))
}

pub async fn list(ctx: &RpcContext, params: Value) -> Result<Value, JsonRpcError> {
    let scope = scope_key(&params)?;
    let record = ctx.state.tasks_for_scope(&scope);
    Ok(json!({"scope": scope, "counter": record.counter, "tasks": record.tasks}))
}
