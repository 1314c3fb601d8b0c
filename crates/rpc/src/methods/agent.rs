//! `agent/prompt`, `agent/abort`, `agent/state`.

use serde_json::{json, Value};

use opal_agent::PromptOutcome;

use crate::dispatch::RpcContext;
use crate::protocol::JsonRpcError;

fn session_id(params: &Value) -> Result<String, JsonRpcError> {
    params
        .get("session_id")
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .ok_or_else(|| JsonRpcError::invalid_params("missing session_id"))
}

/// `agent/prompt` result: `{queued: boolean}`.
pub async fn prompt(ctx: &RpcContext, params: Value) -> Result<Value, JsonRpcError> {
    let session_id = session_id(&params)?;
    let text = params
        .get("text")
        .and_then(|v| v.as_str())
        .ok_or_else(|| JsonRpcError::invalid_params("missing text"))?
        .to_string();

    ctx.state.push_history(text.clone());

    let outcome = ctx
        .runtime
        .prompt(&session_id, text)
        .map_err(|e| JsonRpcError::invalid_params(format!("session not found: {e}")))?;

    Ok(json!({"queued": matches!(outcome, PromptOutcome::Queued)}))
}

pub async fn abort(ctx: &RpcContext, params: Value) -> Result<Value, JsonRpcError> {
    let session_id = session_id(&params)?;
    let aborted = ctx.runtime.abort(&session_id);
    Ok(json!({"session_id": session_id, "aborted": aborted}))
}

pub async fn state(ctx: &RpcContext, params: Value) -> Result<Value, JsonRpcError> {
    let session_id = session_id(&params)?;
    let status = ctx
        .runtime
        .status(&session_id)
        .ok_or_else(|| JsonRpcError::invalid_params(format!("session not found: {session_id}")))?;
    Ok(json!({"session_id": session_id, "status": status}))
}
