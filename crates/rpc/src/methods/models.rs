//! `models/list`, `model/set`, `thinking/set`.

use serde_json::{json, Value};

use crate::dispatch::RpcContext;
use crate::protocol::JsonRpcError;

pub async fn list(ctx: &RpcContext, _params: Value) -> Result<Value, JsonRpcError> {
    let models: Vec<Value> = ctx
        .runtime
        .providers
        .list()
        .into_iter()
        .map(|(id, caps)| json!({"provider": id, "capabilities": caps}))
        .collect();
    Ok(json!({"models": models}))
}

pub async fn set(ctx: &RpcContext, params: Value) -> Result<Value, JsonRpcError> {
    let session_id = params.get("session_id").and_then(|v| v.as_str()).ok_or_else(|| JsonRpcError::invalid_params("missing session_id"))?;
    let provider = params.get("provider").and_then(|v| v.as_str()).ok_or_else(|| JsonRpcError::invalid_params("missing provider"))?;
    let id = params.get("id").and_then(|v| v.as_str()).ok_or_else(|| JsonRpcError::invalid_params("missing id"))?;

    ctx.runtime
        .set_model(session_id, provider.to_string(), id.to_string())
        .map_err(|e| JsonRpcError::invalid_params(format!("session not found: {e}")))?;

    Ok(json!({"session_id": session_id, "provider": provider, "id": id}))
}

pub async fn set_thinking(ctx: &RpcContext, params: Value) -> Result<Value, JsonRpcError> {
    let session_id = params.get("session_id").and_then(|v| v.as_str()).ok_or_else(|| JsonRpcError::invalid_params("missing session_id"))?;
    let level = params.get("level").and_then(|v| v.as_str()).ok_or_else(|| JsonRpcError::invalid_params("missing level"))?;

    ctx.runtime
        .set_thinking(session_id, level.to_string())
        .map_err(|e| JsonRpcError::invalid_params(format!("session not found: {e}")))?;

    Ok(json!({"session_id": session_id, "level": level}))
}
