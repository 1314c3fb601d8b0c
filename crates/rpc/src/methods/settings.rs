//! `settings/get`, `settings/save`.

use serde_json::Value;

use crate::dispatch::RpcContext;
use crate::protocol::JsonRpcError;

pub async fn get(ctx: &RpcContext, _params: Value) -> Result<Value, JsonRpcError> {
    Ok(ctx.state.settings_get())
}

pub async fn save(ctx: &RpcContext, params: Value) -> Result<Value, JsonRpcError> {
    let settings = params
        .get("settings")
        .cloned()
        .ok_or_else(|| JsonRpcError::invalid_params("missing settings"))?;
    ctx.state.settings_save(settings.clone());
    Ok(settings)
}
