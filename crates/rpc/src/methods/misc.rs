//! `opal/config/get`, `opal/config/set`, `opal/ping`, `opal/version`
//!.

use serde_json::{json, Value};

use crate::dispatch::RpcContext;
use crate::protocol::JsonRpcError;
use crate::state::DistributionInfo;

pub async fn config_get(ctx: &RpcContext, _params: Value) -> Result<Value, JsonRpcError> {
    let mut value = serde_json::to_value(ctx.runtime.config.as_ref()).map_err(|e| JsonRpcError::internal(e.to_string()))?;
    if let Value::Object(ref mut map) = value {
        map.insert("distribution".to_string(), ctx.state.distribution().map(|d| json!(d)).unwrap_or(Value::Null));
    }
    Ok(value)
}

/// `opal/config/set` currently only recognizes the `distribution` field
///; other config sections are loaded once at startup from the
/// config file and are not mutable over RPC.
pub async fn config_set(ctx: &RpcContext, params: Value) -> Result<Value, JsonRpcError> {
    if let Some(dist) = params.get("distribution") {
        if dist.is_null() {
            ctx.state.set_distribution(None);
        } else {
            let info: DistributionInfo = serde_json::from_value(dist.clone())
                .map_err(|e| JsonRpcError::invalid_params(format!("invalid distribution: {e}")))?;
            ctx.state.set_distribution(Some(info));
        }
    }
    Ok(json!({"distribution": ctx.state.distribution()}))
}

pub async fn ping(_ctx: &RpcContext, _params: Value) -> Result<Value, JsonRpcError> {
    Ok(json!({"pong": true}))
}

pub async fn version(_ctx: &RpcContext, _params: Value) -> Result<Value, JsonRpcError> {
    Ok(json!({
        "name": "opal",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
