//! `auth/status`, `auth/login`, `auth/poll`, `auth/set_key`.
//!
//! Per , credential storage and the user-facing auth flow itself
//! are external-collaborator concerns — "only small interfaces required".
//! These handlers implement just enough of the device-code shape for a
//! client to drive a real flow against, without committing to any
//! particular identity provider or persisting secrets anywhere beyond
//! the in-memory [`crate::state::ServerState`].

use serde_json::{json, Value};
use uuid::Uuid;

use crate::dispatch::RpcContext;
use crate::protocol::JsonRpcError;
use crate::state::PollOutcome;

pub async fn status(ctx: &RpcContext, _params: Value) -> Result<Value, JsonRpcError> {
    let (status, provider) = ctx.state.auth_status();
    Ok(json!({"status": status, "provider": provider}))
}

/// Starts a device-code flow.
pub async fn login(ctx: &RpcContext, _params: Value) -> Result<Value, JsonRpcError> {
    let device_code = Uuid::new_v4().to_string();
    let user_code = device_code[..8].to_uppercase();
    let verification_url = "https://opal.example/device".to_string();

    ctx.state.begin_login(device_code.clone(), user_code.clone(), verification_url.clone());

    Ok(json!({
        "device_code": device_code,
        "user_code": user_code,
        "verification_url": verification_url,
    }))
}

pub async fn poll(ctx: &RpcContext, params: Value) -> Result<Value, JsonRpcError> {
    let device_code = params
        .get("device_code")
        .and_then(|v| v.as_str())
        .ok_or_else(|| JsonRpcError::invalid_params("missing device_code"))?;

    match ctx.state.poll_login(device_code) {
        PollOutcome::Pending { user_code, verification_url } => {
            Ok(json!({"status": "pending", "user_code": user_code, "verification_url": verification_url}))
        }
        PollOutcome::Unknown => Ok(json!({"status": "unknown"})),
    }
}

pub async fn set_key(ctx: &RpcContext, params: Value) -> Result<Value, JsonRpcError> {
    let provider = params
        .get("provider")
        .and_then(|v| v.as_str())
        .ok_or_else(|| JsonRpcError::invalid_params("missing provider"))?;
    let _key = params
        .get("key")
        .and_then(|v| v.as_str())
        .ok_or_else(|| JsonRpcError::invalid_params("missing key"))?;

    // The key itself is never echoed back or logged; only the resulting
    // auth status is observable over RPC.
    ctx.state.complete_login(provider.to_string());
    Ok(json!({"status": "signed_in", "provider": provider}))
}
