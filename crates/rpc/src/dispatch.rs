//! The declarative protocol table and the dispatch loop that drives it.
//!
//! The table itself only carries the *validation* metadata (required
//! params, a description for `opal/version`-style introspection); routing
//! to a concrete handler is a `match` in [`dispatch`] because Rust has no
//! ergonomic way to store a table of differently-shaped async handlers
//! without boxing every one of them behind a dyn Fn — a `Route` table
//! used purely for the method list and docs, with an explicit `match`
//! for the actual call, resolves the same tension.

use std::sync::Arc;

use serde_json::Value;

use opal_agent::AgentRuntime;

use crate::methods;
use crate::protocol::JsonRpcError;
use crate::state::ServerState;
use crate::transport::{SharedPending, SharedWriter};

/// Everything a method handler needs: the agent core, the RPC layer's own
/// state, and the transport primitives for issuing server→client requests
///.
#[derive(Clone)]
pub struct RpcContext {
    pub runtime: Arc<AgentRuntime>,
    pub state: Arc<ServerState>,
    pub writer: SharedWriter,
    pub pending: SharedPending,
}

pub struct MethodSpec {
    pub name: &'static str,
    pub required_params: &'static [&'static str],
    pub description: &'static str,
}

/// The complete method list from , plus required-param metadata
/// used purely for `-32602` validation before a handler ever runs.
pub const METHODS: &[MethodSpec] = &[
    MethodSpec { name: "session/start", required_params: &[], description: "Create or resume a session" },
    MethodSpec { name: "session/list", required_params: &[], description: "List known sessions" },
    MethodSpec { name: "session/branch", required_params: &["session_id", "entry_id"], description: "Move a session's active leaf" },
    MethodSpec { name: "session/compact", required_params: &["session_id"], description: "Force compaction of a session" },
    MethodSpec { name: "session/history", required_params: &["session_id"], description: "Fetch a session's current message path" },
    MethodSpec { name: "session/delete", required_params: &["session_id"], description: "Delete a session and its transcript" },
    MethodSpec { name: "agent/prompt", required_params: &["session_id", "text"], description: "Send user text to a session" },
    MethodSpec { name: "agent/abort", required_params: &["session_id"], description: "Abort the in-flight turn" },
    MethodSpec { name: "agent/state", required_params: &["session_id"], description: "Query the agent's discrete status" },
    MethodSpec { name: "models/list", required_params: &[], description: "List configured providers and their capabilities" },
    MethodSpec { name: "model/set", required_params: &["session_id", "provider", "id"], description: "Pin a session's model" },
    MethodSpec { name: "thinking/set", required_params: &["session_id", "level"], description: "Set a session's thinking level" },
    MethodSpec { name: "auth/status", required_params: &[], description: "Current auth status" },
    MethodSpec { name: "auth/login", required_params: &[], description: "Start a device-code login flow" },
    MethodSpec { name: "auth/poll", required_params: &["device_code"], description: "Poll a pending device-code login" },
    MethodSpec { name: "auth/set_key", required_params: &["provider", "key"], description: "Set an API key directly" },
    MethodSpec { name: "tasks/list", required_params: &[], description: "List persisted task records for a scope" },
    MethodSpec { name: "settings/get", required_params: &[], description: "Fetch persisted settings" },
    MethodSpec { name: "settings/save", required_params: &["settings"], description: "Persist settings" },
    MethodSpec { name: "opal/config/get", required_params: &[], description: "Fetch the running config" },
    MethodSpec { name: "opal/config/set", required_params: &[], description: "Update the running config" },
    MethodSpec { name: "opal/ping", required_params: &[], description: "Liveness check" },
    MethodSpec { name: "opal/version", required_params: &[], description: "Server version and build info" },
];

fn find(method: &str) -> Option<&'static MethodSpec> {
    METHODS.iter().find(|m| m.name == method)
}

/// Validate that every required param is present as a key in `params`
///. An absent `params` object
/// is only valid when the method needs none.
fn validate_params(spec: &MethodSpec, params: &Option<Value>) -> Result<(), JsonRpcError> {
    if spec.required_params.is_empty() {
        return Ok(());
    }
    let obj = params.as_ref().and_then(|v| v.as_object());
    let missing: Vec<&str> = spec
        .required_params
        .iter()
        .filter(|key| !obj.map(|o| o.contains_key(**key)).unwrap_or(false))
        .copied()
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(JsonRpcError::invalid_params(format!(
            "{} missing required param(s): {}",
            spec.name,
            missing.join(", ")
        )))
    }
}

/// Route one client request to its handler, returning the `result` value
/// to embed in the JSON-RPC response (or the error to embed instead).
pub async fn dispatch(ctx: &RpcContext, method: &str, params: Option<Value>) -> Result<Value, JsonRpcError> {
    let spec = find(method).ok_or_else(|| JsonRpcError::method_not_found(method))?;
    validate_params(spec, &params)?;
    let params = params.unwrap_or(Value::Object(Default::default()));

    match method {
        "session/start" => methods::session::start(ctx, params).await,
        "session/list" => methods::session::list(ctx, params).await,
        "session/branch" => methods::session::branch(ctx, params).await,
        "session/compact" => methods::session::compact(ctx, params).await,
        "session/history" => methods::session::history(ctx, params).await,
        "session/delete" => methods::session::delete(ctx, params).await,
        "agent/prompt" => methods::agent::prompt(ctx, params).await,
        "agent/abort" => methods::agent::abort(ctx, params).await,
        "agent/state" => methods::agent::state(ctx, params).await,
        "models/list" => methods::models::list(ctx, params).await,
        "model/set" => methods::models::set(ctx, params).await,
        "thinking/set" => methods::models::set_thinking(ctx, params).await,
        "auth/status" => methods::auth::status(ctx, params).await,
        "auth/login" => methods::auth::login(ctx, params).await,
        "auth/poll" => methods::auth::poll(ctx, params).await,
        "auth/set_key" => methods::auth::set_key(ctx, params).await,
        "tasks/list" => methods::tasks::list(ctx, params).await,
        "settings/get" => methods::settings::get(ctx, params).await,
        "settings/save" => methods::settings::save(ctx, params).await,
        "opal/config/get" => methods::misc::config_get(ctx, params).await,
        "opal/config/set" => methods::misc::config_set(ctx, params).await,
        "opal/ping" => methods::misc::ping(ctx, params).await,
        "opal/version" => methods::misc::version(ctx, params).await,
        _ => Err(JsonRpcError::method_not_found(method)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_client_method_is_in_the_table() {
        let expected = [
            "session/start", "session/list", "session/branch", "session/compact", "session/history",
            "session/delete", "agent/prompt", "agent/abort", "agent/state", "models/list", "model/set",
            "thinking/set", "auth/status", "auth/login", "auth/poll", "auth/set_key", "tasks/list",
            "settings/get", "settings/save", "opal/config/get", "opal/config/set", "opal/ping", "opal/version",
        ];
        for name in expected {
            assert!(find(name).is_some(), "missing method spec for {name}");
        }
        assert_eq!(METHODS.len(), expected.len());
    }

    #[test]
    fn missing_required_param_is_invalid_params() {
        let spec = find("agent/prompt").unwrap();
        let err = validate_params(spec, &Some(serde_json::json!({"session_id": "s1"}))).unwrap_err();
        assert_eq!(err.code, crate::protocol::INVALID_PARAMS);
    }

    #[test]
    fn present_required_params_pass() {
        let spec = find("agent/prompt").unwrap();
        assert!(validate_params(spec, &Some(serde_json::json!({"session_id": "s1", "text": "hi"}))).is_ok());
    }

    #[test]
    fn unknown_method_is_not_found() {
        assert!(find("nonexistent/method").is_none());
    }
}
