//! `session/start`, `session/list`, `session/branch`, `session/compact`,
//! `session/history`, `session/delete`.

use std::collections::HashSet;
use std::path::PathBuf;

use serde_json::{json, Value};
use uuid::Uuid;

use opal_agent::SessionOptions;

use crate::dispatch::RpcContext;
use crate::protocol::JsonRpcError;

fn param_str(params: &Value, key: &str) -> Option<String> {
    params.get(key).and_then(|v| v.as_str()).map(str::to_string)
}

fn session_id_or_not_found(params: &Value) -> Result<String, JsonRpcError> {
    param_str(params, "session_id").ok_or_else(|| JsonRpcError::invalid_params("missing session_id"))
}

/// Resolve an on-disk `not found` / decode failure into the RPC boundary's
/// invariant 10 mapping").
fn map_session_error(e: opal_domain::error::Error) -> JsonRpcError {
    match e {
        opal_domain::error::Error::SessionNotFound(id) => {
            JsonRpcError::invalid_params(format!("session not found: {id}"))
        }
        other => JsonRpcError::internal(other.to_string()),
    }
}

pub async fn start(ctx: &RpcContext, params: Value) -> Result<Value, JsonRpcError> {
    let session_id = param_str(&params, "session_id")
        .or_else(|| param_str(&params, "session"))
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let system_prompt = param_str(&params, "system_prompt").unwrap_or_default();
    let working_dir = param_str(&params, "working_dir")
        .map(PathBuf::from)
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_default());

    let model = params.get("model");
    let provider_id = model.and_then(|m| m.get("provider")).and_then(|v| v.as_str()).map(str::to_string);
    let model_id = model.and_then(|m| m.get("id")).and_then(|v| v.as_str()).map(str::to_string);
    let thinking_level = model.and_then(|m| m.get("thinking_level")).and_then(|v| v.as_str()).map(str::to_string);

    let features = params.get("features");
    let sub_agents = features.and_then(|f| f.get("sub_agents")).and_then(|v| v.as_bool()).unwrap_or(ctx.runtime.config.features.sub_agents);
    let skills_enabled = features.and_then(|f| f.get("skills")).and_then(|v| v.as_bool()).unwrap_or(ctx.runtime.config.features.skills);

    let mut configured_tools = vec!["use_skill".to_string(), "ask_user".to_string()];
    if sub_agents {
        configured_tools.push("sub_agent".to_string());
    }

    let opts = SessionOptions {
        agent_id: "main".to_string(),
        is_top_level: true,
        system_prompt,
        provider_id,
        model_id,
        thinking_level,
        working_dir: working_dir.clone(),
        configured_tools,
        disabled_tools: HashSet::new(),
    };

    ctx.runtime.start_session(&session_id, opts).map_err(map_session_error)?;

    if ctx.state.mark_subscribed(&session_id) {
        crate::server::spawn_event_forwarder(ctx.clone(), session_id.clone());
    }

    let available_skills: Vec<String> = if skills_enabled {
        ctx.runtime.skills.list_ready().into_iter().map(|s| s.name).collect()
    } else {
        Vec::new()
    };

    let context_files = super::discover_context_files(&working_dir);
    let mcp_servers: Vec<Value> = ctx
        .runtime
        .config
        .mcp
        .servers
        .iter()
        .map(|s| json!({"id": s.id, "command": s.command}))
        .collect();

    let (auth_status, auth_provider) = ctx.state.auth_status();

    Ok(json!({
        "session_id": session_id,
        "session_dir": ctx.state.data_dir().join("sessions").display().to_string(),
        "context_files": context_files,
        "available_skills": available_skills,
        "mcp_servers": mcp_servers,
        "node_name": node_name(),
        "auth": {"status": auth_status, "provider": auth_provider},
    }))
}

fn node_name() -> String {
    let host = std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string());
    format!("opal@{host}")
}

pub async fn list(ctx: &RpcContext, _params: Value) -> Result<Value, JsonRpcError> {
    let sessions = ctx.runtime.sessions.list();
    Ok(json!(sessions
        .into_iter()
        .map(|meta| json!({
            "session_id": meta.session_id,
            "title": meta.title,
            "created_at": meta.created_at,
            "updated_at": meta.updated_at,
        }))
        .collect::<Vec<_>>()))
}

pub async fn branch(ctx: &RpcContext, params: Value) -> Result<Value, JsonRpcError> {
    let session_id = session_id_or_not_found(&params)?;
    let entry_id = params
        .get("entry_id")
        .and_then(|v| v.as_u64())
        .ok_or_else(|| JsonRpcError::invalid_params("entry_id must be a non-negative integer"))?;

    ctx.runtime.sessions.branch(&session_id, entry_id).map_err(map_session_error)?;
    let path = ctx.runtime.sessions.current_path(&session_id).map_err(map_session_error)?;
    Ok(json!({"session_id": session_id, "leaf": entry_id, "message_count": path.len()}))
}

pub async fn compact(ctx: &RpcContext, params: Value) -> Result<Value, JsonRpcError> {
    let session_id = session_id_or_not_found(&params)?;
    let result = ctx
        .runtime
        .force_compact(&session_id)
        .await
        .map_err(map_session_error)?;
    Ok(json!({"session_id": session_id, "old_n": result.old_n, "new_n": result.new_n}))
}

pub async fn history(ctx: &RpcContext, params: Value) -> Result<Value, JsonRpcError> {
    let session_id = session_id_or_not_found(&params)?;
    let messages = ctx.runtime.sessions.current_path(&session_id).map_err(map_session_error)?;
    Ok(json!({"session_id": session_id, "messages": messages}))
}

pub async fn delete(ctx: &RpcContext, params: Value) -> Result<Value, JsonRpcError> {
    let session_id = session_id_or_not_found(&params)?;
    ctx.runtime.close_session(&session_id);
    ctx.runtime.sessions.delete(&session_id).map_err(map_session_error)?;
    ctx.state.forget_subscription(&session_id);
    Ok(json!({"session_id": session_id, "deleted": true}))
}
