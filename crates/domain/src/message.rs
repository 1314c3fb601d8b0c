//! The conversation tree's node type and the small value types it is built
//! from (`ToolCall`, `ToolResult`). This is distinct from [`crate::chat`],
//! which is the flattened, provider-facing message shape built from a path
//! through the tree.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A call the model asked the runtime to make. `call_id` is stable across
/// the `tool_call_start` → `tool_call_done` span and is reused verbatim as
/// the key for the matching [`ToolResult`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    pub call_id: String,
    pub tool_name: String,
    pub arguments: Value,
}

/// The outcome of executing a [`ToolCall`]. Keyed by `call_id` by the caller,
/// not embedded here — see `opal_tools::ToolRunner`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum ToolResult {
    Ok { output: ToolOutput },
    Error { reason: String },
}

impl ToolResult {
    pub fn ok(output: impl Into<ToolOutput>) -> Self {
        ToolResult::Ok { output: output.into() }
    }

    pub fn error(reason: impl Into<String>) -> Self {
        ToolResult::Error { reason: reason.into() }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, ToolResult::Error { .. })
    }

    /// Render as text for the `tool_result` message's `content` field.
    pub fn as_text(&self) -> String {
        match self {
            ToolResult::Ok { output: ToolOutput::Text(t) } => t.clone(),
            ToolResult::Ok { output: ToolOutput::Structured(v) } => v.to_string(),
            ToolResult::Error { reason } => reason.clone(),
        }
    }
}

/// Tool output is typed per-tool: either plain text or a structured value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ToolOutput {
    Text(String),
    Structured(Value),
}

impl From<String> for ToolOutput {
    fn from(s: String) -> Self {
        ToolOutput::Text(s)
    }
}

impl From<&str> for ToolOutput {
    fn from(s: &str) -> Self {
        ToolOutput::Text(s.to_string())
    }
}

impl From<Value> for ToolOutput {
    fn from(v: Value) -> Self {
        ToolOutput::Structured(v)
    }
}

/// The five roles a tree entry can take. `ToolCall`/`ToolResult` are split
/// from `Assistant`/`Tool` because each carries its own call-identifying
/// fields (see [`Message`]) and the invariant in  is stated in
/// terms of these two roles specifically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    System,
    ToolCall,
    ToolResult,
}

/// One entry in a session's message tree.
///
/// Fields are a superset across all roles; which ones are meaningful
/// depends on `role` (see 's Message definition). `tool_calls` is
/// only ever non-empty on `Assistant` entries; `call_id`/`tool_name` are
/// only set on `ToolCall`/`ToolResult` entries; `is_error` only matters on
/// `ToolResult`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub role: Role,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    #[serde(default)]
    pub is_error: bool,
    #[serde(default)]
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn user(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(id, Role::User, text.into())
    }

    pub fn system(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(id, Role::System, text.into())
    }

    pub fn assistant(id: impl Into<String>, text: impl Into<String>, thinking: Option<String>, tool_calls: Vec<ToolCall>) -> Self {
        let mut m = Self::new(id, Role::Assistant, text.into());
        m.thinking = thinking;
        m.tool_calls = tool_calls;
        m
    }

    pub fn tool_call(id: impl Into<String>, call_id: impl Into<String>, tool_name: impl Into<String>) -> Self {
        let mut m = Self::new(id, Role::ToolCall, String::new());
        m.call_id = Some(call_id.into());
        m.tool_name = Some(tool_name.into());
        m
    }

    pub fn tool_result(
        id: impl Into<String>,
        call_id: impl Into<String>,
        tool_name: impl Into<String>,
        content: impl Into<String>,
        is_error: bool,
    ) -> Self {
        let mut m = Self::new(id, Role::ToolResult, content.into());
        m.call_id = Some(call_id.into());
        m.tool_name = Some(tool_name.into());
        m.is_error = is_error;
        m
    }

    fn new(id: impl Into<String>, role: Role, content: String) -> Self {
        Self {
            id: id.into(),
            role,
            content,
            thinking: None,
            tool_calls: Vec::new(),
            call_id: None,
            tool_name: None,
            is_error: false,
            metadata: Value::Null,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_result_ok_renders_text_output_verbatim() {
        let r = ToolResult::ok("hello");
        assert_eq!(r.as_text(), "hello");
        assert!(!r.is_error());
    }

    #[test]
    fn tool_result_error_renders_reason() {
        let r = ToolResult::error("boom");
        assert_eq!(r.as_text(), "boom");
        assert!(r.is_error());
    }

    #[test]
    fn tool_result_structured_output_renders_as_json() {
        let r = ToolResult::ok(serde_json::json!({"a": 1}));
        assert_eq!(r.as_text(), "{\"a\":1}");
    }

    #[test]
    fn assistant_message_carries_tool_calls() {
        let call = ToolCall {
            call_id: "c1".into(),
            tool_name: "read_file".into(),
            arguments: serde_json::json!({"path": "a.txt"}),
        };
        let m = Message::assistant("m1", "", None, vec![call.clone()]);
        assert_eq!(m.tool_calls, vec![call]);
        assert!(m.call_id.is_none());
    }
}
