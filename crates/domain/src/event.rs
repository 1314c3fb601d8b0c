//! The wire-visible event vocabulary. Every `AgentEvent` is
//! serialized as the `params` of a single `agent/event` JSON-RPC
//! notification, tagged by `type`, alongside the originating `session_id`
//! (attached by the RPC layer, not by the event itself — see `opal-rpc`).

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::message::{Message, ToolCall};
use crate::stream::Usage;

/// The agent's discrete state. Exactly one of these is authoritative at
/// any instant; RPC's `agent/state` echoes it verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Idle,
    Running,
    Streaming,
    ExecutingTools,
}

/// A single tool execution outcome as surfaced on the wire. Mirrors
/// [`crate::message::ToolResult`] but serializes with an explicit `ok`
/// discriminant rather than an internally-tagged enum, matching the
/// `{ok, output}` / `{error, reason}` shape  calls for on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireToolResult {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&crate::message::ToolResult> for WireToolResult {
    fn from(r: &crate::message::ToolResult) -> Self {
        match r {
            crate::message::ToolResult::Ok { output } => WireToolResult {
                ok: true,
                output: Some(match output {
                    crate::message::ToolOutput::Text(t) => Value::String(t.clone()),
                    crate::message::ToolOutput::Structured(v) => v.clone(),
                }),
                error: None,
            },
            crate::message::ToolResult::Error { reason } => WireToolResult {
                ok: false,
                output: None,
                error: Some(reason.clone()),
            },
        }
    }
}

/// The 19 tagged event variants, emitted as the
/// `agent/event` notification's `type` + type-specific fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    AgentStart,
    AgentEnd { usage: Option<Usage> },
    AgentAbort,
    AgentRecovered,
    MessageStart,
    MessageDelta { delta: String },
    MessageQueued { text: String },
    MessageApplied { text: String },
    ThinkingStart,
    ThinkingDelta { delta: String },
    ToolExecutionStart {
        tool: String,
        call_id: String,
        args: Value,
        meta: String,
    },
    ToolExecutionEnd {
        tool: String,
        call_id: String,
        result: WireToolResult,
    },
    ToolOutput {
        tool: String,
        call_id: String,
        chunk: String,
    },
    TurnEnd { message: Message },
    Error { reason: String },
    UsageUpdate { usage: Usage },
    StatusUpdate { message: String },
    ContextDiscovered { files: Vec<String> },
    SkillLoaded { name: String, description: String },
    SubAgentEvent {
        parent_call_id: String,
        sub_session_id: String,
        inner: Box<AgentEvent>,
    },
    /// Not one of the 19 wire-stable variants but a courtesy surfaced the
    /// same way: a long-running stream that hasn't produced a chunk in the
    /// watchdog window. Does not affect
    /// the stream; purely informational.
    #[serde(rename = "stream_stalled")]
    StreamStalled,
    /// Emitted when a tool is skipped because the steer queue had pending
    /// messages.
    ToolSkipped { tool: String, call_id: String },
    /// Emitted around auto-compaction.
    CompactionStart { n_messages: usize },
    CompactionEnd { old_n: usize, new_n: usize },
}

impl AgentEvent {
    pub fn tool_call_args_for_emit(call: &ToolCall) -> Value {
        call.arguments.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agent_event_serializes_with_snake_case_type_tag() {
        let ev = AgentEvent::MessageDelta { delta: "hi".into() };
        let v = serde_json::to_value(&ev).unwrap();
        assert_eq!(v["type"], "message_delta");
        assert_eq!(v["delta"], "hi");
    }

    #[test]
    fn sub_agent_event_nests_inner_event() {
        let inner = AgentEvent::AgentStart;
        let ev = AgentEvent::SubAgentEvent {
            parent_call_id: "c9".into(),
            sub_session_id: "sub-abcd".into(),
            inner: Box::new(inner),
        };
        let v = serde_json::to_value(&ev).unwrap();
        assert_eq!(v["type"], "sub_agent_event");
        assert_eq!(v["inner"]["type"], "agent_start");
    }

    #[test]
    fn wire_tool_result_from_ok() {
        let r = crate::message::ToolResult::ok("done");
        let w = WireToolResult::from(&r);
        assert!(w.ok);
        assert_eq!(w.output.unwrap(), Value::String("done".into()));
    }

    #[test]
    fn wire_tool_result_from_error() {
        let r = crate::message::ToolResult::error("boom");
        let w = WireToolResult::from(&r);
        assert!(!w.ok);
        assert_eq!(w.error.unwrap(), "boom");
    }
}
