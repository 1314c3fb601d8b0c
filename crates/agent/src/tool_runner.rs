//! Sequential tool dispatch.
//!
//! Each call runs to completion before the next starts — tracking a node
//! per call, emitting start/result, appending to the transcript — and a
//! steer message queued mid-batch skips the remaining calls in that
//! batch (`tool_skipped`) rather than racing them against now-stale
//! context.

use std::sync::Arc;

use opal_domain::event::{AgentEvent, WireToolResult};
use opal_domain::message::{ToolCall, ToolResult};

use opal_tools::registry::ToolRegistry;
use opal_tools::tool::ToolContext;

use crate::bus::EventBus;
use crate::cancel::CancelToken;
use crate::steer::SteerQueue;

/// Tool names whose arguments carry a `path` that can trigger skill
/// auto-load on write.
const PATH_TRIGGERING_TOOLS: &[&str] = &["write_file", "edit_file"];

/// Extract the path a write/edit call touched, for skill auto-load
/// matching. `None` for tools that don't touch a path, or whose `path`
/// argument isn't a string.
pub fn triggering_path(call: &ToolCall) -> Option<String> {
    if !PATH_TRIGGERING_TOOLS.contains(&call.tool_name.as_str()) {
        return None;
    }
    call.arguments.get("path").and_then(|v| v.as_str()).map(str::to_string)
}

pub struct ToolRunner {
    registry: Arc<ToolRegistry>,
}

impl ToolRunner {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self { registry }
    }

    /// Run `calls` in order against `bus`/`session_id`, building a fresh
    /// [`ToolContext`] per call via `ctx_for` (callers vary `call_id` and
    /// the `emit` closure per call). Stops dispatching — emitting
    /// `tool_skipped` plus a synthetic error result for the rest — as soon
    /// as `cancel` fires or `steer` has a message queued after a completed
    /// call. Cancelled calls get "[Aborted by user]"; steer-skipped calls
    /// get "Skipped — user sent a steering message". Every call in
    /// `calls` has a corresponding entry in the returned vec, in order.
    pub async fn run(
        &self,
        calls: &[ToolCall],
        ctx_for: impl Fn(&ToolCall) -> ToolContext,
        bus: &EventBus,
        session_id: &str,
        cancel: &CancelToken,
        steer: &SteerQueue,
    ) -> Vec<(ToolCall, ToolResult)> {
        let mut results = Vec::with_capacity(calls.len());
        let mut skip_rest = false;

        for call in calls {
            if cancel.is_cancelled() {
                bus.publish(
                    session_id,
                    AgentEvent::ToolSkipped { tool: call.tool_name.clone(), call_id: call.call_id.clone() },
                );
                results.push((call.clone(), ToolResult::error("[Aborted by user]")));
                continue;
            }

            if skip_rest {
                bus.publish(
                    session_id,
                    AgentEvent::ToolSkipped { tool: call.tool_name.clone(), call_id: call.call_id.clone() },
                );
                results.push((call.clone(), ToolResult::error("Skipped — user sent a steering message")));
                continue;
            }

            let ctx = ctx_for(call);
            let result = self.run_one(call, &ctx, bus, session_id).await;
            results.push((call.clone(), result));

            if steer.has_pending() {
                skip_rest = true;
            }
        }

        results
    }

    async fn run_one(&self, call: &ToolCall, ctx: &ToolContext, bus: &EventBus, session_id: &str) -> ToolResult {
        let Some(tool) = self.registry.get(&call.tool_name) else {
            tracing::warn!(tool = %call.tool_name, call_id = %call.call_id, "tool call for unregistered tool");
            let result = ToolResult::error(format!("unknown tool: {}", call.tool_name));
            bus.publish(
                session_id,
                AgentEvent::ToolExecutionStart {
                    tool: call.tool_name.clone(),
                    call_id: call.call_id.clone(),
                    args: call.arguments.clone(),
                    meta: String::new(),
                },
            );
            bus.publish(
                session_id,
                AgentEvent::ToolExecutionEnd {
                    tool: call.tool_name.clone(),
                    call_id: call.call_id.clone(),
                    result: WireToolResult::from(&result),
                },
            );
            return result;
        };

        let meta = tool.meta(&call.arguments);
        bus.publish(
            session_id,
            AgentEvent::ToolExecutionStart {
                tool: call.tool_name.clone(),
                call_id: call.call_id.clone(),
                args: call.arguments.clone(),
                meta,
            },
        );

        let result = match tool.execute(call.arguments.clone(), ctx).await {
            Ok(output) => ToolResult::ok(output),
            Err(e) => {
                tracing::warn!(tool = %call.tool_name, call_id = %call.call_id, error = %e, "tool execution failed");
                ToolResult::error(e.to_string())
            }
        };

        bus.publish(
            session_id,
            AgentEvent::ToolExecutionEnd {
                tool: call.tool_name.clone(),
                call_id: call.call_id.clone(),
                result: WireToolResult::from(&result),
            },
        );

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use opal_domain::error::Result;
    use opal_domain::message::ToolOutput;
    use serde_json::Value;
    use std::path::PathBuf;

    struct Echo;

    #[async_trait]
    impl opal_tools::tool::Tool for Echo {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "echoes input"
        }
        fn parameters(&self) -> Value {
            serde_json::json!({"type": "object"})
        }
        async fn execute(&self, args: Value, _ctx: &ToolContext) -> Result<ToolOutput> {
            Ok(ToolOutput::Structured(args))
        }
    }

    struct Boom;

    #[async_trait]
    impl opal_tools::tool::Tool for Boom {
        fn name(&self) -> &str {
            "boom"
        }
        fn description(&self) -> &str {
            "always fails"
        }
        fn parameters(&self) -> Value {
            serde_json::json!({"type": "object"})
        }
        async fn execute(&self, _args: Value, _ctx: &ToolContext) -> Result<ToolOutput> {
            Err(opal_domain::error::Error::Other("boom".into()))
        }
    }

    fn call(tool_name: &str, call_id: &str) -> ToolCall {
        ToolCall { call_id: call_id.into(), tool_name: tool_name.into(), arguments: serde_json::json!({}) }
    }

    fn ctx(call_id: &str) -> ToolContext {
        ToolContext::new(
            PathBuf::from("."),
            "s1",
            "main",
            call_id,
            Arc::new(opal_domain::config::Config::default()),
            Arc::new(|_| {}),
        )
    }

    #[tokio::test]
    async fn runs_calls_sequentially_and_reports_results() {
        let reg = ToolRegistry::new();
        reg.register(Arc::new(Echo));
        let runner = ToolRunner::new(Arc::new(reg));
        let bus = EventBus::new();
        let cancel = CancelToken::new();
        let steer = SteerQueue::new();
        let calls = vec![call("echo", "c1"), call("echo", "c2")];

        let results = runner.run(&calls, |c| ctx(&c.call_id), &bus, "s1", &cancel, &steer).await;
        assert_eq!(results.len(), 2);
        assert!(!results[0].1.is_error());
        assert!(!results[1].1.is_error());
    }

    #[tokio::test]
    async fn unknown_tool_produces_error_result_not_panic() {
        let runner = ToolRunner::new(Arc::new(ToolRegistry::new()));
        let bus = EventBus::new();
        let cancel = CancelToken::new();
        let steer = SteerQueue::new();
        let calls = vec![call("nonexistent", "c1")];

        let results = runner.run(&calls, |c| ctx(&c.call_id), &bus, "s1", &cancel, &steer).await;
        assert!(results[0].1.is_error());
    }

    #[tokio::test]
    async fn tool_error_is_captured_as_result_not_propagated() {
        let reg = ToolRegistry::new();
        reg.register(Arc::new(Boom));
        let runner = ToolRunner::new(Arc::new(reg));
        let bus = EventBus::new();
        let cancel = CancelToken::new();
        let steer = SteerQueue::new();
        let calls = vec![call("boom", "c1")];

        let results = runner.run(&calls, |c| ctx(&c.call_id), &bus, "s1", &cancel, &steer).await;
        assert!(results[0].1.is_error());
        assert_eq!(results[0].1.as_text(), "boom");
    }

    #[tokio::test]
    async fn steer_message_after_first_call_skips_the_rest() {
        let reg = ToolRegistry::new();
        reg.register(Arc::new(Echo));
        let runner = ToolRunner::new(Arc::new(reg));
        let bus = EventBus::new();
        let mut events = bus.subscribe("s1");
        let cancel = CancelToken::new();
        let steer = SteerQueue::new();
        steer.push("hang on");
        let calls = vec![call("echo", "c1"), call("echo", "c2"), call("echo", "c3")];

        let results = runner.run(&calls, |c| ctx(&c.call_id), &bus, "s1", &cancel, &steer).await;
        assert_eq!(results.len(), 3);
        assert!(!results[0].1.is_error());
        assert!(results[1].1.is_error());
        assert_eq!(results[1].1.as_text(), "Skipped — user sent a steering message");
        assert!(results[2].1.is_error());
        assert_eq!(results[2].1.as_text(), "Skipped — user sent a steering message");

        let mut saw_skip = 0;
        while let Ok(ev) = events.try_recv() {
            if matches!(ev, AgentEvent::ToolSkipped { .. }) {
                saw_skip += 1;
            }
        }
        assert_eq!(saw_skip, 2);
    }

    #[tokio::test]
    async fn cancellation_before_a_call_skips_remaining_calls() {
        let reg = ToolRegistry::new();
        reg.register(Arc::new(Echo));
        let runner = ToolRunner::new(Arc::new(reg));
        let bus = EventBus::new();
        let cancel = CancelToken::new();
        cancel.cancel();
        let steer = SteerQueue::new();
        let calls = vec![call("echo", "c1")];

        let results = runner.run(&calls, |c| ctx(&c.call_id), &bus, "s1", &cancel, &steer).await;
        assert_eq!(results.len(), 1);
        assert!(results[0].1.is_error());
        assert_eq!(results[0].1.as_text(), "[Aborted by user]");
    }

    #[test]
    fn triggering_path_extracts_path_for_write_and_edit_only() {
        let mut write_call = call("write_file", "c1");
        write_call.arguments = serde_json::json!({"path": "src/main.rs"});
        assert_eq!(triggering_path(&write_call), Some("src/main.rs".to_string()));

        let read_call = call("read_file", "c2");
        assert_eq!(triggering_path(&read_call), None);
    }

    #[test]
    fn triggering_path_is_none_without_string_path_argument() {
        let call = call("write_file", "c1");
        assert_eq!(triggering_path(&call), None);
    }
}
