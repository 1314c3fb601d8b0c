//! Sub-agent spawning and the `sub_agent` tool.
//!
//! Grounded on `gateway/src/runtime/agent.rs`'s `AgentManager`/`AgentContext`
//! (spawn a child run, drain its events for the final answer, clean up on
//! completion or timeout) and `crate::cancel::CancelMap`'s cascading
//! groups. A sub-agent is just another session the parent's in-flight
//! `sub_agent` tool call owns for its lifetime: same [`AgentRuntime`], a
//! fresh session id, `is_top_level: false`, and `ask_parent` substituted
//! for `ask_user` (depth is bounded to 1 — a sub-agent session never gets
//! `sub_agent` in its own configured tools).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use uuid::Uuid;

use opal_domain::error::{Error, Result};
use opal_domain::event::AgentEvent;
use opal_domain::message::{Role, ToolOutput};

use opal_tools::tool::{ParentLink, Tool, ToolContext};

use crate::machine::{AgentRuntime, SessionOptions};

/// Forwards an `ask_parent` call from the sub-agent's in-flight tool task
/// to the parent's in-flight `sub_agent` tool invocation, then blocks on
/// the parent's reply.
struct ParentLinkBridge {
    tx: tokio::sync::mpsc::UnboundedSender<(String, tokio::sync::oneshot::Sender<String>)>,
}

#[async_trait]
impl ParentLink for ParentLinkBridge {
    async fn ask_parent(&self, question: &str) -> Result<String> {
        let (reply_tx, reply_rx) = tokio::sync::oneshot::channel();
        self.tx
            .send((question.to_string(), reply_tx))
            .map_err(|_| Error::Other("parent session is no longer available".to_string()))?;
        reply_rx.await.map_err(|_| Error::Other("parent reply channel closed".to_string()))
    }
}

/// Build the child session's options, inheriting from the parent unless a
/// named agent config or an explicit model
/// override says otherwise. Always drops `sub_agent` (depth-1 bound) and
/// `ask_user` (replaced by `ask_parent`) from the child's tool list.
fn build_child_options(runtime: &AgentRuntime, parent_opts: &SessionOptions, agent_key: Option<&str>, model_override: Option<&str>) -> SessionOptions {
    let agent_cfg = agent_key.and_then(|k| runtime.config.agents.get(k));

    let mut tools: Vec<String> = parent_opts.configured_tools.iter().filter(|t| t.as_str() != "sub_agent" && t.as_str() != "ask_user").cloned().collect();
    if !tools.iter().any(|t| t == "ask_parent") {
        tools.push("ask_parent".to_string());
    }
    let configured_tools = agent_cfg.and_then(|c| c.tools.clone()).unwrap_or(tools);

    let system_prompt = agent_cfg.and_then(|c| c.system_prompt.clone()).unwrap_or_else(|| parent_opts.system_prompt.clone());
    let working_dir = agent_cfg.and_then(|c| c.working_dir.clone()).unwrap_or_else(|| parent_opts.working_dir.clone());

    let (provider_id, model_id) = if let Some(spec) = model_override {
        let mut parts = spec.splitn(2, '/');
        (parts.next().map(str::to_string), parts.next().map(str::to_string))
    } else if let Some(model) = agent_cfg.and_then(|c| c.model.as_ref()) {
        (Some(model.provider.clone()), Some(model.id.clone()))
    } else {
        (parent_opts.provider_id.clone(), parent_opts.model_id.clone())
    };

    SessionOptions {
        agent_id: agent_key.unwrap_or("sub_agent").to_string(),
        is_top_level: false,
        system_prompt,
        provider_id,
        model_id,
        working_dir,
        configured_tools,
        disabled_tools: parent_opts.disabled_tools.clone(),
    }
}

/// The `sub_agent` tool itself: delegates a task to a freshly spawned
/// child session and blocks until it finishes, times out, or is aborted
///.
pub struct SubAgentTool {
    runtime: Arc<AgentRuntime>,
}

impl SubAgentTool {
    pub fn new(runtime: Arc<AgentRuntime>) -> Self {
        Self { runtime }
    }
}

#[async_trait]
impl Tool for SubAgentTool {
    fn name(&self) -> &str {
        "sub_agent"
    }

    fn description(&self) -> &str {
        "Delegate a self-contained task to a sub-agent and wait for its final answer. \
         The sub-agent shares no conversation history with you except the task description \
         you give it; it can ask you clarifying questions via ask_parent."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "task": {"type": "string", "description": "The task to delegate, written as a self-contained prompt."},
                "agent": {"type": "string", "description": "Optional named agent profile to use (from configured agents)."},
                "model": {"type": "string", "description": "Optional explicit \"provider/model\" override."}
            },
            "required": ["task"]
        })
    }

    fn meta(&self, args: &Value) -> String {
        args.get("task").and_then(|v| v.as_str()).map(|t| t.chars().take(80).collect()).unwrap_or_default()
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<ToolOutput> {
        if !self.runtime.config.features.sub_agents {
            return Err(Error::Other("sub_agents_disabled".to_string()));
        }

        let task = args.get("task").and_then(|v| v.as_str()).ok_or_else(|| Error::Other("missing required field: task".to_string()))?.to_string();
        let agent_key = args.get("agent").and_then(|v| v.as_str()).map(str::to_string);
        let model_override = args.get("model").and_then(|v| v.as_str()).map(str::to_string);

        let parent_state = self.runtime.states.get(&ctx.session_id).ok_or_else(|| Error::SessionNotFound(ctx.session_id.clone()))?;
        if !parent_state.lock().is_top_level {
            return Err(Error::Other("sub-agents cannot spawn nested sub-agents".to_string()));
        }

        let parent_opts = self.runtime.session_options(&ctx.session_id);
        let child_opts = build_child_options(&self.runtime, &parent_opts, agent_key.as_deref(), model_override.as_deref());
        let child_id = format!("sub-{}-{}", ctx.call_id, Uuid::new_v4());

        let (ask_tx, mut ask_rx) = tokio::sync::mpsc::unbounded_channel();
        self.runtime.register_parent_link(&child_id, Arc::new(ParentLinkBridge { tx: ask_tx }));
        self.runtime.cancels.add_to_group(&ctx.session_id, &child_id);

        let mut child_events = self.runtime.bus.subscribe(&child_id);

        let result = self.run_child(&ctx.session_id, &child_id, child_opts, task, &mut ask_rx, ctx).await;

        self.runtime.cancels.remove_from_group(&ctx.session_id, &child_id);
        self.runtime.remove_parent_link(&child_id);
        self.runtime.close_session(&child_id);
        drop(child_events.try_recv());

        result.map(ToolOutput::Text)
    }
}

impl SubAgentTool {
    async fn run_child(
        &self,
        parent_session_id: &str,
        child_id: &str,
        child_opts: SessionOptions,
        task: String,
        ask_rx: &mut tokio::sync::mpsc::UnboundedReceiver<(String, tokio::sync::oneshot::Sender<String>)>,
        parent_ctx: &ToolContext,
    ) -> Result<String> {
        self.runtime.start_session(child_id, child_opts)?;
        let mut events = self.runtime.bus.subscribe(child_id);
        self.runtime.prompt(child_id, task)?;

        let timeout = Duration::from_secs(self.runtime.config.sub_agent.timeout_secs);
        let deadline = tokio::time::sleep(timeout);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                _ = &mut deadline => {
                    self.runtime.abort(child_id);
                    return Ok("[sub-agent timed out before completing]".to_string());
                }
                maybe_ask = ask_rx.recv() => {
                    let Some((question, reply_tx)) = maybe_ask else { continue };
                    let answer = match &parent_ctx.client {
                        Some(client) => client.ask_user(parent_session_id, &question, &[]).await.unwrap_or_default(),
                        None => String::new(),
                    };
                    let _ = reply_tx.send(answer);
                }
                ev = events.recv() => {
                    match ev {
                        Ok(AgentEvent::AgentEnd { .. }) => {
                            return Ok(self.final_text(child_id));
                        }
                        Ok(AgentEvent::AgentAbort) => {
                            return Ok("[sub-agent aborted]".to_string());
                        }
                        Ok(inner) => {
                            self.runtime.bus.publish(
                                parent_session_id,
                                AgentEvent::SubAgentEvent {
                                    parent_call_id: parent_ctx.call_id.clone(),
                                    sub_session_id: child_id.to_string(),
                                    inner: Box::new(inner),
                                },
                            );
                        }
                        Err(_) => return Ok("[sub-agent event channel closed unexpectedly]".to_string()),
                    }
                }
            }
        }
    }

    fn final_text(&self, child_id: &str) -> String {
        let path = self.runtime.sessions.current_path(child_id).unwrap_or_default();
        path.iter()
            .rev()
            .find(|m| m.role == Role::Assistant)
            .map(|m| m.content.clone())
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| "[sub-agent produced no answer]".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::EventBus;
    use crate::cancel::CancelMap;
    use crate::state::AgentStates;
    use async_trait::async_trait as at;
    use opal_domain::capability::Capabilities;
    use opal_domain::config::{AgentConfig, Config};
    use opal_domain::error::Result as DomainResult;
    use opal_domain::stream::{BoxStream, ProviderStreamEvent, Usage};
    use opal_providers::traits::{ChatRequest, ChatResponse};
    use opal_providers::{Provider, ProviderRegistry};
    use opal_skills::registry::SkillsRegistry;
    use opal_tools::registry::ToolRegistry;
    use opal_tools::tool::ClientRequester;
    use opal_sessions::SessionStore;
    use std::path::PathBuf;

    struct StubClient;
    #[at]
    impl ClientRequester for StubClient {
        async fn ask_user(&self, _session_id: &str, _question: &str, _choices: &[String]) -> Result<String> {
            Ok("go ahead".to_string())
        }
    }

    struct OneShotProvider;
    #[at]
    impl Provider for OneShotProvider {
        async fn chat(&self, _req: ChatRequest) -> DomainResult<ChatResponse> {
            unimplemented!()
        }
        async fn chat_stream(&self, _req: ChatRequest) -> DomainResult<BoxStream<'static, DomainResult<ProviderStreamEvent>>> {
            let events: Vec<DomainResult<ProviderStreamEvent>> = vec![
                Ok(ProviderStreamEvent::TextStart),
                Ok(ProviderStreamEvent::TextDelta { text: "delegated answer".into() }),
                Ok(ProviderStreamEvent::TextDone { text: "delegated answer".into() }),
                Ok(ProviderStreamEvent::ResponseDone { usage: Some(Usage { input_tokens: 20, output_tokens: 5 }) }),
            ];
            Ok(Box::pin(futures_util::stream::iter(events)))
        }
        fn capabilities(&self) -> &Capabilities {
            static C: std::sync::OnceLock<Capabilities> = std::sync::OnceLock::new();
            C.get_or_init(Capabilities::default)
        }
        fn provider_id(&self) -> &str {
            "stub"
        }
    }

    fn runtime_with_sub_agents_enabled() -> Arc<AgentRuntime> {
        let dir = tempfile::tempdir().unwrap();
        let sessions = Arc::new(SessionStore::open(dir.path()).unwrap());
        let tools = Arc::new(ToolRegistry::new());
        let mut providers = ProviderRegistry::new();
        providers.register(Arc::new(OneShotProvider));
        let providers = Arc::new(providers);
        let bus = Arc::new(EventBus::new());
        let cancels = Arc::new(CancelMap::new());
        let states = Arc::new(AgentStates::new());
        let skills = Arc::new(SkillsRegistry::empty());
        let mut config = Config::default();
        config.features.sub_agents = true;
        let config = Arc::new(config);
        let client: Arc<dyn ClientRequester> = Arc::new(StubClient);
        let runtime = AgentRuntime::new(sessions, tools, providers, bus, cancels, states, skills, config, client);
        std::mem::forget(dir);
        runtime
    }

    fn parent_ctx(runtime: &AgentRuntime, session_id: &str) -> ToolContext {
        ToolContext::new(PathBuf::from("."), session_id, "main", "call-1", runtime.config.clone(), Arc::new(|_| {})).with_client(runtime_client())
    }

    fn runtime_client() -> Arc<dyn ClientRequester> {
        Arc::new(StubClient)
    }

    #[tokio::test]
    async fn sub_agent_runs_to_completion_and_returns_final_text() {
        let runtime = runtime_with_sub_agents_enabled();
        runtime.start_session("parent", SessionOptions::default()).unwrap();
        let ctx = parent_ctx(&runtime, "parent");

        let tool = SubAgentTool::new(runtime.clone());
        let output = tool.execute(json!({"task": "research something"}), &ctx).await.unwrap();
        match output {
            ToolOutput::Text(t) => assert_eq!(t, "delegated answer"),
            _ => panic!("expected text output"),
        }
    }

    #[tokio::test]
    async fn sub_agent_tool_is_disabled_without_the_feature_flag() {
        let runtime = runtime_with_sub_agents_enabled();
        let mut config = (*runtime.config).clone();
        config.features.sub_agents = false;
        let runtime = {
            let dir = tempfile::tempdir().unwrap();
            let sessions = Arc::new(SessionStore::open(dir.path()).unwrap());
            let tools = Arc::new(ToolRegistry::new());
            let providers = Arc::new(ProviderRegistry::new());
            let bus = Arc::new(EventBus::new());
            let cancels = Arc::new(CancelMap::new());
            let states = Arc::new(AgentStates::new());
            let skills = Arc::new(SkillsRegistry::empty());
            let client: Arc<dyn ClientRequester> = Arc::new(StubClient);
            std::mem::forget(dir);
            AgentRuntime::new(sessions, tools, providers, bus, cancels, states, skills, Arc::new(config), client)
        };
        runtime.start_session("parent", SessionOptions::default()).unwrap();
        let ctx = parent_ctx(&runtime, "parent");

        let tool = SubAgentTool::new(runtime.clone());
        let err = tool.execute(json!({"task": "x"}), &ctx).await.unwrap_err();
        assert_eq!(err.to_string().contains("sub_agents_disabled"), true);
    }

    #[tokio::test]
    async fn nested_sub_agents_are_rejected() {
        let runtime = runtime_with_sub_agents_enabled();
        let sub_state = crate::state::AgentState::new("child", "sub_agent", false);
        runtime.states.insert(sub_state);
        runtime.start_session("child", SessionOptions { is_top_level: false, ..Default::default() }).unwrap();
        let ctx = parent_ctx(&runtime, "child");

        let tool = SubAgentTool::new(runtime.clone());
        let err = tool.execute(json!({"task": "x"}), &ctx).await.unwrap_err();
        assert!(err.to_string().contains("nested"));
    }

    #[test]
    fn build_child_options_drops_sub_agent_and_ask_user() {
        let dir = tempfile::tempdir().unwrap();
        let sessions = Arc::new(SessionStore::open(dir.path()).unwrap());
        let tools = Arc::new(ToolRegistry::new());
        let providers = Arc::new(ProviderRegistry::new());
        let bus = Arc::new(EventBus::new());
        let cancels = Arc::new(CancelMap::new());
        let states = Arc::new(AgentStates::new());
        let skills = Arc::new(SkillsRegistry::empty());
        let config = Arc::new(Config::default());
        let client: Arc<dyn ClientRequester> = Arc::new(StubClient);
        let runtime = AgentRuntime::new(sessions, tools, providers, bus, cancels, states, skills, config, client);

        let parent_opts = SessionOptions::default();
        let child = build_child_options(&runtime, &parent_opts, None, None);
        assert!(!child.configured_tools.iter().any(|t| t == "sub_agent"));
        assert!(!child.configured_tools.iter().any(|t| t == "ask_user"));
        assert!(child.configured_tools.iter().any(|t| t == "ask_parent"));
        assert!(!child.is_top_level);
    }

    #[test]
    fn build_child_options_applies_named_agent_config() {
        let dir = tempfile::tempdir().unwrap();
        let sessions = Arc::new(SessionStore::open(dir.path()).unwrap());
        let tools = Arc::new(ToolRegistry::new());
        let providers = Arc::new(ProviderRegistry::new());
        let bus = Arc::new(EventBus::new());
        let cancels = Arc::new(CancelMap::new());
        let states = Arc::new(AgentStates::new());
        let skills = Arc::new(SkillsRegistry::empty());
        let mut config = Config::default();
        config.agents.insert(
            "researcher".to_string(),
            AgentConfig { system_prompt: Some("You research things.".to_string()), model: None, working_dir: None, tools: None },
        );
        let config = Arc::new(config);
        let client: Arc<dyn ClientRequester> = Arc::new(StubClient);
        let runtime = AgentRuntime::new(sessions, tools, providers, bus, cancels, states, skills, config, client);

        let parent_opts = SessionOptions::default();
        let child = build_child_options(&runtime, &parent_opts, Some("researcher"), None);
        assert_eq!(child.system_prompt, "You research things.");
    }
}
