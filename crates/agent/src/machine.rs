//! The turn-orchestration state machine.
//!
//! Grounded on `gateway/src/runtime/turn.rs`'s `run_turn`/`run_turn_inner`
//! (resolve provider → build request → stream → finalize → dispatch tools
//! → loop) and `gateway/src/runtime/mod.rs`'s `resolve_provider`, adapted
//! from a single HTTP-request-scoped run into a long-lived, multi-turn loop
//! that owns a session for as long as it keeps producing tool calls, steer
//! messages, or overflow recoveries.
//!
//! [`AgentRuntime`] is the one constructor-injected service the RPC layer
//! (`opal-rpc`) drives: every shared collaborator (sessions, tools,
//! providers, the event bus, cancellation, per-session state, skills,
//! config, and the client-requester trait object) is an explicit field,
//! never a singleton.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use parking_lot::Mutex as PLMutex;
use uuid::Uuid;

use opal_domain::chat::ChatMessage;
use opal_domain::config::{Config, ToolPolicy};
use opal_domain::error::{Error, Result};
use opal_domain::event::{AgentEvent, AgentStatus};
use opal_domain::message::{Message, Role, ToolCall};
use opal_domain::stream::ProviderStreamEvent;

use opal_providers::traits::{ChatRequest, ToolDefinition};
use opal_providers::{backoff, classifier, Provider, ProviderRegistry};

use opal_sessions::SessionStore;

use opal_skills::registry::SkillsRegistry;

use opal_tools::registry::ToolRegistry;
use opal_tools::tool::{ClientRequester, ParentLink, SkillActivator, ToolContext};

use crate::bus::EventBus;
use crate::cancel::{CancelMap, CancelToken};
use crate::compactor;
use crate::state::{AgentState, AgentStates};
use crate::tool_runner::{self, ToolRunner};

/// How long the Streaming state tolerates silence from the provider
/// before emitting an informational `stream_stalled` event.
const STREAM_STALL_WATCHDOG: Duration = Duration::from_secs(10);

/// Bound on tool-calling round trips within a single `agent/prompt` before
/// giving up rather than looping forever against a model that never stops
/// calling tools.
const MAX_TOOL_LOOPS: u32 = 25;

/// Per-session configuration that doesn't belong on [`AgentState`] (which
/// is deliberately minimal and already covered by its own test suite):
/// system prompt, model/provider pin, working directory, and the
/// session's configured tool list.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub agent_id: String,
    pub is_top_level: bool,
    pub system_prompt: String,
    pub provider_id: Option<String>,
    pub model_id: Option<String>,
    /// Thinking/reasoning-effort level pinned for this session. Purely
    /// advisory at this layer — providers that support it read it back
    /// out of the request; ones that don't simply ignore it.
    pub thinking_level: Option<String>,
    pub working_dir: PathBuf,
    pub configured_tools: Vec<String>,
    pub disabled_tools: HashSet<String>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            agent_id: "main".to_string(),
            is_top_level: true,
            system_prompt: String::new(),
            provider_id: None,
            model_id: None,
            thinking_level: None,
            working_dir: PathBuf::from("."),
            configured_tools: vec!["use_skill".to_string(), "ask_user".to_string(), "sub_agent".to_string()],
            disabled_tools: HashSet::new(),
        }
    }
}

/// What [`AgentRuntime::prompt`] actually did — started a new turn loop,
/// or queued the text onto an already-running session's steer queue
///.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptOutcome {
    Started,
    Queued,
}

/// The outcome of one attempted model turn.
enum TurnAttempt {
    Completed { text: String, thinking: Option<String>, tool_calls: Vec<ToolCall>, usage: Option<opal_domain::stream::Usage> },
    /// The provider reported (via error or usage) that the request
    /// overflowed the model's context window before or during the
    /// attempt —  path 1/2. No assistant message was produced.
    Overflow,
    Aborted,
    Fatal(String),
}

/// The central, constructor-injected service the turn loop and sub-agent
/// spawner both operate against.
pub struct AgentRuntime {
    pub sessions: Arc<SessionStore>,
    pub tools: Arc<ToolRegistry>,
    pub providers: Arc<ProviderRegistry>,
    pub bus: Arc<EventBus>,
    pub cancels: Arc<CancelMap>,
    pub states: Arc<AgentStates>,
    pub skills: Arc<SkillsRegistry>,
    pub config: Arc<Config>,
    client: Arc<dyn ClientRequester>,
    tool_runner: ToolRunner,
    options: PLMutex<HashMap<String, SessionOptions>>,
    /// Sub-agent session id → the bridge forwarding its `ask_parent`
    /// calls to the parent's in-flight `sub_agent` tool invocation
    ///. Populated/cleared by [`crate::sub_agent`].
    parent_links: PLMutex<HashMap<String, Arc<dyn ParentLink>>>,
}

impl AgentRuntime {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        sessions: Arc<SessionStore>,
        tools: Arc<ToolRegistry>,
        providers: Arc<ProviderRegistry>,
        bus: Arc<EventBus>,
        cancels: Arc<CancelMap>,
        states: Arc<AgentStates>,
        skills: Arc<SkillsRegistry>,
        config: Arc<Config>,
        client: Arc<dyn ClientRequester>,
    ) -> Arc<Self> {
        let tool_runner = ToolRunner::new(tools.clone());
        Arc::new(Self {
            sessions,
            tools,
            providers,
            bus,
            cancels,
            states,
            skills,
            config,
            client,
            tool_runner,
            options: PLMutex::new(HashMap::new()),
            parent_links: PLMutex::new(HashMap::new()),
        })
    }

    /// Register a fresh session: persists/loads its transcript, creates
    /// in-memory agent state, and records its options. Returns whether the session's transcript is new.
    pub fn start_session(&self, session_id: &str, opts: SessionOptions) -> Result<bool> {
        let is_new = self.sessions.get_or_create(session_id)?;
        let state = AgentState::new(session_id, opts.agent_id.clone(), opts.is_top_level);
        self.states.insert(state);
        self.options.lock().insert(session_id.to_string(), opts);
        Ok(is_new)
    }

    /// Tear a session down: cancel anything in flight, drop in-memory
    /// state, and close its event channel.
    pub fn close_session(&self, session_id: &str) {
        self.cancels.cancel(session_id);
        self.cancels.remove(session_id);
        self.states.remove(session_id);
        self.options.lock().remove(session_id);
        self.bus.remove(session_id);
    }

    pub fn session_options(&self, session_id: &str) -> SessionOptions {
        self.options.lock().get(session_id).cloned().unwrap_or_default()
    }

    /// Pin a session's provider/model. No-op
    /// beyond the update itself — the next turn's `resolve_provider` call
    /// picks the new pin up naturally.
    pub fn set_model(&self, session_id: &str, provider_id: String, model_id: String) -> Result<()> {
        let mut options = self.options.lock();
        let opts = options.get_mut(session_id).ok_or_else(|| Error::SessionNotFound(session_id.to_string()))?;
        opts.provider_id = Some(provider_id);
        opts.model_id = Some(model_id);
        Ok(())
    }

    /// Set a session's thinking/reasoning-effort level.
    pub fn set_thinking(&self, session_id: &str, level: String) -> Result<()> {
        let mut options = self.options.lock();
        let opts = options.get_mut(session_id).ok_or_else(|| Error::SessionNotFound(session_id.to_string()))?;
        opts.thinking_level = Some(level);
        Ok(())
    }

    pub fn status(&self, session_id: &str) -> Option<AgentStatus> {
        self.states.get(session_id).map(|s| s.lock().status())
    }

    /// Send user text to a session: starts a
    /// new turn loop if the session is idle, otherwise queues it onto the
    /// steer queue for the in-flight turn to pick up at its next boundary.
    pub fn prompt(self: &Arc<Self>, session_id: &str, text: String) -> Result<PromptOutcome> {
        let state = self.states.get(session_id).ok_or_else(|| Error::SessionNotFound(session_id.to_string()))?;

        let idle = state.lock().is_idle();
        if !idle {
            state.lock().steer.push(text.clone());
            self.bus.publish(session_id, AgentEvent::MessageQueued { text });
            return Ok(PromptOutcome::Queued);
        }

        self.sessions.append(session_id, Message::user(Uuid::new_v4().to_string(), text))?;
        self.bus.publish(session_id, AgentEvent::AgentStart);

        let cancel = self.cancels.register(session_id);
        let runtime = Arc::clone(self);
        let sid = session_id.to_string();
        tokio::spawn(async move { runtime.run_turn_loop(sid, cancel).await });
        Ok(PromptOutcome::Started)
    }

    /// Abort the in-flight turn for a session, if any. Cascades to any sub-agent children via
    /// [`CancelMap::cancel`].
    pub fn abort(&self, session_id: &str) -> bool {
        self.cancels.cancel(session_id)
    }

    /// Force a compaction pass regardless of the usage-threshold check
    ///, using the routine
    /// `auto_compact_keep_fraction` rather than the more aggressive
    /// overflow-recovery one. Returns `None` if the session's current
    /// path is empty — there's nothing to compact.
    pub async fn force_compact(&self, session_id: &str) -> Result<compactor::CompactionOutcome> {
        let opts = self.session_options(session_id);
        let provider = self.providers.resolve(opts.provider_id.as_deref(), Some(opal_domain::capability::ModelRole::Executor))?;
        let path = self.sessions.current_path(session_id)?;
        let context_window = self.context_window(&provider);
        let keep_tokens = (context_window as f64 * self.config.compaction.auto_compact_keep_fraction) as u64;

        self.bus.publish(session_id, AgentEvent::CompactionStart { n_messages: path.len() });
        let outcome = compactor::run_compaction(provider.as_ref(), &path, keep_tokens).await?;
        let Some(outcome) = outcome else {
            return Err(Error::Other("nothing to compact".to_string()));
        };

        self.sessions.compact(session_id, outcome.summary.clone(), outcome.tail.clone())?;
        if let Some(state) = self.states.get(session_id) {
            state.lock().usage.reset_after_compaction(outcome.new_n);
        }
        self.bus.publish(session_id, AgentEvent::CompactionEnd { old_n: outcome.old_n, new_n: outcome.new_n });
        Ok(outcome)
    }

    pub(crate) fn register_parent_link(&self, session_id: &str, link: Arc<dyn ParentLink>) {
        self.parent_links.lock().insert(session_id.to_string(), link);
    }

    pub(crate) fn remove_parent_link(&self, session_id: &str) {
        self.parent_links.lock().remove(session_id);
    }

    fn parent_link(&self, session_id: &str) -> Option<Arc<dyn ParentLink>> {
        self.parent_links.lock().get(session_id).cloned()
    }

    fn context_window(&self, provider: &Arc<dyn Provider>) -> u64 {
        provider.capabilities().context_window_tokens.map(|c| c as u64).unwrap_or(self.config.compaction.default_context_window_tokens)
    }

    fn system_prompt_for(&self, opts: &SessionOptions) -> String {
        let mut prompt = opts.system_prompt.clone();
        if self.config.features.skills {
            let index = self.skills.render_ready_index();
            if !index.is_empty() {
                if !prompt.is_empty() {
                    prompt.push_str("\n\n");
                }
                prompt.push_str("Available skills:\n");
                prompt.push_str(&index);
            }
        }
        prompt
    }

    fn to_chat_messages(system_prompt: &str, path: &[Message]) -> Vec<ChatMessage> {
        let mut out = Vec::with_capacity(path.len() + 1);
        if !system_prompt.is_empty() {
            out.push(ChatMessage::system(system_prompt));
        }
        for m in path {
            match m.role {
                Role::User => out.push(ChatMessage::user(m.content.clone())),
                Role::System => out.push(ChatMessage::system(m.content.clone())),
                Role::Assistant => out.push(ChatMessage::assistant_with_tool_calls(m.content.clone(), &m.tool_calls)),
                Role::ToolCall => out.push(ChatMessage::assistant(m.content.clone())),
                Role::ToolResult => {
                    let call_id = m.call_id.clone().unwrap_or_default();
                    out.push(ChatMessage::tool_result(call_id, m.content.clone(), m.is_error));
                }
            }
        }
        out
    }

    fn build_tool_context(self: &Arc<Self>, session_id: &str, opts: &SessionOptions, call: &ToolCall) -> ToolContext {
        let bus = self.bus.clone();
        let emit_session = session_id.to_string();
        let call_id = call.call_id.clone();
        let tool_name = call.tool_name.clone();
        let emit = Arc::new(move |chunk: String| {
            bus.publish(&emit_session, AgentEvent::ToolOutput { tool: tool_name.clone(), call_id: call_id.clone(), chunk });
        });

        let mut ctx = ToolContext::new(opts.working_dir.clone(), session_id, opts.agent_id.clone(), call.call_id.clone(), self.config.clone(), emit);
        ctx = ctx.with_skills(Arc::clone(self) as Arc<dyn SkillActivator>);
        if opts.is_top_level {
            ctx = ctx.with_client(self.client.clone());
        } else if let Some(parent) = self.parent_link(session_id) {
            ctx = ctx.with_parent(parent);
        }
        ctx
    }

    /// Pre-turn auto-compact check: if the hybrid estimate
    /// exceeds the configured threshold, compact before building this
    /// turn's request.
    async fn maybe_auto_compact(&self, session_id: &str, provider: &Arc<dyn Provider>) {
        let Some(state) = self.states.get(session_id) else { return };
        let Ok(path) = self.sessions.current_path(session_id) else { return };
        let context_window = self.context_window(provider);

        let should = state.lock().usage.should_auto_compact(&path, context_window, self.config.compaction.auto_compact_threshold);
        if !should {
            return;
        }

        self.bus.publish(session_id, AgentEvent::CompactionStart { n_messages: path.len() });
        let keep_tokens = (context_window as f64 * self.config.compaction.auto_compact_keep_fraction) as u64;
        match compactor::run_compaction(provider.as_ref(), &path, keep_tokens).await {
            Ok(Some(outcome)) => {
                let (old_n, new_n) = (outcome.old_n, outcome.new_n);
                if self.sessions.compact(session_id, outcome.summary, outcome.tail).is_ok() {
                    state.lock().usage.reset_after_compaction(new_n);
                    self.bus.publish(session_id, AgentEvent::CompactionEnd { old_n, new_n });
                }
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(session_id, error = %e, "auto-compaction failed"),
        }
    }

    /// Aggressive overflow-recovery compaction.
    async fn run_overflow_recovery(&self, session_id: &str, provider: &Arc<dyn Provider>) {
        let Ok(path) = self.sessions.current_path(session_id) else { return };
        self.bus.publish(session_id, AgentEvent::CompactionStart { n_messages: path.len() });
        let context_window = self.context_window(provider);
        let keep_tokens = (context_window as f64 * self.config.compaction.overflow_keep_fraction) as u64;

        match compactor::run_compaction(provider.as_ref(), &path, keep_tokens).await {
            Ok(Some(outcome)) => {
                let (old_n, new_n) = (outcome.old_n, outcome.new_n);
                if self.sessions.compact(session_id, outcome.summary, outcome.tail).is_ok() {
                    if let Some(state) = self.states.get(session_id) {
                        state.lock().usage.reset_after_compaction(new_n);
                    }
                    self.bus.publish(session_id, AgentEvent::CompactionEnd { old_n, new_n });
                }
                self.bus.publish(session_id, AgentEvent::AgentRecovered);
            }
            Ok(None) => {
                self.bus.publish(session_id, AgentEvent::AgentRecovered);
            }
            Err(e) => {
                self.bus.publish(session_id, AgentEvent::Error { reason: e.to_string() });
            }
        }
    }

    /// Attempt one model turn end to end: resolve the stream, consume it
    /// with retry/backoff on transient failures, and classify fatal vs.
    /// overflow vs. cancelled outcomes.
    async fn attempt_turn(&self, session_id: &str, provider: Arc<dyn Provider>, req: ChatRequest, cancel: &CancelToken) -> TurnAttempt {
        let retry_cfg = &self.config.retry;
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            if cancel.is_cancelled() {
                return TurnAttempt::Aborted;
            }

            let mut stream = match provider.chat_stream(req.clone()).await {
                Ok(s) => s,
                Err(e) => {
                    let msg = e.to_string();
                    if classifier::is_overflow_error(&msg) {
                        return TurnAttempt::Overflow;
                    }
                    if classifier::is_retryable_error(&msg) && attempt < retry_cfg.max_attempts {
                        tokio::time::sleep(backoff::backoff_delay(retry_cfg, attempt)).await;
                        continue;
                    }
                    return TurnAttempt::Fatal(msg);
                }
            };

            if let Some(state) = self.states.get(session_id) {
                state.lock().set_status(AgentStatus::Streaming);
            }

            let mut parser = crate::stream_parser::StreamParser::new();
            let mut retry_stream = false;

            loop {
                if cancel.is_cancelled() {
                    return TurnAttempt::Aborted;
                }

                match tokio::time::timeout(STREAM_STALL_WATCHDOG, stream.next()).await {
                    Ok(Some(Ok(ProviderStreamEvent::Error { message }))) => {
                        if classifier::is_overflow_error(&message) {
                            return TurnAttempt::Overflow;
                        }
                        if classifier::is_retryable_error(&message) && attempt < retry_cfg.max_attempts {
                            retry_stream = true;
                            break;
                        }
                        return TurnAttempt::Fatal(message);
                    }
                    Ok(Some(Ok(event))) => {
                        for ev in parser.handle_event(event) {
                            self.bus.publish(session_id, ev);
                        }
                    }
                    Ok(Some(Err(e))) => {
                        let msg = e.to_string();
                        if classifier::is_overflow_error(&msg) {
                            return TurnAttempt::Overflow;
                        }
                        if classifier::is_retryable_error(&msg) && attempt < retry_cfg.max_attempts {
                            retry_stream = true;
                            break;
                        }
                        return TurnAttempt::Fatal(msg);
                    }
                    Ok(None) => break,
                    Err(_) => {
                        self.bus.publish(session_id, AgentEvent::StreamStalled);
                    }
                }
            }

            if retry_stream {
                tokio::time::sleep(backoff::backoff_delay(retry_cfg, attempt)).await;
                continue;
            }

            let (text, thinking, tool_calls, usage) = parser.finalize();
            return TurnAttempt::Completed { text, thinking, tool_calls, usage };
        }
    }

    /// The full multi-turn lifecycle for one `agent/prompt` invocation
    ///: loops across tool-call round trips, steer drains, and
    /// overflow recoveries until the session genuinely has nothing left
    /// to do, then returns to Idle.
    async fn run_turn_loop(self: Arc<Self>, session_id: String, cancel: CancelToken) {
        let Some(state) = self.states.get(&session_id) else { return };
        let mut tool_loops = 0u32;

        'turn_loop: loop {
            if cancel.is_cancelled() {
                self.bus.publish(&session_id, AgentEvent::AgentAbort);
                state.lock().set_status(AgentStatus::Idle);
                break;
            }

            state.lock().set_status(AgentStatus::Running);

            let opts = self.session_options(&session_id);
            let provider = match self.providers.resolve(opts.provider_id.as_deref(), Some(opal_domain::capability::ModelRole::Executor)) {
                Ok(p) => p,
                Err(e) => {
                    self.bus.publish(&session_id, AgentEvent::Error { reason: e.to_string() });
                    state.lock().set_status(AgentStatus::Idle);
                    break;
                }
            };

            self.maybe_auto_compact(&session_id, &provider).await;

            let path = match self.sessions.current_path(&session_id) {
                Ok(p) => p,
                Err(e) => {
                    self.bus.publish(&session_id, AgentEvent::Error { reason: e.to_string() });
                    state.lock().set_status(AgentStatus::Idle);
                    break;
                }
            };

            let active_tools =
                ToolPolicy::active_tools(&opts.configured_tools, &opts.disabled_tools, &self.config.features, self.config.features.skills, opts.is_top_level);
            let tool_defs = self
                .tools
                .definitions(&active_tools)
                .into_iter()
                .map(|(name, description, parameters)| ToolDefinition { name, description, parameters })
                .collect();

            let req = ChatRequest {
                messages: Self::to_chat_messages(&self.system_prompt_for(&opts), &path),
                tools: tool_defs,
                temperature: None,
                max_tokens: None,
                json_mode: false,
                model: opts.model_id.clone(),
            };

            match self.attempt_turn(&session_id, provider.clone(), req, &cancel).await {
                TurnAttempt::Aborted => {
                    self.bus.publish(&session_id, AgentEvent::AgentAbort);
                    state.lock().set_status(AgentStatus::Idle);
                    break;
                }
                TurnAttempt::Fatal(reason) => {
                    self.bus.publish(&session_id, AgentEvent::Error { reason });
                    state.lock().set_status(AgentStatus::Idle);
                    break;
                }
                TurnAttempt::Overflow => {
                    self.run_overflow_recovery(&session_id, &provider).await;
                    continue 'turn_loop;
                }
                TurnAttempt::Completed { text, thinking, tool_calls, usage } => {
                    let assistant_msg = Message::assistant(Uuid::new_v4().to_string(), text, thinking, tool_calls.clone());
                    if self.sessions.append(&session_id, assistant_msg.clone()).is_err() {
                        state.lock().set_status(AgentStatus::Idle);
                        break;
                    }

                    if let Some(usage) = usage {
                        let new_path_len = path.len() + 1;
                        let mut guard = state.lock();
                        guard.usage.record_usage(usage, new_path_len);
                        guard.usage.check_usage_overflow(self.context_window(&provider));
                    }

                    if state.lock().usage.take_overflow() {
                        self.run_overflow_recovery(&session_id, &provider).await;
                        continue 'turn_loop;
                    }

                    if !tool_calls.is_empty() {
                        tool_loops += 1;
                        if tool_loops > MAX_TOOL_LOOPS {
                            self.bus.publish(&session_id, AgentEvent::Error { reason: "tool loop limit exceeded".to_string() });
                            state.lock().set_status(AgentStatus::Idle);
                            break;
                        }

                        self.bus.publish(&session_id, AgentEvent::TurnEnd { message: assistant_msg });
                        state.lock().set_status(AgentStatus::ExecutingTools);
                        let steer = state.lock().steer.clone();
                        let opts_for_ctx = opts.clone();
                        let sid_for_ctx = session_id.clone();
                        let ctx_for = |call: &ToolCall| self.build_tool_context(&sid_for_ctx, &opts_for_ctx, call);

                        let results = self.tool_runner.run(&tool_calls, ctx_for, &self.bus, &session_id, &cancel, &steer).await;

                        for (call, result) in &results {
                            let msg = Message::tool_result(
                                Uuid::new_v4().to_string(),
                                call.call_id.clone(),
                                call.tool_name.clone(),
                                result.as_text(),
                                result.is_error(),
                            );
                            let _ = self.sessions.append(&session_id, msg);
                        }

                        if cancel.is_cancelled() {
                            self.bus.publish(&session_id, AgentEvent::AgentAbort);
                            state.lock().set_status(AgentStatus::Idle);
                            break;
                        }

                        for (call, result) in &results {
                            if result.is_error() {
                                continue;
                            }
                            if let Some(path) = tool_runner::triggering_path(call) {
                                let active = state.lock().active_skills().to_vec();
                                for matched in self.skills.matching_for_path(&path, &active) {
                                    let _ = self.activate(&session_id, &matched.name).await;
                                }
                            }
                        }

                        let queued = state.lock().steer.drain();
                        for text in queued {
                            let _ = self.sessions.append(&session_id, Message::user(Uuid::new_v4().to_string(), text.clone()));
                            self.bus.publish(&session_id, AgentEvent::MessageApplied { text });
                        }

                        continue 'turn_loop;
                    }

                    let queued = state.lock().steer.drain();
                    if !queued.is_empty() {
                        for text in queued {
                            let _ = self.sessions.append(&session_id, Message::user(Uuid::new_v4().to_string(), text.clone()));
                            self.bus.publish(&session_id, AgentEvent::MessageApplied { text });
                        }
                        continue 'turn_loop;
                    }

                    let final_usage = state.lock().usage.cumulative();
                    self.bus.publish(&session_id, AgentEvent::AgentEnd { usage: Some(final_usage) });
                    state.lock().set_status(AgentStatus::Idle);

                    if self.config.sessions.auto_title && self.sessions.title(&session_id).is_none() {
                        if let Some(first_user) = self.sessions.current_path(&session_id).ok().and_then(|p| p.into_iter().find(|m| m.role == Role::User)) {
                            let title: String = first_user.content.chars().take(60).collect();
                            let _ = self.sessions.set_title(&session_id, title);
                        }
                    }
                    break;
                }
            }
        }

        self.cancels.remove(&session_id);
    }
}

/// Skill activation: append the skill's doc as a
/// synthetic `[System]` user message and broadcast `skill_loaded`, once
/// per skill per session.
#[async_trait]
impl SkillActivator for AgentRuntime {
    async fn activate(&self, session_id: &str, skill_name: &str) -> Result<bool> {
        let state = self.states.get(session_id).ok_or_else(|| Error::SessionNotFound(session_id.to_string()))?;
        let freshly = state.lock().activate_skill(skill_name);
        if !freshly {
            return Ok(false);
        }

        let doc = self.skills.read_doc(skill_name)?;
        let msg = Message::user(Uuid::new_v4().to_string(), format!("[System] Skill '{skill_name}' activated:\n\n{doc}"));
        self.sessions.append(session_id, msg)?;

        let description = self.skills.list().into_iter().find(|e| e.name == skill_name).map(|e| e.description).unwrap_or_default();
        self.bus.publish(session_id, AgentEvent::SkillLoaded { name: skill_name.to_string(), description });
        Ok(true)
    }
}
