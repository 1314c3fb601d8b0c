//! The `Tool` interface and the
//! per-invocation context it executes under.
//!
//! Concrete tool implementations (shell, read, edit, grep, tasks, debug)
//! are explicitly out of core scope — this crate only defines
//! the trait, the registry, and the three built-in orchestration tools
//! (`use_skill`, `ask_user`, `ask_parent`) that the core itself requires.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use opal_domain::error::Result;
use opal_domain::message::ToolOutput;

/// Asks the connected client a question and blocks for the answer via
/// `client/ask_user`. Implemented by the RPC layer, which
/// this crate cannot depend on directly — wired in via [`ToolContext`]
/// as a trait object to keep the dependency graph acyclic.
#[async_trait]
pub trait ClientRequester: Send + Sync {
    async fn ask_user(&self, session_id: &str, question: &str, choices: &[String]) -> Result<String>;
}

/// Activates a skill by name, appending its instructions to the session
/// as a synthetic `[System]`-prefixed user message and broadcasting
/// `skill_loaded`. Implemented by `opal-agent`.
#[async_trait]
pub trait SkillActivator: Send + Sync {
    /// Returns `true` if the skill was freshly activated, `false` if it
    /// was already active.
    async fn activate(&self, session_id: &str, skill_name: &str) -> Result<bool>;
}

/// Forwards an `ask_parent` question from a sub-agent's in-flight tool
/// task up to the parent's in-flight tool task, then blocks on the
/// parent's reply.
#[async_trait]
pub trait ParentLink: Send + Sync {
    async fn ask_parent(&self, question: &str) -> Result<String>;
}

/// Per-invocation context a tool executes under:
/// working dir, session id, config, the agent's own identity, the call
/// id, and an `emit` callback for `tool_output` streaming chunks.
#[derive(Clone)]
pub struct ToolContext {
    pub working_dir: PathBuf,
    pub session_id: String,
    pub agent_id: String,
    pub call_id: String,
    pub config: Arc<opal_domain::config::Config>,
    emit: Arc<dyn Fn(String) + Send + Sync>,
    pub client: Option<Arc<dyn ClientRequester>>,
    pub skills: Option<Arc<dyn SkillActivator>>,
    pub parent: Option<Arc<dyn ParentLink>>,
}

impl ToolContext {
    pub fn new(
        working_dir: PathBuf,
        session_id: impl Into<String>,
        agent_id: impl Into<String>,
        call_id: impl Into<String>,
        config: Arc<opal_domain::config::Config>,
        emit: Arc<dyn Fn(String) + Send + Sync>,
    ) -> Self {
        Self {
            working_dir,
            session_id: session_id.into(),
            agent_id: agent_id.into(),
            call_id: call_id.into(),
            config,
            emit,
            client: None,
            skills: None,
            parent: None,
        }
    }

    pub fn with_client(mut self, client: Arc<dyn ClientRequester>) -> Self {
        self.client = Some(client);
        self
    }

    pub fn with_skills(mut self, skills: Arc<dyn SkillActivator>) -> Self {
        self.skills = Some(skills);
        self
    }

    pub fn with_parent(mut self, parent: Arc<dyn ParentLink>) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Broadcast a `tool_output` chunk for this call.
    pub fn emit(&self, chunk: impl Into<String>) {
        (self.emit)(chunk.into());
    }
}

/// A tool the model can call. The active set is a pure function of
/// configured tools, disabled names, enabled features, and the working
/// session — see [`crate::registry::ToolRegistry`].
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    /// JSON Schema describing the tool's arguments object.
    fn parameters(&self) -> Value;
    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<ToolOutput>;
    /// Human-readable summary of a call for display.
    /// Default renders nothing; tools with a natural one-line summary
    /// (e.g. "path/to/file.txt") should override this.
    fn meta(&self, _args: &Value) -> String {
        String::new()
    }
}
