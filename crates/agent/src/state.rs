//! Per-session agent state.
//!
//! Long-lived, per-session state that persists across turns: status,
//! usage tracking, the steer queue, and which skills are currently
//! active — all the things a session needs remembered between one turn
//! ending and the next beginning.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use opal_domain::event::AgentStatus;

use crate::steer::SteerQueue;
use crate::usage::UsageTracker;

/// One session's live agent state. Constructed once per session (at
/// `session/start`) and held for the session's lifetime.
pub struct AgentState {
    pub session_id: String,
    pub agent_id: String,
    /// Top-level sessions get `ask_user`; sub-agent sessions get
    /// `ask_parent` instead.
    pub is_top_level: bool,
    status: AgentStatus,
    pub usage: UsageTracker,
    /// `Arc`-wrapped so the turn loop can hold a cloned handle across an
    /// `.await` without keeping this struct's own lock held — a
    /// `parking_lot::MutexGuard` on `AgentState` itself is never `Send`.
    pub steer: Arc<SteerQueue>,
    /// Skills activated so far this session; `use_skill` and
    /// auto-load both consult this to stay idempotent.
    active_skills: Vec<String>,
}

impl AgentState {
    pub fn new(session_id: impl Into<String>, agent_id: impl Into<String>, is_top_level: bool) -> Self {
        Self {
            session_id: session_id.into(),
            agent_id: agent_id.into(),
            is_top_level,
            status: AgentStatus::Idle,
            usage: UsageTracker::new(),
            steer: Arc::new(SteerQueue::new()),
            active_skills: Vec::new(),
        }
    }

    pub fn status(&self) -> AgentStatus {
        self.status
    }

    /// Set the authoritative status. The caller (the state machine) is
    /// responsible for only calling this at legal transitions; this
    /// type doesn't itself validate transition legality — a plain field
    /// machine-driven by the orchestrator, not self-enforcing.
    pub fn set_status(&mut self, status: AgentStatus) {
        self.status = status;
    }

    pub fn is_idle(&self) -> bool {
        self.status == AgentStatus::Idle
    }

    pub fn active_skills(&self) -> &[String] {
        &self.active_skills
    }

    pub fn has_skill(&self, name: &str) -> bool {
        self.active_skills.iter().any(|s| s == name)
    }

    /// Record a skill as active. Returns `false` if it was already active
    /// (an idempotent no-op in that case).
    pub fn activate_skill(&mut self, name: impl Into<String>) -> bool {
        let name = name.into();
        if self.has_skill(&name) {
            return false;
        }
        self.active_skills.push(name);
        true
    }
}

/// Thread-safe per-session registry of [`AgentState`], mirroring
/// [`crate::bus::EventBus`] and [`crate::cancel::CancelMap`]'s
/// constructor-injected-service shape.
#[derive(Default)]
pub struct AgentStates {
    states: Mutex<HashMap<String, Arc<Mutex<AgentState>>>>,
}

impl AgentStates {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the existing state for `session_id`, or create one (top-level
    /// by default) if absent.
    pub fn get_or_create(&self, session_id: &str) -> Arc<Mutex<AgentState>> {
        self.states
            .lock()
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(AgentState::new(session_id, "main", true))))
            .clone()
    }

    /// Register a fresh state explicitly (used for sub-agents, which need
    /// `is_top_level: false` and a distinct `agent_id`).
    pub fn insert(&self, state: AgentState) -> Arc<Mutex<AgentState>> {
        let session_id = state.session_id.clone();
        let handle = Arc::new(Mutex::new(state));
        self.states.lock().insert(session_id, handle.clone());
        handle
    }

    pub fn get(&self, session_id: &str) -> Option<Arc<Mutex<AgentState>>> {
        self.states.lock().get(session_id).cloned()
    }

    pub fn remove(&self, session_id: &str) -> Option<Arc<Mutex<AgentState>>> {
        self.states.lock().remove(session_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_state_starts_idle_with_no_active_skills() {
        let s = AgentState::new("s1", "main", true);
        assert!(s.is_idle());
        assert!(s.active_skills().is_empty());
    }

    #[test]
    fn activate_skill_is_idempotent() {
        let mut s = AgentState::new("s1", "main", true);
        assert!(s.activate_skill("git-helper"));
        assert!(!s.activate_skill("git-helper"));
        assert_eq!(s.active_skills(), &["git-helper".to_string()]);
    }

    #[test]
    fn status_transitions_are_observable() {
        let mut s = AgentState::new("s1", "main", true);
        s.set_status(AgentStatus::Running);
        assert_eq!(s.status(), AgentStatus::Running);
        assert!(!s.is_idle());
    }

    #[test]
    fn get_or_create_returns_the_same_handle_on_repeat_calls() {
        let states = AgentStates::new();
        let a = states.get_or_create("s1");
        let b = states.get_or_create("s1");
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn remove_drops_the_session() {
        let states = AgentStates::new();
        states.get_or_create("s1");
        assert!(states.get("s1").is_some());
        states.remove("s1");
        assert!(states.get("s1").is_none());
    }

    #[test]
    fn insert_allows_non_top_level_sub_agent_state() {
        let states = AgentStates::new();
        let sub = AgentState::new("sub-1", "researcher", false);
        states.insert(sub);
        let handle = states.get("sub-1").unwrap();
        assert!(!handle.lock().is_top_level);
    }
}
