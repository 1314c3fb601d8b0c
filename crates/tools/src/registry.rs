//! Name→[`Tool`] lookup. The active
//! subset for a given session is computed by
//! `opal_domain::config::ToolPolicy::active_tools`, a pure function kept
//! in `opal-domain` so it can be unit tested without any registry state;
//! this registry only resolves names to implementations.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::tool::Tool;

/// `register` takes `&self` (backed by a lock, not a bare `HashMap`) so a
/// tool that itself needs a handle to the runtime it's registered under
/// — `sub_agent` needs `Arc<AgentRuntime>`, which doesn't exist until
/// after the registry is already wrapped in the `Arc` `AgentRuntime::new`
/// takes — can be registered *after* construction, onto the very same
/// `Arc<ToolRegistry>` the runtime already holds.
#[derive(Default)]
pub struct ToolRegistry {
    tools: RwLock<HashMap<String, Arc<dyn Tool>>>,
}

impl Clone for ToolRegistry {
    fn clone(&self) -> Self {
        Self { tools: RwLock::new(self.tools.read().clone()) }
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { tools: RwLock::new(HashMap::new()) }
    }

    pub fn register(&self, tool: Arc<dyn Tool>) {
        self.tools.write().insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.read().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.read().contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.tools.read().keys().cloned().collect()
    }

    /// Resolve `active` names (already filtered by `ToolPolicy`) to their
    /// implementations, dropping any name the registry doesn't know
    /// about (logged, not fatal — a stale config entry must not break
    /// the agent).
    pub fn resolve(&self, active: &[String]) -> Vec<Arc<dyn Tool>> {
        active
            .iter()
            .filter_map(|name| {
                let tool = self.get(name);
                if tool.is_none() {
                    tracing::warn!(tool = %name, "configured tool not found in registry");
                }
                tool
            })
            .collect()
    }

    /// JSON-Schema tool definitions for the active set, in the shape a
    /// `Provider::chat`/`chat_stream` request expects.
    pub fn definitions(&self, active: &[String]) -> Vec<(String, String, serde_json::Value)> {
        self.resolve(active)
            .into_iter()
            .map(|t| (t.name().to_string(), t.description().to_string(), t.parameters()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool::ToolContext;
    use async_trait::async_trait;
    use opal_domain::error::Result;
    use opal_domain::message::ToolOutput;
    use serde_json::Value;

    struct Stub(&'static str);

    #[async_trait]
    impl Tool for Stub {
        fn name(&self) -> &str {
            self.0
        }
        fn description(&self) -> &str {
            "stub"
        }
        fn parameters(&self) -> Value {
            serde_json::json!({"type": "object"})
        }
        async fn execute(&self, _args: Value, _ctx: &ToolContext) -> Result<ToolOutput> {
            Ok(ToolOutput::Text("ok".into()))
        }
    }

    #[test]
    fn resolve_drops_unknown_names_without_failing() {
        let reg = ToolRegistry::new();
        reg.register(Arc::new(Stub("read_file")));
        let resolved = reg.resolve(&["read_file".to_string(), "nonexistent".to_string()]);
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].name(), "read_file");
    }

    #[test]
    fn definitions_carries_schema_through() {
        let reg = ToolRegistry::new();
        reg.register(Arc::new(Stub("read_file")));
        let defs = reg.definitions(&["read_file".to_string()]);
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].0, "read_file");
    }
}
