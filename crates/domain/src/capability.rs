use serde::{Deserialize, Serialize};

/// What a configured provider/model pair advertises. The registry
/// (`opal-providers`) uses this for role-based resolution rather than
/// hardcoding behavior per provider name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Capabilities {
    pub supports_tools: bool,
    pub supports_streaming: bool,
    pub supports_thinking: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_window_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            supports_tools: true,
            supports_streaming: true,
            supports_thinking: false,
            context_window_tokens: None,
            max_output_tokens: None,
        }
    }
}

/// Roles a model can be assigned to in config, consulted when a turn
/// doesn't pin an explicit provider/model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelRole {
    Executor,
    Summarizer,
}
