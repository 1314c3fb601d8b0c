//! Declarative configuration and feature gating. Every
//! section derives `Default` and is `#[serde(default)]` on the parent so a
//! partial or absent config file still produces a fully usable
//! configuration.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
    #[serde(default)]
    pub features: FeaturesConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub skills: SkillsConfig,
    #[serde(default)]
    pub sessions: SessionsConfig,
    #[serde(default)]
    pub compaction: CompactionConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub sub_agent: SubAgentConfig,
    #[serde(default)]
    pub mcp: McpConfig,
    /// Sub-agent definitions, keyed by agent id.
    #[serde(default)]
    pub agents: HashMap<String, AgentConfig>,
}

impl Config {
    /// Load from `path`, falling back to an all-default configuration if
    /// the file is absent or fails to parse — config problems must never
    /// abort startup, only degrade to defaults with a logged warning.
    pub fn load_or_default(path: &std::path::Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(raw) => match toml::from_str(&raw) {
                Ok(cfg) => cfg,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "failed to parse config, using defaults");
                    Config::default()
                }
            },
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "config file not found, using defaults");
                Config::default()
            }
        }
    }

    /// Resolve the state directory: `OPAL_DATA_DIR` env var, then
    /// `data_dir` from config, then `~/.opal`.
    pub fn resolve_data_dir(&self) -> PathBuf {
        if let Ok(v) = std::env::var("OPAL_DATA_DIR") {
            return PathBuf::from(v);
        }
        if let Some(d) = &self.data_dir {
            return d.clone();
        }
        dirs_home().join(".opal")
    }
}

fn dirs_home() -> PathBuf {
    std::env::var("HOME").map(PathBuf::from).unwrap_or_else(|_| PathBuf::from("."))
}

/// Declarative feature gating.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeaturesConfig {
    #[serde(default)]
    pub sub_agents: bool,
    #[serde(default = "t")]
    pub skills: bool,
    #[serde(default)]
    pub mcp: bool,
    #[serde(default)]
    pub debug: bool,
}

impl Default for FeaturesConfig {
    fn default() -> Self {
        Self { sub_agents: false, skills: true, mcp: false, debug: false }
    }
}

fn t() -> bool {
    true
}

/// Per-tool enable/disable on top of feature gating.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ToolsConfig {
    #[serde(default)]
    pub disabled: HashSet<String>,
}

/// A pure function of configured tools, disabled names, enabled features,
/// and whether this is the top-level agent. Kept free of any I/O or runtime state so it is unit
/// testable in isolation.
pub struct ToolPolicy;

impl ToolPolicy {
    pub fn active_tools(
        configured: &[String],
        disabled: &HashSet<String>,
        features: &FeaturesConfig,
        has_skills: bool,
        is_top_level: bool,
    ) -> Vec<String> {
        configured
            .iter()
            .filter(|name| !disabled.contains(name.as_str()))
            .filter(|name| match name.as_str() {
                "sub_agent" => features.sub_agents,
                "use_skill" => has_skills,
                "ask_user" => is_top_level,
                _ => true,
            })
            .cloned()
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SkillsConfig {
    #[serde(default)]
    pub root: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionsConfig {
    #[serde(default = "t")]
    pub auto_save: bool,
    #[serde(default = "t")]
    pub auto_title: bool,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self { auto_save: true, auto_title: true }
    }
}

/// Auto-compaction and overflow-recovery tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompactionConfig {
    /// Fallback context window, used when the active model doesn't
    /// advertise one via `Capabilities::context_window_tokens`.
    #[serde(default = "d_context_window")]
    pub default_context_window_tokens: u64,
    /// Auto-compact fires once the hybrid estimate exceeds this fraction
    /// of the context window.
    #[serde(default = "d_auto_compact_threshold")]
    pub auto_compact_threshold: f64,
    /// Fraction of the context window to keep (recent tail) after a
    /// routine auto-compact.
    #[serde(default = "d_auto_compact_keep_fraction")]
    pub auto_compact_keep_fraction: f64,
    /// Fraction of the context window to keep after an overflow-recovery
    /// compaction — more aggressive than routine auto-compact.
    #[serde(default = "d_overflow_keep_fraction")]
    pub overflow_keep_fraction: f64,
}

fn d_context_window() -> u64 {
    128_000
}
fn d_auto_compact_threshold() -> f64 {
    0.8
}
fn d_auto_compact_keep_fraction() -> f64 {
    0.25
}
fn d_overflow_keep_fraction() -> f64 {
    0.2
}

impl Default for CompactionConfig {
    fn default() -> Self {
        Self {
            default_context_window_tokens: d_context_window(),
            auto_compact_threshold: d_auto_compact_threshold(),
            auto_compact_keep_fraction: d_auto_compact_keep_fraction(),
            overflow_keep_fraction: d_overflow_keep_fraction(),
        }
    }
}

/// Retry/backoff tuning. Jitter coefficients are left
/// configurable per DESIGN.md's Open Question decision rather than
/// hardcoded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "d_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "d_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "d_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "d_jitter_min")]
    pub jitter_min: f64,
    #[serde(default = "d_jitter_max")]
    pub jitter_max: f64,
}

fn d_max_attempts() -> u32 {
    5
}
fn d_base_delay_ms() -> u64 {
    1000
}
fn d_max_delay_ms() -> u64 {
    30_000
}
fn d_jitter_min() -> f64 {
    0.5
}
fn d_jitter_max() -> f64 {
    1.5
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: d_max_attempts(),
            base_delay_ms: d_base_delay_ms(),
            max_delay_ms: d_max_delay_ms(),
            jitter_min: d_jitter_min(),
            jitter_max: d_jitter_max(),
        }
    }
}

/// Sub-agent dispatch tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubAgentConfig {
    #[serde(default = "d_sub_agent_timeout")]
    pub timeout_secs: u64,
}

fn d_sub_agent_timeout() -> u64 {
    120
}

impl Default for SubAgentConfig {
    fn default() -> Self {
        Self { timeout_secs: d_sub_agent_timeout() }
    }
}

/// A single sub-agent definition`).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AgentConfig {
    #[serde(default)]
    pub system_prompt: Option<String>,
    #[serde(default)]
    pub model: Option<ModelRef>,
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
    #[serde(default)]
    pub tools: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelRef {
    pub provider: String,
    pub id: String,
    #[serde(default)]
    pub thinking_level: Option<String>,
}

// ── MCP configuration ───────────────────────────────────────────────
//
// Canonical definitions live here so `opal-mcp` can re-export them without
// creating a dependency cycle between the config tree and the MCP client.

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct McpConfig {
    #[serde(default)]
    pub servers: Vec<McpServerConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpServerConfig {
    pub id: String,
    #[serde(default)]
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub transport: McpTransportKind,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum McpTransportKind {
    #[default]
    Stdio,
    Sse,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_parses_to_all_defaults() {
        let cfg: Config = toml::from_str("").unwrap();
        assert!(cfg.features.skills);
        assert!(!cfg.features.sub_agents);
        assert_eq!(cfg.retry.max_attempts, 5);
        assert_eq!(cfg.compaction.auto_compact_threshold, 0.8);
    }

    #[test]
    fn partial_config_overrides_only_named_fields() {
        let raw = r#"
            [features]
            sub_agents = true
        "#;
        let cfg: Config = toml::from_str(raw).unwrap();
        assert!(cfg.features.sub_agents);
        assert!(cfg.features.skills);
    }

    #[test]
    fn active_tools_excludes_disabled() {
        let configured = vec!["shell".to_string(), "read_file".to_string()];
        let mut disabled = HashSet::new();
        disabled.insert("shell".to_string());
        let features = FeaturesConfig::default();
        let active = ToolPolicy::active_tools(&configured, &disabled, &features, true, true);
        assert_eq!(active, vec!["read_file".to_string()]);
    }

    #[test]
    fn active_tools_gates_sub_agent_on_feature_flag() {
        let configured = vec!["sub_agent".to_string()];
        let disabled = HashSet::new();
        let mut features = FeaturesConfig::default();
        features.sub_agents = false;
        let active = ToolPolicy::active_tools(&configured, &disabled, &features, true, true);
        assert!(active.is_empty());
        features.sub_agents = true;
        let active = ToolPolicy::active_tools(&configured, &disabled, &features, true, true);
        assert_eq!(active, vec!["sub_agent".to_string()]);
    }

    #[test]
    fn active_tools_gates_ask_user_on_top_level() {
        let configured = vec!["ask_user".to_string()];
        let disabled = HashSet::new();
        let features = FeaturesConfig::default();
        let active = ToolPolicy::active_tools(&configured, &disabled, &features, true, false);
        assert!(active.is_empty());
        let active = ToolPolicy::active_tools(&configured, &disabled, &features, true, true);
        assert_eq!(active, vec!["ask_user".to_string()]);
    }
}
