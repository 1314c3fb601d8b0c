//! Per-domain method handlers, one module per method-name prefix
//! (`session.rs`, `agent.rs`, `auth.rs`, ...).

pub mod agent;
pub mod auth;
pub mod misc;
pub mod models;
pub mod session;
pub mod settings;
pub mod tasks;

/// Well-known workspace context files a session surfaces in its
/// `session/start` result. Listed by name
/// only — reading/caching/hashing their content is a workspace-scanning
/// concern left to a collaborator, not the core.
const CONTEXT_FILE_NAMES: &[&str] = &["AGENTS.md", "CLAUDE.md", "README.md", "TOOLS.md"];

pub(crate) fn discover_context_files(working_dir: &std::path::Path) -> Vec<String> {
    CONTEXT_FILE_NAMES
        .iter()
        .filter(|name| working_dir.join(name).is_file())
        .map(|name| name.to_string())
        .collect()
}
