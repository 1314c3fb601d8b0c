use serde::{Deserialize, Serialize};
use std::fmt;

use crate::manifest::{SkillManifest, SkillReadiness};

/// Risk tier for a skill — controls permission prompts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskTier {
    Pure,
    Io,
    Net,
    Admin,
}

impl fmt::Display for RiskTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskTier::Pure => write!(f, "PURE"),
            RiskTier::Io => write!(f, "IO"),
            RiskTier::Net => write!(f, "NET"),
            RiskTier::Admin => write!(f, "ADMIN"),
        }
    }
}

/// A skill definition loaded from `skill.toml` or `SKILL.md` frontmatter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillEntry {
    pub name: String,
    pub description: String,
    pub location: String,
    pub risk: RiskTier,
    #[serde(default)]
    pub inputs: Option<String>,
    #[serde(default)]
    pub outputs: Option<String>,
    #[serde(default)]
    pub permission_scope: Option<String>,
    /// Glob patterns matched against relative paths touched by
    /// `write_file`/`edit_file` calls. A skill with no triggers is never auto-loaded, only
    /// explicitly via `use_skill`.
    #[serde(default)]
    pub triggers: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manifest: Option<SkillManifest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub readiness: Option<SkillReadiness>,
}

impl SkillEntry {
    pub fn render_index_line(&self) -> String {
        let mut line = format!("- {}: {}", self.name, self.description);
        line.push_str(&format!(" location={}", self.location));
        line.push_str(&format!(" risk={}", self.risk));
        if let Some(ref inputs) = self.inputs {
            line.push_str(&format!(" inputs={inputs}"));
        }
        if let Some(ref outputs) = self.outputs {
            line.push_str(&format!(" outputs={outputs}"));
        }
        line
    }

    /// Ready unless a `readiness` check was performed and came back
    /// non-ready (skills with no declared `requires` are always ready).
    pub fn is_ready(&self) -> bool {
        self.readiness.as_ref().map(|r| r.status == crate::manifest::ReadinessStatus::Ready).unwrap_or(true)
    }

    /// Does any of this skill's trigger globs match `relative_path`?
    ///.
    pub fn matches_path(&self, relative_path: &str) -> bool {
        self.triggers.iter().any(|pattern| {
            glob::Pattern::new(pattern)
                .map(|p| p.matches(relative_path))
                .unwrap_or(false)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(triggers: Vec<&str>) -> SkillEntry {
        SkillEntry {
            name: "git-helper".into(),
            description: "".into(),
            location: "skills/git-helper".into(),
            risk: RiskTier::Io,
            inputs: None,
            outputs: None,
            permission_scope: None,
            triggers: triggers.into_iter().map(String::from).collect(),
            manifest: None,
            readiness: None,
        }
    }

    #[test]
    fn matches_path_honors_glob_triggers() {
        let e = entry(vec!["*.rs", "src/**/*.toml"]);
        assert!(e.matches_path("main.rs"));
        assert!(e.matches_path("src/a/b/Cargo.toml"));
        assert!(!e.matches_path("README.md"));
    }

    #[test]
    fn no_triggers_never_matches() {
        let e = entry(vec![]);
        assert!(!e.matches_path("anything.rs"));
    }

    #[test]
    fn is_ready_defaults_true_without_readiness_check() {
        let e = entry(vec![]);
        assert!(e.is_ready());
    }
}
