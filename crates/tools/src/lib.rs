//! The `Tool` interface, registry, and per-invocation context, plus the three built-in orchestration tools
//! the core itself requires. Concrete tool implementations (shell, read,
//! edit, grep, tasks, debug) are explicit external collaborators
//! and live outside this crate entirely.

pub mod builtin;
pub mod registry;
pub mod tool;

pub use builtin::{AskParentTool, AskUserTool, UseSkillTool};
pub use registry::ToolRegistry;
pub use tool::{ClientRequester, ParentLink, SkillActivator, Tool, ToolContext};
