//! The built-in orchestration tools the core itself requires. Concrete tool implementations (shell, read, edit, grep, tasks,
//! debug) and the `sub_agent` tool (which needs session/event-bus
//! plumbing `opal-tools` does not have access to) live above this crate.

mod ask_parent;
mod ask_user;
mod use_skill;

pub use ask_parent::AskParentTool;
pub use ask_user::AskUserTool;
pub use use_skill::UseSkillTool;
