//! Shared types for the Opal agent runtime: the conversation tree's
//! message shape, the provider-facing chat shape, the provider stream
//! event vocabulary, wire-visible agent events, capabilities, config, and
//! the crate-wide error type. No other `opal-*` crate depends back on
//! anything that depends on `opal-domain` — it sits at the bottom of the
//! dependency graph by design.

pub mod capability;
pub mod chat;
pub mod config;
pub mod error;
pub mod event;
pub mod message;
pub mod stream;

pub use capability::{Capabilities, ModelRole};
pub use chat::{ChatContent, ChatMessage, ChatRole, ContentPart};
pub use config::Config;
pub use error::{Error, Result};
pub use event::{AgentEvent, AgentStatus, WireToolResult};
pub use message::{Message, Role, ToolCall, ToolOutput, ToolResult};
pub use stream::{BoxStream, ProviderStreamEvent, Usage};
