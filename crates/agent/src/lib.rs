//! The agent core: per-session state, the turn-orchestration state machine,
//! tool dispatch, stream parsing, usage tracking, compaction, and the
//! sub-agent hierarchy.
//!
//! This crate has no knowledge of the wire transport — `opal-rpc` drives it
//! through [`machine::AgentRuntime`] and subscribes to [`bus::EventBus`] for
//! everything it needs to forward to a client.

pub mod bus;
pub mod cancel;
pub mod compactor;
pub mod machine;
pub mod state;
pub mod steer;
pub mod stream_parser;
pub mod sub_agent;
pub mod tool_runner;
pub mod usage;

pub use bus::EventBus;
pub use cancel::{CancelMap, CancelToken};
pub use machine::{AgentRuntime, PromptOutcome, SessionOptions};
pub use state::{AgentState, AgentStates};
pub use steer::SteerQueue;
pub use sub_agent::SubAgentTool;
pub use tool_runner::ToolRunner;
pub use usage::UsageTracker;
