//! The JSON-RPC 2.0 stdio server. Wraps `opal-agent`'s
//! [`opal_agent::AgentRuntime`] with the wire protocol a connected
//! editor/CLI client speaks: newline-delimited JSON-RPC requests in,
//! `agent/event` notifications and responses out, with the occasional
//! server-initiated `client/*` request in between.
//!
//! This crate owns nothing the agent core needs to function — it is the
//! thing that's optional to swap out if Opal ever grows a second
//! transport.

pub mod client_requester;
pub mod dispatch;
pub mod methods;
pub mod protocol;
pub mod server;
pub mod state;
pub mod transport;

pub use client_requester::StdioClientRequester;
pub use dispatch::RpcContext;
pub use server::RpcServer;
pub use state::ServerState;
