//! Bridges `opal_tools::tool::ClientRequester` to the stdio transport's
//! server→client request machinery.
//!
//! `opal-tools` cannot depend on `opal-rpc` (the dependency graph runs the
//! other way), so the trait is defined there and implemented here,
//! wrapping the stdio transport the same way a connection-bridge type
//! would wrap any other duplex channel.

use async_trait::async_trait;
use serde_json::json;

use opal_domain::error::{Error, Result};
use opal_tools::tool::ClientRequester;

use crate::transport::{send_client_request, SharedPending, SharedWriter};

pub struct StdioClientRequester {
    writer: SharedWriter,
    pending: SharedPending,
}

impl StdioClientRequester {
    pub fn new(writer: SharedWriter, pending: SharedPending) -> Self {
        Self { writer, pending }
    }
}

#[async_trait]
impl ClientRequester for StdioClientRequester {
    async fn ask_user(&self, session_id: &str, question: &str, choices: &[String]) -> Result<String> {
        let params = json!({
            "session_id": session_id,
            "question": question,
            "choices": choices,
        });
        let result = send_client_request(&self.writer, &self.pending, "client/ask_user", params)
            .await
            .map_err(|e| Error::Other(e.message))?;
        result
            .get("answer")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| Error::Other("client/ask_user response missing 'answer'".to_string()))
    }
}

/// `client/confirm` and `client/input` aren't reached through
/// the `Tool` trait's narrower `ClientRequester` — they're invoked
/// directly by RPC method handlers that need a client round trip without
/// going through a tool call (e.g. a settings migration prompt). Exposed
/// as free functions over the same transport primitives rather than a
/// second trait, since nothing outside this crate needs to call them
/// through an interface.
pub async fn confirm(
    writer: &SharedWriter,
    pending: &SharedPending,
    session_id: &str,
    title: &str,
    message: &str,
    actions: &[String],
) -> Result<String> {
    let params = json!({
        "session_id": session_id,
        "title": title,
        "message": message,
        "actions": actions,
    });
    let result = send_client_request(writer, pending, "client/confirm", params)
        .await
        .map_err(|e| Error::Other(e.message))?;
    result
        .get("action")
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .ok_or_else(|| Error::Other("client/confirm response missing 'action'".to_string()))
}

pub async fn input(
    writer: &SharedWriter,
    pending: &SharedPending,
    session_id: &str,
    prompt: &str,
    sensitive: bool,
) -> Result<String> {
    let params = json!({
        "session_id": session_id,
        "prompt": prompt,
        "sensitive": sensitive,
    });
    let result = send_client_request(writer, pending, "client/input", params)
        .await
        .map_err(|e| Error::Other(e.message))?;
    result
        .get("text")
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .ok_or_else(|| Error::Other("client/input response missing 'text'".to_string()))
}
