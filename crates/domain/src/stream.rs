use serde::{Deserialize, Serialize};
use std::pin::Pin;

/// A boxed async stream, used for LLM streaming responses.
pub type BoxStream<'a, T> = Pin<Box<dyn futures_core::Stream<Item = T> + Send + 'a>>;

/// Token accounting reported by a provider. Providers use mixed key names
/// (`prompt_tokens`/`input_tokens`, `completion_tokens`/`output_tokens`);
/// normalizing that is the adapter's job — by the time a `Usage` reaches
/// the core it already uses these canonical field names.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl Usage {
    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

/// One event in a provider's streaming response to a single turn. This is
/// the unified vocabulary both SSE-based and native event-channel
/// providers are expected to produce — the core never sees the
/// wire bytes, only this.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProviderStreamEvent {
    TextStart,
    TextDelta { text: String },
    TextDone { text: String },
    ThinkingStart,
    ThinkingDelta { text: String },
    ToolCallStart { call_id: String, name: String },
    /// A raw JSON fragment to append to the accumulating arguments buffer
    /// for the most recently started (and not yet finished) tool call.
    ToolCallDelta { fragment: String },
    ToolCallDone {
        call_id: String,
        name: String,
        #[serde(default)]
        arguments: Option<serde_json::Value>,
    },
    Usage { usage: Usage },
    ResponseDone {
        #[serde(default)]
        usage: Option<Usage>,
    },
    Error { message: String },
}
