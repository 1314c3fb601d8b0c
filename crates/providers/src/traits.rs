use opal_domain::capability::Capabilities;
use opal_domain::chat::ChatMessage;
use opal_domain::error::Result;
use opal_domain::message::ToolCall;
use opal_domain::stream::{BoxStream, ProviderStreamEvent, Usage};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Request / Response types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A provider-agnostic chat completion request. This is the only shape
/// the core ever builds — how it becomes HTTP/SSE bytes is entirely the
/// adapter's concern.
#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    pub tools: Vec<ToolDefinition>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub json_mode: bool,
    /// Model identifier override. When `None`, the provider uses its default.
    pub model: Option<String>,
}

/// Tool definition exposed to the LLM: name, description, and a JSON
/// Schema for its parameters.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// A provider-agnostic, non-streaming chat completion response. Used by
/// the compactor (`opal-agent`) which needs one shot, not a stream.
#[derive(Debug, Clone)]
pub struct ChatResponse {
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
    pub usage: Option<Usage>,
    pub model: String,
    pub finish_reason: Option<String>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Core provider trait
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The only interface the agent core consumes to talk to an LLM. Concrete
/// adapters (OpenAI-compat, Anthropic, Google, …) live outside the core
/// entirely — this trait, its request/response types, and the
/// `ProviderStreamEvent` vocabulary are the complete contract between
/// them.
#[async_trait::async_trait]
pub trait Provider: Send + Sync {
    /// Send a chat completion request and wait for the full response.
    /// Used by the compactor for its one-shot summarization call.
    async fn chat(&self, req: ChatRequest) -> Result<ChatResponse>;

    /// Send a chat completion request and return a stream of events. Used
    /// by every regular turn.
    async fn chat_stream(
        &self,
        req: ChatRequest,
    ) -> Result<BoxStream<'static, Result<ProviderStreamEvent>>>;

    /// The advertised capabilities of this provider/model combination.
    fn capabilities(&self) -> &Capabilities;

    /// A unique identifier for this provider instance, used for role
    /// resolution and logging.
    fn provider_id(&self) -> &str;
}
