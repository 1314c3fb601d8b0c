//! Transcript compaction: split→summarize→persist.
//!
//! `split_for_compaction` walks the path backward accumulating
//! [`crate::usage::estimate_message_tokens`] against a token budget
//! (`keep_recent_tokens`) rather than counting turns, so the kept tail
//! scales with how verbose recent messages actually are.

use opal_domain::message::Message;
use opal_providers::traits::ChatRequest;
use opal_providers::Provider;

use crate::usage::estimate_message_tokens;

/// Split a session's current path into `(to_compact, to_keep)`, keeping as
/// much of the tail as fits under `keep_tokens`.
/// Always keeps at least the final message, even if it alone exceeds the
/// budget — compaction must never produce an empty active branch.
pub fn split_for_compaction(path: &[Message], keep_tokens: u64) -> (Vec<Message>, Vec<Message>) {
    if path.is_empty() {
        return (Vec::new(), Vec::new());
    }

    let mut kept_tokens = 0u64;
    let mut keep_from = path.len();
    for (i, message) in path.iter().enumerate().rev() {
        let cost = estimate_message_tokens(message);
        if kept_tokens + cost > keep_tokens && keep_from != path.len() {
            break;
        }
        kept_tokens += cost;
        keep_from = i;
    }

    let to_compact = path[..keep_from].to_vec();
    let to_keep = path[keep_from..].to_vec();
    (to_compact, to_keep)
}

/// Render messages as plain conversation text for the summarization
/// prompt, truncating very long entries (tool output) so the prompt stays
/// manageable.
fn build_conversation_text(messages: &[Message]) -> String {
    let mut buf = String::new();
    for m in messages {
        let role_label = match m.role {
            opal_domain::message::Role::User => "User",
            opal_domain::message::Role::Assistant => "Assistant",
            opal_domain::message::Role::System => "System",
            opal_domain::message::Role::ToolCall => "ToolCall",
            opal_domain::message::Role::ToolResult => "Tool",
        };
        buf.push_str(role_label);
        buf.push_str(": ");
        if m.content.len() > 2000 {
            buf.push_str(&m.content[..1000]);
            buf.push_str(" [...] ");
            buf.push_str(&m.content[m.content.len() - 500..]);
        } else {
            buf.push_str(&m.content);
        }
        buf.push('\n');
    }
    buf
}

/// Generate a compaction summary via a non-streaming chat call with a
/// fixed summarization prompt.
pub async fn generate_summary(
    provider: &dyn Provider,
    to_compact: &[Message],
) -> opal_domain::error::Result<String> {
    let conversation = build_conversation_text(to_compact);
    let prompt = format!(
        "You are a conversation summarizer. Summarize the following conversation \
         history into a concise summary that preserves:\n\
         1. The current goal or plan being worked on\n\
         2. Key decisions made\n\
         3. Open questions or threads\n\
         4. Important facts learned about the user or context\n\
         5. Tool state (running processes, active sessions, pending work)\n\n\
         Be concise but preserve all actionable context. Write in present tense.\n\
         Omit greetings and pleasantries. Focus on substance.\n\n\
         CONVERSATION:\n{conversation}"
    );

    let req = ChatRequest {
        messages: vec![opal_domain::chat::ChatMessage::user(prompt)],
        tools: vec![],
        temperature: Some(0.1),
        max_tokens: Some(2000),
        json_mode: false,
        model: None,
    };

    let resp = provider.chat(req).await?;
    Ok(resp.content)
}

/// The outcome of a full compaction pass, enough for the caller (the agent
/// state machine) to broadcast `compaction_start`/`compaction_end`
/// without this module needing its own bus handle.
pub struct CompactionOutcome {
    pub old_n: usize,
    pub new_n: usize,
    pub summary: Message,
    pub tail: Vec<Message>,
}

/// Run the full compaction flow: split → summarize. Persisting the new
/// branch is the caller's job (`SessionStore::compact`), since that's the
/// one place that needs to hold the store's write lock.
pub async fn run_compaction(
    provider: &dyn Provider,
    path: &[Message],
    keep_tokens: u64,
) -> opal_domain::error::Result<Option<CompactionOutcome>> {
    let (to_compact, to_keep) = split_for_compaction(path, keep_tokens);
    if to_compact.is_empty() {
        return Ok(None);
    }

    let summary_text = generate_summary(provider, &to_compact).await?;
    let summary = Message::system(uuid::Uuid::new_v4().to_string(), summary_text);

    tracing::info!(
        messages_compacted = to_compact.len(),
        messages_kept = to_keep.len(),
        "transcript compacted"
    );

    Ok(Some(CompactionOutcome { old_n: path.len(), new_n: to_keep.len() + 1, summary, tail: to_keep }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use opal_domain::capability::Capabilities;
    use opal_domain::error::Result;
    use opal_domain::stream::{BoxStream, ProviderStreamEvent};
    use opal_providers::traits::ChatResponse;

    fn msg(text: &str) -> Message {
        Message::user("m", text)
    }

    #[test]
    fn split_keeps_tail_under_token_budget() {
        let path: Vec<Message> = (0..5).map(|i| msg(&"x".repeat(40 * (i + 1)))).collect();
        let (to_compact, to_keep) = split_for_compaction(&path, 50);
        assert!(!to_compact.is_empty());
        assert!(!to_keep.is_empty());
        assert_eq!(to_compact.len() + to_keep.len(), path.len());
    }

    #[test]
    fn split_always_keeps_at_least_the_last_message() {
        let path = vec![msg(&"x".repeat(10_000))];
        let (to_compact, to_keep) = split_for_compaction(&path, 1);
        assert!(to_compact.is_empty());
        assert_eq!(to_keep.len(), 1);
    }

    #[test]
    fn split_empty_path_is_empty() {
        let (a, b) = split_for_compaction(&[], 100);
        assert!(a.is_empty() && b.is_empty());
    }

    struct StubProvider;

    #[async_trait]
    impl Provider for StubProvider {
        async fn chat(&self, _req: ChatRequest) -> Result<ChatResponse> {
            Ok(ChatResponse {
                content: "summary of prior conversation".into(),
                tool_calls: vec![],
                usage: None,
                model: "stub".into(),
                finish_reason: Some("stop".into()),
            })
        }
        async fn chat_stream(&self, _req: ChatRequest) -> Result<BoxStream<'static, Result<ProviderStreamEvent>>> {
            unimplemented!()
        }
        fn capabilities(&self) -> &Capabilities {
            static C: std::sync::OnceLock<Capabilities> = std::sync::OnceLock::new();
            C.get_or_init(Capabilities::default)
        }
        fn provider_id(&self) -> &str {
            "stub"
        }
    }

    #[tokio::test]
    async fn run_compaction_produces_summary_and_tail() {
        let path: Vec<Message> = (0..5).map(|i| msg(&format!("message {i}"))).collect();
        let outcome = run_compaction(&StubProvider, &path, 10).await.unwrap().unwrap();
        assert_eq!(outcome.summary.content, "summary of prior conversation");
        assert!(!outcome.tail.is_empty());
        assert_eq!(outcome.old_n, 5);
    }

    #[tokio::test]
    async fn run_compaction_on_tiny_path_with_huge_budget_is_noop() {
        let path = vec![msg("hi")];
        let outcome = run_compaction(&StubProvider, &path, 1_000_000).await.unwrap();
        assert!(outcome.is_none());
    }
}
