//! Turns a provider's [`ProviderStreamEvent`] stream into agent state
//! mutations and wire events.
//!
//! Grounded on `domain/src/stream.rs` (the event vocabulary this consumes),
//! `providers/src/sse.rs`-style unification of two stream shapes behind one
//! vocabulary, and `gateway/src/runtime/turn.rs`'s stream-consumption loop
//! (accumulate text/thinking/tool-calls, finalize on stream end).

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

use opal_domain::event::AgentEvent;
use opal_domain::message::ToolCall;
use opal_domain::stream::{ProviderStreamEvent, Usage};

fn status_tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<status>(.*?)</status>").unwrap())
}

const STATUS_OPEN_TAG: &str = "<status>";

/// Extracts `<status>...</status>` spans from streamed text that may be
/// split arbitrarily across deltas.
/// `buffer` carries unresolved partial state between calls. Returns the
/// cleaned text (with any complete tags removed) and the inner text of
/// every tag that was closed in this call, in order.
pub fn extract_status_tags(buffer: &mut String, delta: &str) -> (String, Vec<String>) {
    let mut combined = std::mem::take(buffer);
    combined.push_str(delta);

    let mut cleaned = String::new();
    let mut statuses = Vec::new();

    loop {
        let Some(caps) = status_tag_re().captures(&combined) else { break };
        let whole = caps.get(0).unwrap();
        let inner = caps.get(1).unwrap().as_str().trim().to_string();
        statuses.push(inner);
        cleaned.push_str(&combined[..whole.start()]);
        combined = combined[whole.end()..].to_string();
    }

    if let Some(idx) = combined.find(STATUS_OPEN_TAG) {
        cleaned.push_str(&combined[..idx]);
        *buffer = combined[idx..].to_string();
        return (cleaned, statuses);
    }

    for len in (1..STATUS_OPEN_TAG.len()).rev() {
        if combined.ends_with(&STATUS_OPEN_TAG[..len]) {
            let split = combined.len() - len;
            cleaned.push_str(&combined[..split]);
            *buffer = combined[split..].to_string();
            return (cleaned, statuses);
        }
    }

    cleaned.push_str(&combined);
    *buffer = String::new();
    (cleaned, statuses)
}

/// Accumulates one in-progress tool call across `tool_call_start` →
/// `tool_call_delta`* → `tool_call_done`.
struct ToolCallAccumulator {
    call_id: String,
    name: String,
    arguments_json: String,
    arguments: Option<Value>,
}

impl ToolCallAccumulator {
    /// Finalize per : use `arguments` if the done-event provided
    /// it, otherwise parse the accumulated fragments; a JSON parse failure
    /// becomes the empty object rather than failing the turn.
    fn finalize(self) -> ToolCall {
        let arguments = self
            .arguments
            .or_else(|| serde_json::from_str(&self.arguments_json).ok())
            .unwrap_or_else(|| Value::Object(Default::default()));
        ToolCall { call_id: self.call_id, tool_name: self.name, arguments }
    }
}

/// Per-turn accumulation state plus the wire events each provider event
/// produces.
#[derive(Default)]
pub struct StreamParser {
    current_text: String,
    current_thinking: String,
    tool_calls: Vec<ToolCallAccumulator>,
    status_tag_buffer: String,
    usage: Option<Usage>,
    text_done_seen: bool,
}

impl StreamParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current_text(&self) -> &str {
        &self.current_text
    }

    pub fn usage(&self) -> Option<Usage> {
        self.usage
    }

    /// Handle one provider stream event, returning the wire events it
    /// produces.
    pub fn handle_event(&mut self, event: ProviderStreamEvent) -> Vec<AgentEvent> {
        match event {
            ProviderStreamEvent::TextStart => vec![AgentEvent::MessageStart],
            ProviderStreamEvent::TextDelta { text } => {
                let (cleaned, statuses) = extract_status_tags(&mut self.status_tag_buffer, &text);
                let mut events: Vec<AgentEvent> =
                    statuses.into_iter().map(|message| AgentEvent::StatusUpdate { message }).collect();
                if !cleaned.is_empty() {
                    self.current_text.push_str(&cleaned);
                    events.push(AgentEvent::MessageDelta { delta: cleaned });
                }
                events
            }
            ProviderStreamEvent::TextDone { text } => {
                // Authoritative: overwrites whatever deltas accumulated.
                self.current_text = text;
                self.text_done_seen = true;
                vec![]
            }
            ProviderStreamEvent::ThinkingStart => vec![AgentEvent::ThinkingStart],
            ProviderStreamEvent::ThinkingDelta { text } => {
                self.current_thinking.push_str(&text);
                vec![AgentEvent::ThinkingDelta { delta: text }]
            }
            ProviderStreamEvent::ToolCallStart { call_id, name } => {
                self.tool_calls.push(ToolCallAccumulator {
                    call_id,
                    name,
                    arguments_json: String::new(),
                    arguments: None,
                });
                vec![]
            }
            ProviderStreamEvent::ToolCallDelta { fragment } => {
                if let Some(acc) = self.tool_calls.last_mut() {
                    acc.arguments_json.push_str(&fragment);
                }
                vec![]
            }
            ProviderStreamEvent::ToolCallDone { call_id, name, arguments } => {
                if let Some(acc) = self.tool_calls.last_mut() {
                    acc.call_id = call_id;
                    acc.name = name;
                    if arguments.is_some() {
                        acc.arguments = arguments;
                    }
                }
                vec![]
            }
            ProviderStreamEvent::Usage { usage } => {
                self.usage = Some(usage);
                vec![AgentEvent::UsageUpdate { usage }]
            }
            ProviderStreamEvent::ResponseDone { usage } => {
                if let Some(u) = usage {
                    self.usage = Some(u);
                }
                vec![]
            }
            ProviderStreamEvent::Error { message } => {
                tracing::warn!(error = %message, "provider stream error");
                vec![AgentEvent::Error { reason: message }]
            }
        }
    }

    /// Consume the parser, returning the materialized turn content: text,
    /// optional thinking, finalized tool calls, and the last usage report
    ///.
    pub fn finalize(self) -> (String, Option<String>, Vec<ToolCall>, Option<Usage>) {
        let thinking = if self.current_thinking.is_empty() { None } else { Some(self.current_thinking) };
        let tool_calls = self.tool_calls.into_iter().map(ToolCallAccumulator::finalize).collect();
        (self.current_text, thinking, tool_calls, self.usage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_tag_extracted_in_a_single_delta() {
        let mut buf = String::new();
        let (cleaned, statuses) = extract_status_tags(&mut buf, "hello <status>thinking</status> world");
        assert_eq!(cleaned, "hello  world");
        assert_eq!(statuses, vec!["thinking".to_string()]);
        assert!(buf.is_empty());
    }

    #[test]
    fn status_tag_split_across_twenty_deltas() {
        let text = "prefix <status>loading files</status> suffix";
        let mut buf = String::new();
        let mut cleaned = String::new();
        let mut statuses = Vec::new();
        for ch in text.chars() {
            let (c, s) = extract_status_tags(&mut buf, &ch.to_string());
            cleaned.push_str(&c);
            statuses.extend(s);
        }
        assert_eq!(cleaned, "prefix  suffix");
        assert_eq!(statuses, vec!["loading files".to_string()]);
    }

    #[test]
    fn partial_open_tag_at_end_of_delta_is_buffered() {
        let mut buf = String::new();
        let (cleaned, statuses) = extract_status_tags(&mut buf, "hello <stat");
        assert_eq!(cleaned, "hello ");
        assert!(statuses.is_empty());
        assert_eq!(buf, "<stat");

        let (cleaned2, statuses2) = extract_status_tags(&mut buf, "us>done</status> bye");
        assert_eq!(cleaned2, " bye");
        assert_eq!(statuses2, vec!["done".to_string()]);
    }

    #[test]
    fn multiple_tags_in_one_chunk_all_extracted() {
        let mut buf = String::new();
        let (cleaned, statuses) = extract_status_tags(&mut buf, "<status>a</status>mid<status>b</status>end");
        assert_eq!(cleaned, "midend");
        assert_eq!(statuses, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn text_with_no_tag_passes_through_unchanged() {
        let mut buf = String::new();
        let (cleaned, statuses) = extract_status_tags(&mut buf, "just plain text");
        assert_eq!(cleaned, "just plain text");
        assert!(statuses.is_empty());
        assert!(buf.is_empty());
    }

    #[test]
    fn text_start_emits_message_start() {
        let mut p = StreamParser::new();
        let events = p.handle_event(ProviderStreamEvent::TextStart);
        assert!(matches!(events[0], AgentEvent::MessageStart));
    }

    #[test]
    fn tool_call_accumulates_fragments_and_finalizes() {
        let mut p = StreamParser::new();
        p.handle_event(ProviderStreamEvent::ToolCallStart { call_id: "c1".into(), name: "read_file".into() });
        p.handle_event(ProviderStreamEvent::ToolCallDelta { fragment: r#"{"path":"#.into() });
        p.handle_event(ProviderStreamEvent::ToolCallDelta { fragment: r#""a.txt"}"#.into() });
        p.handle_event(ProviderStreamEvent::ToolCallDone { call_id: "c1".into(), name: "read_file".into(), arguments: None });

        let (_, _, tool_calls, _) = p.finalize();
        assert_eq!(tool_calls.len(), 1);
        assert_eq!(tool_calls[0].arguments, serde_json::json!({"path": "a.txt"}));
    }

    #[test]
    fn malformed_tool_call_json_finalizes_to_empty_object() {
        let mut p = StreamParser::new();
        p.handle_event(ProviderStreamEvent::ToolCallStart { call_id: "c1".into(), name: "x".into() });
        p.handle_event(ProviderStreamEvent::ToolCallDelta { fragment: "{not valid json".into() });
        p.handle_event(ProviderStreamEvent::ToolCallDone { call_id: "c1".into(), name: "x".into(), arguments: None });

        let (_, _, tool_calls, _) = p.finalize();
        assert_eq!(tool_calls[0].arguments, serde_json::json!({}));
    }

    #[test]
    fn text_done_is_authoritative_over_accumulated_deltas() {
        let mut p = StreamParser::new();
        p.handle_event(ProviderStreamEvent::TextDelta { text: "partial".into() });
        p.handle_event(ProviderStreamEvent::TextDone { text: "final answer".into() });
        let (text, _, _, _) = p.finalize();
        assert_eq!(text, "final answer");
    }

    #[test]
    fn usage_event_updates_tracked_usage() {
        let mut p = StreamParser::new();
        let events = p.handle_event(ProviderStreamEvent::Usage { usage: Usage { input_tokens: 10, output_tokens: 2 } });
        assert!(matches!(events[0], AgentEvent::UsageUpdate { .. }));
        assert_eq!(p.usage().unwrap().input_tokens, 10);
    }

    #[test]
    fn empty_stream_produces_empty_text_and_no_tool_calls() {
        let p = StreamParser::new();
        let (text, thinking, tool_calls, usage) = p.finalize();
        assert!(text.is_empty());
        assert!(thinking.is_none());
        assert!(tool_calls.is_empty());
        assert!(usage.is_none());
    }
}
