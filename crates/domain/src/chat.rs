//! The provider-facing message shape: what actually goes over the wire to
//! an LLM provider. A turn converts the session tree's path (root → leaf,
//! see [`crate::message::Message`]) into a `Vec<ChatMessage>` before handing
//! it to a `Provider`.
//!
//! Kept deliberately separate from the tree's `Message` type: the tree
//! needs per-entry identity and branch metadata the wire format doesn't
//! care about, and the wire format needs a `Parts` shape (interleaved
//! text/tool_use/tool_result/image) the tree represents with dedicated
//! roles instead.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: ChatContent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
    Tool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChatContent {
    Text(String),
    Parts(Vec::<ContentPart>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ContentPart {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "tool_use")]
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    #[serde(rename = "tool_result")]
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(default)]
        is_error: bool,
    },
    #[serde(rename = "image")]
    Image {
        url: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        media_type: Option<String>,
    },
}

impl ChatMessage {
    pub fn system(text: impl Into<String>) -> Self {
        Self { role: ChatRole::System, content: ChatContent::Text(text.into()) }
    }
    pub fn user(text: impl Into<String>) -> Self {
        Self { role: ChatRole::User, content: ChatContent::Text(text.into()) }
    }
    pub fn assistant(text: impl Into<String>) -> Self {
        Self { role: ChatRole::Assistant, content: ChatContent::Text(text.into()) }
    }
    pub fn assistant_with_tool_calls(text: impl Into<String>, calls: &[crate::message::ToolCall]) -> Self {
        let text = text.into();
        let mut parts = Vec::new();
        if !text.is_empty() {
            parts.push(ContentPart::Text { text });
        }
        for c in calls {
            parts.push(ContentPart::ToolUse {
                id: c.call_id.clone(),
                name: c.tool_name.clone(),
                input: c.arguments.clone(),
            });
        }
        Self { role: ChatRole::Assistant, content: ChatContent::Parts(parts) }
    }
    pub fn tool_result(tool_use_id: impl Into<String>, content: impl Into<String>, is_error: bool) -> Self {
        Self {
            role: ChatRole::Tool,
            content: ChatContent::Parts(vec![ContentPart::ToolResult {
                tool_use_id: tool_use_id.into(),
                content: content.into(),
                is_error,
            }]),
        }
    }
}

impl ChatContent {
    pub fn text(&self) -> Option<&str> {
        match self {
            ChatContent::Text(t) => Some(t.as_str()),
            ChatContent::Parts(parts) => parts.iter().find_map(|p| match p {
                ContentPart::Text { text } => Some(text.as_str()),
                _ => None,
            }),
        }
    }

    /// Join all text parts with `"\n"`; non-text parts are skipped.
    pub fn extract_all_text(&self) -> String {
        match self {
            ChatContent::Text(t) => t.clone(),
            ChatContent::Parts(parts) => parts
                .iter()
                .filter_map(|p| match p {
                    ContentPart::Text { text } => Some(text.as_str()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_all_text_from_text_variant() {
        let content = ChatContent::Text("hello world".into());
        assert_eq!(content.extract_all_text(), "hello world");
    }

    #[test]
    fn extract_all_text_from_parts_joins_with_newline() {
        let content = ChatContent::Parts(vec![
            ContentPart::Text { text: "line one".into() },
            ContentPart::ToolUse {
                id: "c1".into(),
                name: "exec".into(),
                input: serde_json::json!({}),
            },
            ContentPart::Text { text: "line two".into() },
        ]);
        assert_eq!(content.extract_all_text(), "line one\nline two");
    }

    #[test]
    fn extract_all_text_empty_parts() {
        let content = ChatContent::Parts(vec![]);
        assert_eq!(content.extract_all_text(), "");
    }

    #[test]
    fn assistant_with_tool_calls_omits_empty_text_part() {
        let calls = vec![crate::message::ToolCall {
            call_id: "c1".into(),
            tool_name: "read_file".into(),
            arguments: serde_json::json!({"path": "a.txt"}),
        }];
        let msg = ChatMessage::assistant_with_tool_calls("", &calls);
        match msg.content {
            ChatContent::Parts(parts) => assert_eq!(parts.len(), 1),
            _ => panic!("expected parts"),
        }
    }
}
