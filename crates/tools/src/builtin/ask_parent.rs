//! `ask_parent`: replaces `ask_user` in a sub-agent's tool
//! set. Sends a message to the parent's in-flight tool task and blocks
//! on a reply reference, rather than going over the client RPC — the
//! parent is the one holding the client connection.

use async_trait::async_trait;
use serde_json::Value;

use opal_domain::error::{Error, Result};
use opal_domain::message::ToolOutput;

use crate::tool::{Tool, ToolContext};

pub struct AskParentTool;

#[async_trait]
impl Tool for AskParentTool {
    fn name(&self) -> &str {
        "ask_parent"
    }

    fn description(&self) -> &str {
        "Ask the parent agent a question and wait for its reply."
    }

    fn parameters(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "question": { "type": "string" }
            },
            "required": ["question"]
        })
    }

    fn meta(&self, args: &Value) -> String {
        args.get("question").and_then(|v| v.as_str()).unwrap_or("").to_string()
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<ToolOutput> {
        let question = args
            .get("question")
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::Other("ask_parent requires a `question` argument".to_string()))?;

        let Some(parent) = &ctx.parent else {
            return Err(Error::Other("no parent link wired into this context".to_string()));
        };

        let answer = parent.ask_parent(question).await?;
        Ok(ToolOutput::Text(answer))
    }
}
