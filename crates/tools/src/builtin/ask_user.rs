//! `ask_user`: a server→client RPC that blocks
//! uninterruptibly on the connected user. Only present in a top-level
//! agent's active tool set — `ToolPolicy::active_tools` gates it on
//! `is_top_level`, and a sub-agent's registry substitutes
//! [`crate::builtin::AskParentTool`] in its place.

use async_trait::async_trait;
use serde_json::Value;

use opal_domain::error::{Error, Result};
use opal_domain::message::ToolOutput;

use crate::tool::{Tool, ToolContext};

pub struct AskUserTool;

#[async_trait]
impl Tool for AskUserTool {
    fn name(&self) -> &str {
        "ask_user"
    }

    fn description(&self) -> &str {
        "Ask the connected user a question and wait for their reply."
    }

    fn parameters(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "question": { "type": "string" },
                "choices": { "type": "array", "items": { "type": "string" } }
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
            .ok_or_else(|| Error::Other("ask_user requires a `question` argument".to_string()))?;
        let choices: Vec<String> = args
            .get("choices")
            .and_then(|v| v.as_array())
            .map(|a| a.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
            .unwrap_or_default();

        let Some(client) = &ctx.client else {
            return Err(Error::Other("no client requester wired into this context".to_string()));
        };

        let answer = client.ask_user(&ctx.session_id, question, &choices).await?;
        Ok(ToolOutput::Text(answer))
    }
}
