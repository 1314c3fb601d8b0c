//! `use_skill`: activates a named skill, appending its
//! instructions to the session. Idempotent on an already-active skill
//!.

use async_trait::async_trait;
use serde_json::Value;

use opal_domain::error::{Error, Result};
use opal_domain::message::ToolOutput;

use crate::tool::{Tool, ToolContext};

pub struct UseSkillTool;

#[async_trait]
impl Tool for UseSkillTool {
    fn name(&self) -> &str {
        "use_skill"
    }

    fn description(&self) -> &str {
        "Activate a named skill, loading its instructions into the conversation."
    }

    fn parameters(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "skill": { "type": "string", "description": "Name of the skill to activate" }
            },
            "required": ["skill"]
        })
    }

    fn meta(&self, args: &Value) -> String {
        args.get("skill").and_then(|v| v.as_str()).unwrap_or("").to_string()
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<ToolOutput> {
        let skill = args
            .get("skill")
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::Other("use_skill requires a `skill` argument".to_string()))?;

        let Some(activator) = &ctx.skills else {
            return Err(Error::Other("skills feature is not available in this context".to_string()));
        };

        let activated = activator.activate(&ctx.session_id, skill).await?;
        if activated {
            Ok(ToolOutput::Text(format!("activated skill '{skill}'")))
        } else {
            Ok(ToolOutput::Text("already loaded".to_string()))
        }
    }
}
