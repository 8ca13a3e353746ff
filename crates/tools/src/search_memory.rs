//! Memory search tool — lets the model search the agent's memory index.
//!
//! Forwards a `data memory:<key>:3 <query>` question through the
//! collaborator and returns the answering service's text. The memory key
//! defaults to the agent's own, overridable per chat call via the
//! `memory` option.

use async_trait::async_trait;
use deva_core::collaborator::Collaborator;
use deva_core::error::ToolError;
use deva_core::tool::{Tool, ToolContext};
use std::sync::Arc;
use tracing::debug;

pub struct SearchMemoryTool {
    collaborator: Arc<dyn Collaborator>,
    default_key: String,
}

impl SearchMemoryTool {
    pub fn new(collaborator: Arc<dyn Collaborator>, default_key: impl Into<String>) -> Self {
        Self {
            collaborator,
            default_key: default_key.into(),
        }
    }
}

#[async_trait]
impl Tool for SearchMemoryTool {
    fn name(&self) -> &str {
        "search_memory"
    }

    fn description(&self) -> &str {
        "Search the agent's memory for relevant past conversations and stored facts. \
         Use this when the answer depends on something said or learned before."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "text": {
                    "type": "string",
                    "description": "The search text to look up in memory"
                }
            },
            "required": ["text"]
        })
    }

    async fn execute(
        &self,
        arguments: serde_json::Value,
        ctx: &ToolContext,
    ) -> Result<String, ToolError> {
        let text = arguments["text"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'text' argument".into()))?;

        let key = ctx.memory_key.as_deref().unwrap_or(&self.default_key);
        debug!(key, text, "Searching memory");

        let answer = self
            .collaborator
            .ask(&format!("data memory:{key}:3 {text}"))
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: "search_memory".into(),
                reason: e.to_string(),
            })?;

        Ok(answer.text)
    }
}
