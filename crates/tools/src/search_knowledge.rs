//! Knowledge search tool — forwards a query to the knowledge-base service.

use async_trait::async_trait;
use deva_core::collaborator::Collaborator;
use deva_core::error::ToolError;
use deva_core::tool::{Tool, ToolContext};
use std::sync::Arc;
use tracing::debug;

pub struct SearchKnowledgeTool {
    collaborator: Arc<dyn Collaborator>,
}

impl SearchKnowledgeTool {
    pub fn new(collaborator: Arc<dyn Collaborator>) -> Self {
        Self { collaborator }
    }
}

#[async_trait]
impl Tool for SearchKnowledgeTool {
    fn name(&self) -> &str {
        "search_knowledge"
    }

    fn description(&self) -> &str {
        "Search the knowledge base for reference material relevant to the question."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "text": {
                    "type": "string",
                    "description": "The search text to look up in the knowledge base"
                }
            },
            "required": ["text"]
        })
    }

    async fn execute(
        &self,
        arguments: serde_json::Value,
        _ctx: &ToolContext,
    ) -> Result<String, ToolError> {
        let text = arguments["text"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'text' argument".into()))?;

        debug!(text, "Searching knowledge base");

        let answer = self
            .collaborator
            .ask(&format!("data knowledge {text}"))
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: "search_knowledge".into(),
                reason: e.to_string(),
            })?;

        Ok(answer.text)
    }
}
