//! Legal search tool — forwards a query to the legal-text search service.

use async_trait::async_trait;
use deva_core::collaborator::Collaborator;
use deva_core::error::ToolError;
use deva_core::tool::{Tool, ToolContext};
use std::sync::Arc;
use tracing::debug;

pub struct SearchLawsTool {
    collaborator: Arc<dyn Collaborator>,
}

impl SearchLawsTool {
    pub fn new(collaborator: Arc<dyn Collaborator>) -> Self {
        Self { collaborator }
    }
}

#[async_trait]
impl Tool for SearchLawsTool {
    fn name(&self) -> &str {
        "search_laws"
    }

    fn description(&self) -> &str {
        "Search legal texts and statutes for passages relevant to the question."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "text": {
                    "type": "string",
                    "description": "The search text to look up in the legal corpus"
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

        debug!(text, "Searching legal texts");

        let answer = self
            .collaborator
            .ask(&format!("legal search {text}"))
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: "search_laws".into(),
                reason: e.to_string(),
            })?;

        Ok(answer.text)
    }
}
