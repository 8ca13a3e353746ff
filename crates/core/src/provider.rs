//! Provider trait — the abstraction over the remote completion endpoint.
//!
//! A Provider knows how to send an assembled message list to a chat model
//! and return the completion. Implementations live in `deva-providers`;
//! tests swap in mocks.

use crate::error::ProviderError;
use crate::message::{Message, Usage};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Parameters for a single completion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// The model to use (e.g., "gpt-4o")
    pub model: String,

    /// The assembled message list, in conversation order
    pub messages: Vec<Message>,

    /// Sampling temperature
    pub temperature: f32,

    /// Nucleus sampling cutoff
    pub top_p: f32,

    /// Frequency penalty
    pub frequency_penalty: f32,

    /// Presence penalty
    pub presence_penalty: f32,

    /// Number of choices to request
    pub n: u32,

    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Tool schemas the model may call. Empty on the second round of the
    /// tool protocol — that round is a summarizing call.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolSchema>,
}

/// A tool definition sent to the model so it knows what it can call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSchema {
    /// The tool name
    pub name: String,

    /// Description of what the tool does
    pub description: String,

    /// JSON Schema describing the tool's parameters
    pub parameters: serde_json::Value,
}

/// A completion returned by the provider.
#[derive(Debug, Clone)]
pub struct Completion {
    /// Completion id assigned by the provider
    pub id: String,

    /// Which model actually responded (may differ from requested)
    pub model: String,

    /// Unix timestamp the provider stamped on the completion
    pub created: i64,

    /// The generated assistant message (text and/or tool calls)
    pub message: Message,

    /// Token usage statistics
    pub usage: Option<Usage>,

    /// The full raw response payload, carried for the memory event
    pub raw: serde_json::Value,
}

/// The remote completion seam.
///
/// The chat session calls `complete()` once per phase of the tool protocol
/// without knowing which endpoint is behind it.
#[async_trait]
pub trait Provider: Send + Sync {
    /// A human-readable name for this provider (e.g., "openai").
    fn name(&self) -> &str;

    /// Send a request and get a completion.
    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> std::result::Result<Completion, ProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_serialization_skips_empty_tools() {
        let req = CompletionRequest {
            model: "gpt-4o".into(),
            messages: vec![Message::user("hi")],
            temperature: 1.0,
            top_p: 1.0,
            frequency_penalty: 0.0,
            presence_penalty: 0.0,
            n: 1,
            max_tokens: None,
            tools: vec![],
        };
        let json = serde_json::to_string(&req).unwrap();
        assert!(!json.contains("tools"));
        assert!(!json.contains("max_tokens"));
    }

    #[test]
    fn tool_schema_serialization() {
        let schema = ToolSchema {
            name: "search_memory".into(),
            description: "Search agent memory".into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "text": { "type": "string" }
                },
                "required": ["text"]
            }),
        };
        let json = serde_json::to_string(&schema).unwrap();
        assert!(json.contains("search_memory"));
        assert!(json.contains("required"));
    }
}
