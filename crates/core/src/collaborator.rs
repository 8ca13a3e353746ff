//! Collaborator trait — the question-routing seam to the hosting framework.
//!
//! The plugin never talks to sibling services directly: it formats a routed
//! question string ("data memory:… <query>", "feecting parse <text>") and
//! hands it to the host, which returns the answering service's reply.

pub use crate::error::CollaboratorError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// The answer half of a routed question.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Answer {
    /// Plain-text answer
    pub text: String,

    /// HTML rendering, when the answering service produces one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html: Option<String>,

    /// Structured payload, when the answering service produces one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl Answer {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            html: None,
            data: None,
        }
    }
}

/// Routes a question to a sibling service and returns its answer.
#[async_trait]
pub trait Collaborator: Send + Sync {
    async fn ask(&self, question: &str) -> std::result::Result<Answer, CollaboratorError>;
}
