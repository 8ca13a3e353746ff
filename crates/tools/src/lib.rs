//! Built-in tool implementations for the Deva chat plugin.
//!
//! The registry is a small fixed set of local capabilities the model may
//! call mid-completion. Each one forwards a sub-query to a sibling service
//! through the `Collaborator` seam and returns its text answer:
//!
//! - `search_memory` — the agent's memory index
//! - `search_knowledge` — the knowledge base
//! - `search_laws` — the legal-text search service

pub mod search_knowledge;
pub mod search_laws;
pub mod search_memory;

pub use search_knowledge::SearchKnowledgeTool;
pub use search_laws::SearchLawsTool;
pub use search_memory::SearchMemoryTool;

use deva_core::collaborator::Collaborator;
use deva_core::tool::ToolRegistry;
use std::sync::Arc;

/// Create the default tool registry wired to the given collaborator.
///
/// `agent_key` scopes memory searches when a chat call doesn't supply its
/// own memory key.
pub fn default_registry(collaborator: Arc<dyn Collaborator>, agent_key: &str) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(SearchMemoryTool::new(
        collaborator.clone(),
        agent_key,
    )));
    registry.register(Box::new(SearchKnowledgeTool::new(collaborator.clone())));
    registry.register(Box::new(SearchLawsTool::new(collaborator)));
    registry
}
