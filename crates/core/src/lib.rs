//! # Deva Core
//!
//! Domain types, traits, and error definitions for the Deva chat plugin
//! runtime. This crate has **zero framework dependencies** — it defines the
//! domain model that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every external seam is defined as a trait here. Implementations live in
//! their respective crates. This enables:
//! - Swapping implementations via configuration
//! - Easy testing with mock/stub implementations
//! - Clean dependency graph (all crates depend inward on core)

pub mod collaborator;
pub mod error;
pub mod event;
pub mod hash;
pub mod message;
pub mod provider;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use collaborator::{Answer, Collaborator};
pub use error::{CollaboratorError, Error, ProviderError, Result, ToolError};
pub use event::{DevaEvent, EventBus, MemoryEvent};
pub use message::{ChatResult, History, Message, Role, ToolCallRequest, Usage};
pub use provider::{Completion, CompletionRequest, Provider, ToolSchema};
pub use tool::{Tool, ToolCall, ToolContext, ToolRegistry};
