//! Domain event system — the side channels out of the plugin.
//!
//! The memory event after every successful chat is the load-bearing one:
//! an external memory-indexing collaborator subscribes and persists the
//! question/answer pair. Tool and response events exist for observability.

use crate::error::Result;
use crate::hash;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// The notification emitted after every completed chat.
///
/// Created per call; the plugin never stores it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryEvent {
    /// Completion id of the chat that produced this event
    pub id: String,

    /// Client profile of the caller
    pub client: serde_json::Value,

    /// Agent profile answering the question
    pub agent: serde_json::Value,

    /// The question text
    pub q: String,

    /// The answer text
    pub a: String,

    /// The raw completion payload
    pub raw: serde_json::Value,

    /// When the event was created
    pub created: DateTime<Utc>,

    /// Content digests over the payload fields
    pub md5: String,
    pub sha256: String,
    pub sha512: String,
}

impl MemoryEvent {
    /// Build a memory event, computing the content digests over the
    /// payload (id, client, agent, q, a, created).
    pub fn record(
        id: impl Into<String>,
        client: serde_json::Value,
        agent: serde_json::Value,
        question: impl Into<String>,
        answer: impl Into<String>,
        raw: serde_json::Value,
    ) -> Result<Self> {
        let id = id.into();
        let q = question.into();
        let a = answer.into();
        let created = Utc::now();

        let payload = serde_json::json!({
            "id": id,
            "client": client,
            "agent": agent,
            "q": q,
            "a": a,
            "created": created,
        });

        Ok(Self {
            md5: hash::md5_hex(&payload)?,
            sha256: hash::sha256_hex(&payload)?,
            sha512: hash::sha512_hex(&payload)?,
            id,
            client,
            agent,
            q,
            a,
            raw,
            created,
        })
    }
}

/// All domain events in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DevaEvent {
    /// A chat completed; carries the question/answer pair for indexing
    MemoryRecorded(MemoryEvent),

    /// The model generated a response
    ResponseGenerated {
        completion_id: String,
        model: String,
        tokens_used: u32,
        timestamp: DateTime<Utc>,
    },

    /// A tool was executed during the tool-resolution phase
    ToolExecuted {
        tool_name: String,
        success: bool,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },
}

/// A broadcast-based event bus for domain events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub.
/// Subscribers receive all events and filter for what they care about.
pub struct EventBus {
    sender: broadcast::Sender<Arc<DevaEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: DevaEvent) {
        // No subscribers is fine; the send error is discarded
        let _ = self.sender.send(Arc::new(event));
    }

    /// Subscribe to receive events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DevaEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn event_bus_publish_subscribe() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.publish(DevaEvent::ToolExecuted {
            tool_name: "search_memory".into(),
            success: true,
            duration_ms: 42,
            timestamp: Utc::now(),
        });

        let event = rx.recv().await.unwrap();
        match event.as_ref() {
            DevaEvent::ToolExecuted {
                tool_name, success, ..
            } => {
                assert_eq!(tool_name, "search_memory");
                assert!(success);
            }
            _ => panic!("Expected ToolExecuted event"),
        }
    }

    #[test]
    fn event_bus_no_subscribers_doesnt_panic() {
        let bus = EventBus::new(16);
        bus.publish(DevaEvent::ResponseGenerated {
            completion_id: "cmpl-1".into(),
            model: "gpt-4o".into(),
            tokens_used: 15,
            timestamp: Utc::now(),
        });
    }

    #[test]
    fn memory_event_digests() {
        let ev = MemoryEvent::record(
            "cmpl-1",
            serde_json::json!({"key": "client"}),
            serde_json::json!({"key": "agent"}),
            "what is rust",
            "a systems language",
            serde_json::json!({"choices": []}),
        )
        .unwrap();

        assert_eq!(ev.md5.len(), 32);
        assert_eq!(ev.sha256.len(), 64);
        assert_eq!(ev.sha512.len(), 128);
        assert_eq!(ev.q, "what is rust");
        assert_eq!(ev.a, "a systems language");
    }

    #[test]
    fn memory_event_digests_differ_per_payload() {
        let client = serde_json::json!({"key": "client"});
        let agent = serde_json::json!({"key": "agent"});
        let a = MemoryEvent::record("c1", client.clone(), agent.clone(), "q1", "a1", serde_json::Value::Null).unwrap();
        let b = MemoryEvent::record("c1", client, agent, "q2", "a2", serde_json::Value::Null).unwrap();
        assert_ne!(a.sha256, b.sha256);
    }
}
