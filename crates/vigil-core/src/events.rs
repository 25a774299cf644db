//! In-process event bus for pushing lifecycle notifications to observers.
//!
//! Built on `tokio::sync::broadcast`: publishing is best-effort fan-out with
//! no delivery guarantee. The HTTP server exposes the stream over SSE;
//! having zero subscribers is not an error.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;

/// Topics published by the core.
pub mod topic {
    pub const ANOMALY_CREATED: &str = "anomaly.created";
    pub const ANOMALY_UPDATED: &str = "anomaly.updated";
    pub const ANOMALY_DELETED: &str = "anomaly.deleted";
    pub const WORKFLOW_PROGRESS: &str = "workflow.progress";
    pub const SYSTEM: &str = "system";
}

/// A single published event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemEvent {
    pub topic: String,
    pub payload: Value,
    pub timestamp: DateTime<Utc>,
}

/// Broadcast-based publish/subscribe channel.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<SystemEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(256);
        Self { tx }
    }

    /// Publish an event. Lagging or absent subscribers are ignored.
    pub fn publish(&self, topic: &str, payload: Value) {
        let event = SystemEvent {
            topic: topic.to_string(),
            payload,
            timestamp: Utc::now(),
        };
        if self.tx.send(event).is_err() {
            tracing::trace!(topic, "event published with no subscribers");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SystemEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn subscribers_receive_published_events() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();

        bus.publish(topic::ANOMALY_CREATED, json!({"id": "a-1"}));

        let event = rx.recv().await.unwrap();
        assert_eq!(event.topic, topic::ANOMALY_CREATED);
        assert_eq!(event.payload["id"], "a-1");
    }

    #[test]
    fn publish_without_subscribers_is_not_an_error() {
        let bus = EventBus::new();
        bus.publish(topic::SYSTEM, json!({"event": "noop"}));
        assert_eq!(bus.subscriber_count(), 0);
    }
}
