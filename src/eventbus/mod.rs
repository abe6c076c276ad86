//! The Event Bus (spec.md §4.2): single-process publish/subscribe with
//! per-task rooms, plus the Activity Archive that batches, throttles, and
//! durably persists a bounded activity history per task.

mod archive;
mod in_memory;

pub use archive::ActivityArchive;
pub use in_memory::InMemoryEventBus;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::broadcast;

/// One published event. Rooms are keyed by task id; `kind` is the wire type
/// name (e.g. `"tool_call"`, `"approval-required"`, `"orchestration:complete"`)
/// and `payload` carries whatever shape that type needs — this is the wire
/// boundary named in spec.md §6, not an internal model type, so a loosely
/// typed payload is the right call here (contrast with the closed model
/// types in [`crate::model`]).
#[derive(Debug, Clone)]
pub struct BusEvent {
    pub kind: String,
    pub payload: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl BusEvent {
    pub fn new(kind: impl Into<String>, payload: serde_json::Value, now: DateTime<Utc>) -> Self {
        Self { kind: kind.into(), payload, timestamp: now }
    }
}

/// A live subscription to a task room.
pub struct Subscription {
    pub room: String,
    pub(crate) receiver: broadcast::Receiver<BusEvent>,
}

impl Subscription {
    pub async fn recv(&mut self) -> Option<BusEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Whether any events are currently queued for this subscriber.
    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }
}

#[async_trait]
pub trait EventBus: Send + Sync {
    /// Publish `event` to every subscriber of `room`. Non-blocking: delivery
    /// to a slow subscriber never stalls the publisher (spec.md §5).
    async fn publish(&self, room: &str, event: BusEvent);

    /// Subscribe to `room`. Late joiners rely on [`ActivityArchive::history`]
    /// to replay what they missed.
    async fn subscribe(&self, room: &str) -> Subscription;

    /// Drop a subscription. Broadcast channels clean up on `Drop`, so this
    /// exists for interface symmetry with spec.md §6 and to let callers
    /// signal intent explicitly.
    fn unsubscribe(&self, subscription: Subscription) {
        drop(subscription);
    }
}
