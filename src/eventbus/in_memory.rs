use super::{BusEvent, EventBus, Subscription};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::{broadcast, Mutex};

/// `tokio::sync::broadcast`-backed implementation, one channel per room.
///
/// Grounded in the teacher crate's use of `tokio::sync` primitives for
/// agent/session coordination rather than hand-rolled channels.
pub struct InMemoryEventBus {
    rooms: Mutex<HashMap<String, broadcast::Sender<BusEvent>>>,
    capacity: usize,
}

impl InMemoryEventBus {
    pub fn new() -> Self {
        Self { rooms: Mutex::new(HashMap::new()), capacity: 1024 }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self { rooms: Mutex::new(HashMap::new()), capacity }
    }

    async fn sender_for(&self, room: &str) -> broadcast::Sender<BusEvent> {
        let mut rooms = self.rooms.lock().await;
        rooms
            .entry(room.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }
}

impl Default for InMemoryEventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventBus for InMemoryEventBus {
    async fn publish(&self, room: &str, event: BusEvent) {
        let sender = self.sender_for(room).await;
        // No subscribers is not an error: the archive may be the only
        // consumer, or nobody has connected yet.
        let _ = sender.send(event);
    }

    async fn subscribe(&self, room: &str) -> Subscription {
        let sender = self.sender_for(room).await;
        Subscription { room: room.to_string(), receiver: sender.subscribe() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[tokio::test]
    async fn publish_order_is_preserved_for_a_subscriber() {
        let bus = InMemoryEventBus::new();
        let mut sub = bus.subscribe("task-1").await;

        for i in 0..5 {
            bus.publish(
                "task-1",
                BusEvent::new("info", serde_json::json!({ "i": i }), Utc::now()),
            )
            .await;
        }

        for i in 0..5 {
            let event = sub.recv().await.unwrap();
            assert_eq!(event.payload["i"], i);
        }
    }

    #[tokio::test]
    async fn rooms_are_isolated() {
        let bus = InMemoryEventBus::new();
        let mut sub_a = bus.subscribe("task-a").await;
        let _sub_b = bus.subscribe("task-b").await;

        bus.publish("task-b", BusEvent::new("info", serde_json::json!({}), Utc::now())).await;

        // task-a's subscriber never sees it; give the scheduler a chance to
        // deliver anything that would wrongly cross rooms.
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        assert!(sub_a.is_empty());
    }
}
