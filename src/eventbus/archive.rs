//! The Activity Archive (spec.md §4.2): batches, throttles, and durably
//! persists a bounded ring of activity events per task so reconnecting
//! observers can replay recent history.

use super::{BusEvent, EventBus};
use crate::config::CoreConfig;
use crate::error::CoreError;
use crate::model::{ActivityEntry, ActivityType};
use crate::store::DurableStore;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Tracks the last time a `(task, type)` pair emitted to the bus, for the
/// `H`-millisecond throttle on high-frequency types.
type ThrottleKey = (String, &'static str);

pub struct ActivityArchive<B: EventBus, S: DurableStore> {
    bus: Arc<B>,
    store: Arc<S>,
    config: CoreConfig,
    last_emitted: Mutex<HashMap<ThrottleKey, DateTime<Utc>>>,
    batch_buffers: Mutex<HashMap<String, Vec<ActivityEntry>>>,
}

impl<B: EventBus + 'static, S: DurableStore + 'static> ActivityArchive<B, S> {
    pub fn new(bus: Arc<B>, store: Arc<S>, config: CoreConfig) -> Arc<Self> {
        Arc::new(Self {
            bus,
            store,
            config,
            last_emitted: Mutex::new(HashMap::new()),
            batch_buffers: Mutex::new(HashMap::new()),
        })
    }

    /// Record one activity entry: always persists it durably (spec.md §3
    /// invariant 7), then decides whether/how to deliver it over the bus.
    ///
    /// - High-priority types (phase/story start/complete/failed, approval
    ///   required, error) bypass batching and throttling entirely.
    /// - High-frequency types (`tool_call`, `thinking`, `output`) are
    ///   throttled to one emission per `H` ms per `(task, type)`.
    /// - Everything else is coalesced into a batch flushed after `B` ms.
    pub async fn record(self: &Arc<Self>, entry: ActivityEntry, now: DateTime<Utc>) -> Result<(), CoreError> {
        self.store.append_activity(entry.clone(), self.config.activity_buffer_size).await?;

        if entry.kind.is_high_priority() {
            self.publish_immediately(entry, now).await;
            return Ok(());
        }

        if entry.kind.is_high_frequency() {
            let key: ThrottleKey = (entry.task_id.clone(), type_label(entry.kind));
            let mut last = self.last_emitted.lock().await;
            let throttled = last
                .get(&key)
                .map(|prev| (now - *prev).num_milliseconds() < self.config.activity_throttle_ms as i64)
                .unwrap_or(false);
            if throttled {
                return Ok(());
            }
            last.insert(key, now);
            self.publish_immediately(entry, now).await;
            return Ok(());
        }

        self.enqueue_for_batch(entry).await;
        Ok(())
    }

    async fn publish_immediately(&self, entry: ActivityEntry, now: DateTime<Utc>) {
        let room = entry.task_id.clone();
        let event = BusEvent::new(type_label(entry.kind), serialize_entry(&entry), now);
        self.bus.publish(&room, event).await;
    }

    async fn enqueue_for_batch(self: &Arc<Self>, entry: ActivityEntry) {
        let task_id = entry.task_id.clone();
        let should_schedule_flush = {
            let mut buffers = self.batch_buffers.lock().await;
            let buffer = buffers.entry(task_id.clone()).or_default();
            let was_empty = buffer.is_empty();
            buffer.push(entry);
            was_empty
        };

        if should_schedule_flush {
            let archive = Arc::clone(self);
            let batch_ms = self.config.activity_batch_ms;
            tokio::spawn(async move {
                tokio::time::sleep(std::time::Duration::from_millis(batch_ms)).await;
                archive.flush(&task_id).await;
            });
        }
    }

    async fn flush(&self, task_id: &str) {
        let batch = {
            let mut buffers = self.batch_buffers.lock().await;
            buffers.remove(task_id).unwrap_or_default()
        };
        if batch.is_empty() {
            return;
        }
        let payload = serde_json::json!({
            "entries": batch.iter().map(serialize_entry).collect::<Vec<_>>(),
        });
        let event = BusEvent::new("activity_batch", payload, Utc::now());
        self.bus.publish(task_id, event).await;
    }

    /// Replay the last `last_k` persisted entries for a reconnecting
    /// subscriber (spec.md §8 invariant 9).
    pub async fn history(&self, task_id: &str, last_k: usize) -> Result<Vec<ActivityEntry>, CoreError> {
        self.store.list_activity(task_id, last_k).await
    }
}

fn type_label(kind: ActivityType) -> &'static str {
    match kind {
        ActivityType::PhaseStart => "phase_start",
        ActivityType::PhaseComplete => "phase_complete",
        ActivityType::PhaseFailed => "phase_failed",
        ActivityType::StoryStart => "story_start",
        ActivityType::StoryComplete => "story_complete",
        ActivityType::StoryFailed => "story_failed",
        ActivityType::ApprovalRequired => "approval_required",
        ActivityType::ToolCall => "tool_call",
        ActivityType::ToolResult => "tool_result",
        ActivityType::Thinking => "thinking",
        ActivityType::Output => "output",
        ActivityType::Error => "error",
        ActivityType::Warning => "warning",
        ActivityType::Info => "info",
    }
}

fn serialize_entry(entry: &ActivityEntry) -> serde_json::Value {
    serde_json::to_value(entry).unwrap_or(serde_json::Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eventbus::InMemoryEventBus;
    use crate::store::InMemoryStore;

    fn entry(task_id: &str, kind: ActivityType, content: &str) -> ActivityEntry {
        ActivityEntry {
            id: uuid::Uuid::new_v4().to_string(),
            task_id: task_id.to_string(),
            kind,
            phase: None,
            story_id: None,
            content: content.to_string(),
            details: None,
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn high_priority_events_bypass_batching() {
        let bus = Arc::new(InMemoryEventBus::new());
        let store = Arc::new(InMemoryStore::new());
        let archive = ActivityArchive::new(bus.clone(), store, CoreConfig::default());
        let mut sub = bus.subscribe("t1").await;

        archive
            .record(entry("t1", ActivityType::PhaseStart, "planning started"), Utc::now())
            .await
            .unwrap();

        let event = tokio::time::timeout(std::time::Duration::from_millis(100), sub.recv())
            .await
            .expect("event delivered without waiting for batch window")
            .unwrap();
        assert_eq!(event.kind, "phase_start");
    }

    #[tokio::test]
    async fn throttled_high_frequency_events_are_still_persisted() {
        let bus = Arc::new(InMemoryEventBus::new());
        let store = Arc::new(InMemoryStore::new());
        let config = CoreConfig::default().with_activity_buffer(500, 250, 10_000);
        let archive = ActivityArchive::new(bus, store, config);

        for i in 0..5 {
            archive
                .record(entry("t1", ActivityType::ToolCall, &format!("call {i}")), Utc::now())
                .await
                .unwrap();
        }

        let history = archive.history("t1", 100).await.unwrap();
        assert_eq!(history.len(), 5, "every call is durably recorded even if throttled on the bus");
    }

    #[tokio::test]
    async fn history_returns_last_k_in_publish_order() {
        let bus = Arc::new(InMemoryEventBus::new());
        let store = Arc::new(InMemoryStore::new());
        let archive = ActivityArchive::new(bus, store, CoreConfig::default());

        for i in 0..10 {
            archive
                .record(entry("t1", ActivityType::PhaseStart, &format!("e{i}")), Utc::now())
                .await
                .unwrap();
        }

        let history = archive.history("t1", 3).await.unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].content, "e7");
        assert_eq!(history[2].content, "e9");
    }
}
