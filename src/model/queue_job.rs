//! `QueueJob` — mirror of the in-queue job (spec.md §3, §4.8).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lane {
    Regular,
    Premium,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueJobState {
    Waiting,
    Active,
    Completed,
    Failed,
    Delayed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueJob {
    pub id: String,
    pub task_id: String,
    pub lane: Lane,
    pub priority: i32,
    pub attempt: u32,
    pub state: QueueJobState,
    pub enqueued_at: chrono::DateTime<chrono::Utc>,
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
    pub last_error: Option<String>,
}

impl QueueJob {
    pub fn new(
        id: impl Into<String>,
        task_id: impl Into<String>,
        lane: Lane,
        priority: i32,
        enqueued_at: chrono::DateTime<chrono::Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            task_id: task_id.into(),
            lane,
            priority,
            attempt: 0,
            state: QueueJobState::Waiting,
            enqueued_at,
            started_at: None,
            completed_at: None,
            last_error: None,
        }
    }
}
