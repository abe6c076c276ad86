//! Task activity log entries (spec.md §6 "Wire artifacts").

use serde::{Deserialize, Serialize};

/// One entry in a task's bounded activity log.
///
/// Matches the wire shape in spec.md §6: `{id, taskId, type, phase?,
/// storyId?, content, details?, timestamp}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub id: String,
    pub task_id: String,
    #[serde(rename = "type")]
    pub kind: ActivityType,
    pub phase: Option<String>,
    pub story_id: Option<String>,
    pub content: String,
    pub details: Option<serde_json::Value>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Activity types the Activity Archive observes (spec.md §4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityType {
    PhaseStart,
    PhaseComplete,
    PhaseFailed,
    StoryStart,
    StoryComplete,
    StoryFailed,
    ApprovalRequired,
    ToolCall,
    ToolResult,
    Thinking,
    Output,
    Error,
    Warning,
    Info,
}

impl ActivityType {
    /// High-priority types bypass batching (spec.md §4.2's "Detail floor").
    pub fn is_high_priority(self) -> bool {
        matches!(
            self,
            ActivityType::PhaseStart
                | ActivityType::PhaseComplete
                | ActivityType::PhaseFailed
                | ActivityType::StoryStart
                | ActivityType::StoryComplete
                | ActivityType::StoryFailed
                | ActivityType::ApprovalRequired
                | ActivityType::Error
        )
    }

    /// High-frequency types subject to per-`(task, type)` throttling.
    pub fn is_high_frequency(self) -> bool {
        matches!(self, ActivityType::ToolCall | ActivityType::Thinking | ActivityType::Output)
    }
}
