//! `Task` — the unit of work (spec.md §3).

use crate::model::activity::ActivityEntry;
use crate::model::payload::{PhasePayload, PullRequestRef};
use crate::model::phase::PhaseName;
use crate::model::queue_job::Lane;
use serde::{Deserialize, Serialize};

/// Task-status lifecycle (spec.md §3). Initial `Pending`, terminal
/// `Completed`/`Failed`/`Cancelled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Queued,
    Running,
    WaitingForApproval,
    Paused,
    Interrupted,
    Completed,
    Cancelled,
    Failed,
}

impl TaskStatus {
    /// Terminal statuses never transition further.
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Cancelled | TaskStatus::Failed)
    }
}

/// One completed phase, with its approved payload, as stored in the task's
/// resume fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletedPhase {
    pub phase: PhaseName,
    pub payload: PhasePayload,
    pub completed_at: chrono::DateTime<chrono::Utc>,
}

/// The unit of work (spec.md §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub owner_user_id: String,
    pub project_id: Option<String>,
    pub repository_ids: Vec<String>,
    pub title: String,
    pub description: String,
    pub status: TaskStatus,
    pub priority: i32,
    pub lane: Lane,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,

    pub branch_name: Option<String>,
    pub pull_requests: Vec<PullRequestRef>,

    pub total_tokens: u64,
    pub total_cost_usd: f64,
    pub failure_reason: Option<String>,

    // ---- Resume fields (spec.md §4.5) ----
    pub completed_phases: Vec<CompletedPhase>,
    pub current_phase: Option<PhaseName>,
    pub current_story_index: Option<usize>,
    pub last_completed_story_index: Option<usize>,

    pub activity_log: Vec<ActivityEntry>,
}

impl Task {
    pub fn new(
        id: impl Into<String>,
        owner_user_id: impl Into<String>,
        title: impl Into<String>,
        description: impl Into<String>,
        lane: Lane,
        priority: i32,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            owner_user_id: owner_user_id.into(),
            project_id: None,
            repository_ids: Vec::new(),
            title: title.into(),
            description: description.into(),
            status: TaskStatus::Pending,
            priority,
            lane,
            created_at: now,
            updated_at: now,
            branch_name: None,
            pull_requests: Vec::new(),
            total_tokens: 0,
            total_cost_usd: 0.0,
            failure_reason: None,
            completed_phases: Vec::new(),
            current_phase: None,
            current_story_index: None,
            last_completed_story_index: None,
            activity_log: Vec::new(),
        }
    }

    /// Invariant 2: `completed_phases` names are unique.
    pub fn has_completed(&self, phase: PhaseName) -> bool {
        self.completed_phases.iter().any(|cp| cp.phase == phase)
    }

    /// Clear every resume field — called once the orchestrator reaches a
    /// terminal outcome (spec.md §4.5 step 6, §5 cancellation semantics).
    pub fn clear_resume_fields(&mut self) {
        self.current_phase = None;
        self.current_story_index = None;
        self.last_completed_story_index = None;
    }
}
