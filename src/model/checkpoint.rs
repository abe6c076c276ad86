//! `PhaseCheckpoint` — keyed by `(taskId, phaseName)` (spec.md §3).

use crate::model::payload::PhasePayload;
use crate::model::phase::PhaseName;
use serde::{Deserialize, Serialize};

/// Records completion of exactly one phase for one task. At most one exists
/// per `(taskId, phaseName)` once that phase has completed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseCheckpoint {
    pub task_id: String,
    pub phase: PhaseName,
    pub payload: PhasePayload,
    pub completed_at: chrono::DateTime<chrono::Utc>,
}
