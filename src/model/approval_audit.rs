//! Approval audit-log entries (spec.md §4.3's "written to the audit
//! collection before returning to the caller").

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalAction {
    Approve,
    Reject,
    RequestChanges,
    Timeout,
    Cancel,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalAuditEntry {
    pub id: String,
    pub task_id: String,
    pub checkpoint_name: String,
    pub action: ApprovalAction,
    pub feedback: Option<String>,
    pub attempt: u32,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}
