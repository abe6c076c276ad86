//! The data model (spec.md §3): closed, tagged types for every entity —
//! no dynamic JSON casting (spec.md §9).

pub mod activity;
pub mod approval_audit;
pub mod checkpoint;
pub mod execution;
pub mod payload;
pub mod phase;
pub mod story;
pub mod task;
pub mod vulnerability;
pub mod queue_job;

pub use activity::{ActivityEntry, ActivityType};
pub use approval_audit::{ApprovalAction, ApprovalAuditEntry};
pub use checkpoint::PhaseCheckpoint;
pub use execution::{AgentExecution, ExecutionStatus, ToolCall};
pub use payload::{
    AnalysisPayload, ClarificationQA, DeveloperPayload, GlobalScanPayload, MergePayload,
    PhasePayload, PlanningPayload, PullRequestRef, TestGenerationPayload,
};
pub use phase::PhaseName;
pub use queue_job::{Lane, QueueJob, QueueJobState};
pub use story::{Story, StoryVerdict};
pub use task::{CompletedPhase, Task, TaskStatus};
pub use vulnerability::{Severity, Vulnerability, VulnerabilityCategory};
