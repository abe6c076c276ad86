//! Core error types.
//!
//! Mirrors the teacher crate's hand-written `Error`/`Display` enums
//! (`OrchestrationError`, `ToolError`, `CouncilError`) rather than reaching
//! for `thiserror`/`anyhow`.

use std::error::Error;
use std::fmt;

/// The eight error kinds named in spec.md §7, collapsed into one enum.
///
/// `Validation` and `NotFound` are expected to be handled at the HTTP
/// boundary (out of scope here) before reaching the core; they are kept in
/// this enum anyway so internal callers that validate inputs (e.g. the job
/// queue rejecting an unknown lane) have a home for the error.
#[derive(Debug, Clone)]
pub enum CoreError {
    /// A request payload failed structural validation.
    Validation(String),
    /// A referenced task, story, checkpoint, or repository does not exist.
    NotFound(String),
    /// A transient infrastructure failure (DB/Redis/event-bus). The queue
    /// retries these once per spec.md §4.8's attempt policy.
    Transient(String),
    /// The code agent errored, timed out, or returned unparseable judge
    /// output.
    AgentError(String),
    /// A checkpoint was explicitly rejected by a human reviewer.
    UserRejection { checkpoint: String, feedback: Option<String> },
    /// The security observer emitted a `blocked = true` vulnerability and
    /// the phase chose to treat it as fatal.
    PolicyBlock { vulnerability_id: String, reason: String },
    /// The task was cancelled mid-execution.
    Cancelled(String),
    /// An invariant was violated or an unreachable branch was hit.
    Fatal(String),
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoreError::Validation(msg) => write!(f, "validation error: {}", msg),
            CoreError::NotFound(msg) => write!(f, "not found: {}", msg),
            CoreError::Transient(msg) => write!(f, "transient infrastructure error: {}", msg),
            CoreError::AgentError(msg) => write!(f, "agent error: {}", msg),
            CoreError::UserRejection { checkpoint, feedback } => write!(
                f,
                "rejected at checkpoint '{}'{}",
                checkpoint,
                feedback
                    .as_ref()
                    .map(|fb| format!(": {}", fb))
                    .unwrap_or_default()
            ),
            CoreError::PolicyBlock { vulnerability_id, reason } => write!(
                f,
                "policy block from vulnerability {}: {}",
                vulnerability_id, reason
            ),
            CoreError::Cancelled(task_id) => write!(f, "task {} was cancelled", task_id),
            CoreError::Fatal(msg) => write!(f, "fatal error: {}", msg),
        }
    }
}

impl Error for CoreError {}

impl CoreError {
    /// Whether the job queue should retry this error once, per the attempt
    /// policy in spec.md §4.8 ("agent-reported errors do not retry").
    pub fn is_retryable(&self) -> bool {
        matches!(self, CoreError::Transient(_))
    }
}

/// Narrower error surfaced by an individual phase executor before the
/// orchestrator folds it into `Task.failure_reason`.
#[derive(Debug, Clone)]
pub struct PhaseError {
    pub phase: String,
    pub source: CoreError,
}

impl fmt::Display for PhaseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "phase '{}' failed: {}", self.phase, self.source)
    }
}

impl Error for PhaseError {}

impl PhaseError {
    pub fn new(phase: impl Into<String>, source: CoreError) -> Self {
        Self { phase: phase.into(), source }
    }
}
