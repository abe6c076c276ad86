//! The Durable Store (spec.md §4.1): a transactional K/V layer over named
//! collections. The core only ever needs the operations below — no
//! streaming queries, no cross-row foreign-key enforcement.
//!
//! `DurableStore` is kept dyn-compatible (no generic methods) so it can be
//! shared as `Arc<dyn DurableStore>`, the same way the teacher crate shares
//! `Arc<dyn ClientWrapper>`. Row-level mutation goes through a boxed
//! closure rather than a generic type parameter.

mod in_memory;

pub use in_memory::InMemoryStore;

use crate::error::CoreError;
use crate::model::{
    ActivityEntry, AgentExecution, ApprovalAuditEntry, CompletedPhase, Task, TaskStatus, ToolCall,
    Vulnerability,
};
use async_trait::async_trait;

/// A mutation applied atomically to a single [`Task`] row.
pub type TaskMutator = Box<dyn FnOnce(&mut Task) + Send>;

#[async_trait]
pub trait DurableStore: Send + Sync {
    // ---- tasks ----

    async fn put_task(&self, task: Task) -> Result<(), CoreError>;
    async fn get_task(&self, id: &str) -> Result<Option<Task>, CoreError>;

    /// Atomic read-modify-write on a single task row.
    async fn update_task(&self, id: &str, mutator: TaskMutator) -> Result<Task, CoreError>;

    /// Atomically set `status` on a task (spec.md §4.1's "atomic status
    /// transitions").
    async fn set_task_status(&self, id: &str, status: TaskStatus) -> Result<Task, CoreError>;

    /// Atomically append `completed` to `completed_phases` and clear
    /// `current_phase` in the same transaction (spec.md §4.1, §4.5 step 4).
    async fn complete_phase(&self, id: &str, completed: CompletedPhase) -> Result<Task, CoreError>;

    /// Single-row conditional update used by crash recovery (spec.md §4.8):
    /// every task whose status is `running` or `paused` is transitioned to
    /// `interrupted` and returned.
    async fn recover_interrupted_tasks(&self) -> Result<Vec<Task>, CoreError>;

    async fn list_tasks_by_status(&self, statuses: &[TaskStatus]) -> Result<Vec<Task>, CoreError>;

    // ---- agent executions & tool calls (append-only) ----

    async fn append_execution(&self, execution: AgentExecution) -> Result<(), CoreError>;
    async fn get_execution(&self, id: &str) -> Result<Option<AgentExecution>, CoreError>;
    async fn update_execution(
        &self,
        id: &str,
        mutator: Box<dyn FnOnce(&mut AgentExecution) + Send>,
    ) -> Result<AgentExecution, CoreError>;
    async fn list_executions_by_task(&self, task_id: &str) -> Result<Vec<AgentExecution>, CoreError>;

    async fn append_tool_call(&self, call: ToolCall) -> Result<(), CoreError>;
    async fn get_tool_call(&self, id: &str) -> Result<Option<ToolCall>, CoreError>;
    async fn list_tool_calls_by_execution(&self, execution_id: &str)
        -> Result<Vec<ToolCall>, CoreError>;

    // ---- vulnerabilities (append-only) ----

    async fn append_vulnerability(&self, vuln: Vulnerability) -> Result<(), CoreError>;
    async fn list_vulnerabilities_by_task(&self, task_id: &str)
        -> Result<Vec<Vulnerability>, CoreError>;

    // ---- approval audit log (append-only) ----

    async fn append_approval_audit(&self, entry: ApprovalAuditEntry) -> Result<(), CoreError>;
    async fn list_approval_audit_by_task(
        &self,
        task_id: &str,
    ) -> Result<Vec<ApprovalAuditEntry>, CoreError>;

    // ---- activity archive (append-only, bounded per task) ----

    async fn append_activity(&self, entry: ActivityEntry, buffer_size: usize) -> Result<(), CoreError>;
    async fn list_activity(&self, task_id: &str, last_k: usize) -> Result<Vec<ActivityEntry>, CoreError>;
}
