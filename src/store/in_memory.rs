//! Reference [`DurableStore`] implementation.
//!
//! A single `tokio::sync::Mutex`-guarded set of maps. Good enough for the
//! crate's own test suite and for small single-process deployments; a
//! Postgres/Redis-backed implementation is an external collaborator per
//! spec.md §1.

use super::{DurableStore, TaskMutator};
use crate::error::CoreError;
use crate::model::{
    ActivityEntry, AgentExecution, ApprovalAuditEntry, CompletedPhase, Task, TaskStatus, ToolCall,
    Vulnerability,
};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::Mutex;

#[derive(Default)]
struct Tables {
    tasks: HashMap<String, Task>,
    executions: HashMap<String, AgentExecution>,
    tool_calls: HashMap<String, ToolCall>,
    vulnerabilities: Vec<Vulnerability>,
    approval_audit: Vec<ApprovalAuditEntry>,
    activity: HashMap<String, Vec<ActivityEntry>>,
}

/// In-memory reference implementation of [`DurableStore`].
pub struct InMemoryStore {
    tables: Mutex<Tables>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self { tables: Mutex::new(Tables::default()) }
    }
}

#[async_trait]
impl DurableStore for InMemoryStore {
    async fn put_task(&self, task: Task) -> Result<(), CoreError> {
        let mut tables = self.tables.lock().await;
        tables.tasks.insert(task.id.clone(), task);
        Ok(())
    }

    async fn get_task(&self, id: &str) -> Result<Option<Task>, CoreError> {
        let tables = self.tables.lock().await;
        Ok(tables.tasks.get(id).cloned())
    }

    async fn update_task(&self, id: &str, mutator: TaskMutator) -> Result<Task, CoreError> {
        let mut tables = self.tables.lock().await;
        let task = tables
            .tasks
            .get_mut(id)
            .ok_or_else(|| CoreError::NotFound(format!("task {}", id)))?;
        mutator(task);
        Ok(task.clone())
    }

    async fn set_task_status(&self, id: &str, status: TaskStatus) -> Result<Task, CoreError> {
        let mut tables = self.tables.lock().await;
        let task = tables
            .tasks
            .get_mut(id)
            .ok_or_else(|| CoreError::NotFound(format!("task {}", id)))?;
        task.status = status;
        Ok(task.clone())
    }

    async fn complete_phase(&self, id: &str, completed: CompletedPhase) -> Result<Task, CoreError> {
        let mut tables = self.tables.lock().await;
        let task = tables
            .tasks
            .get_mut(id)
            .ok_or_else(|| CoreError::NotFound(format!("task {}", id)))?;
        task.completed_phases.push(completed);
        task.current_phase = None;
        Ok(task.clone())
    }

    async fn recover_interrupted_tasks(&self) -> Result<Vec<Task>, CoreError> {
        let mut tables = self.tables.lock().await;
        let mut recovered = Vec::new();
        for task in tables.tasks.values_mut() {
            if matches!(task.status, TaskStatus::Running | TaskStatus::Paused) {
                task.status = TaskStatus::Interrupted;
                recovered.push(task.clone());
            }
        }
        Ok(recovered)
    }

    async fn list_tasks_by_status(&self, statuses: &[TaskStatus]) -> Result<Vec<Task>, CoreError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .tasks
            .values()
            .filter(|t| statuses.contains(&t.status))
            .cloned()
            .collect())
    }

    async fn append_execution(&self, execution: AgentExecution) -> Result<(), CoreError> {
        let mut tables = self.tables.lock().await;
        tables.executions.insert(execution.id.clone(), execution);
        Ok(())
    }

    async fn get_execution(&self, id: &str) -> Result<Option<AgentExecution>, CoreError> {
        let tables = self.tables.lock().await;
        Ok(tables.executions.get(id).cloned())
    }

    async fn update_execution(
        &self,
        id: &str,
        mutator: Box<dyn FnOnce(&mut AgentExecution) + Send>,
    ) -> Result<AgentExecution, CoreError> {
        let mut tables = self.tables.lock().await;
        let execution = tables
            .executions
            .get_mut(id)
            .ok_or_else(|| CoreError::NotFound(format!("execution {}", id)))?;
        mutator(execution);
        Ok(execution.clone())
    }

    async fn list_executions_by_task(&self, task_id: &str) -> Result<Vec<AgentExecution>, CoreError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .executions
            .values()
            .filter(|e| e.task_id == task_id)
            .cloned()
            .collect())
    }

    async fn append_tool_call(&self, call: ToolCall) -> Result<(), CoreError> {
        let mut tables = self.tables.lock().await;
        tables.tool_calls.insert(call.id.clone(), call);
        Ok(())
    }

    async fn get_tool_call(&self, id: &str) -> Result<Option<ToolCall>, CoreError> {
        let tables = self.tables.lock().await;
        Ok(tables.tool_calls.get(id).cloned())
    }

    async fn list_tool_calls_by_execution(
        &self,
        execution_id: &str,
    ) -> Result<Vec<ToolCall>, CoreError> {
        let tables = self.tables.lock().await;
        let mut calls: Vec<ToolCall> = tables
            .tool_calls
            .values()
            .filter(|c| c.execution_id == execution_id)
            .cloned()
            .collect();
        calls.sort_by_key(|c| c.call_order);
        Ok(calls)
    }

    async fn append_vulnerability(&self, vuln: Vulnerability) -> Result<(), CoreError> {
        let mut tables = self.tables.lock().await;
        tables.vulnerabilities.push(vuln);
        Ok(())
    }

    async fn list_vulnerabilities_by_task(
        &self,
        task_id: &str,
    ) -> Result<Vec<Vulnerability>, CoreError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .vulnerabilities
            .iter()
            .filter(|v| v.task_id == task_id)
            .cloned()
            .collect())
    }

    async fn append_approval_audit(&self, entry: ApprovalAuditEntry) -> Result<(), CoreError> {
        let mut tables = self.tables.lock().await;
        tables.approval_audit.push(entry);
        Ok(())
    }

    async fn list_approval_audit_by_task(
        &self,
        task_id: &str,
    ) -> Result<Vec<ApprovalAuditEntry>, CoreError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .approval_audit
            .iter()
            .filter(|e| e.task_id == task_id)
            .cloned()
            .collect())
    }

    async fn append_activity(&self, entry: ActivityEntry, buffer_size: usize) -> Result<(), CoreError> {
        let mut tables = self.tables.lock().await;
        let log = tables.activity.entry(entry.task_id.clone()).or_default();
        log.push(entry);
        if log.len() > buffer_size {
            let overflow = log.len() - buffer_size;
            log.drain(0..overflow);
        }
        Ok(())
    }

    async fn list_activity(&self, task_id: &str, last_k: usize) -> Result<Vec<ActivityEntry>, CoreError> {
        let tables = self.tables.lock().await;
        let log = match tables.activity.get(task_id) {
            Some(log) => log,
            None => return Ok(Vec::new()),
        };
        let start = log.len().saturating_sub(last_k);
        Ok(log[start..].to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::queue_job::Lane;

    fn sample_task(id: &str) -> Task {
        Task::new(id, "user-1", "title", "description", Lane::Regular, 0, chrono::Utc::now())
    }

    #[tokio::test]
    async fn recover_interrupted_transitions_running_and_paused_only() {
        let store = InMemoryStore::new();
        let mut running = sample_task("t-running");
        running.status = TaskStatus::Running;
        let mut paused = sample_task("t-paused");
        paused.status = TaskStatus::Paused;
        let completed = sample_task("t-completed");

        store.put_task(running).await.unwrap();
        store.put_task(paused).await.unwrap();
        store.put_task(completed).await.unwrap();

        let recovered = store.recover_interrupted_tasks().await.unwrap();
        assert_eq!(recovered.len(), 2);
        for task in &recovered {
            assert_eq!(task.status, TaskStatus::Interrupted);
        }

        let still_completed = store.get_task("t-completed").await.unwrap().unwrap();
        assert_eq!(still_completed.status, TaskStatus::Pending);
    }

    #[tokio::test]
    async fn activity_log_is_bounded() {
        let store = InMemoryStore::new();
        for i in 0..10 {
            let entry = ActivityEntry {
                id: format!("e{i}"),
                task_id: "t1".into(),
                kind: crate::model::ActivityType::Info,
                phase: None,
                story_id: None,
                content: format!("entry {i}"),
                details: None,
                timestamp: chrono::Utc::now(),
            };
            store.append_activity(entry, 5).await.unwrap();
        }
        let history = store.list_activity("t1", 100).await.unwrap();
        assert_eq!(history.len(), 5);
        assert_eq!(history.first().unwrap().content, "entry 5");
        assert_eq!(history.last().unwrap().content, "entry 9");
    }
}
