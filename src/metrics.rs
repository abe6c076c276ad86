//! Cost & Metrics Aggregator (SPEC_FULL.md, supplementing §4's component
//! list): sums every [`AgentExecution`]'s token and dollar figures for a
//! task into the task-level totals the HTTP layer reports.

use crate::error::CoreError;
use crate::model::Task;
use crate::store::DurableStore;

/// Per-task rollup of every recorded agent execution.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TaskCost {
    pub total_tokens: u64,
    pub total_cost_usd: f64,
    pub execution_count: u32,
}

/// Recompute `total_tokens`/`total_cost_usd` for `task_id` from its
/// recorded executions and persist the result onto the Task row.
pub async fn recompute<S: DurableStore>(store: &S, task_id: &str) -> Result<Task, CoreError> {
    let cost = aggregate(store, task_id).await?;
    store
        .update_task(
            task_id,
            Box::new(move |task| {
                task.total_tokens = cost.total_tokens;
                task.total_cost_usd = cost.total_cost_usd;
            }),
        )
        .await
}

/// Sum every execution recorded for `task_id` without writing anything
/// back — useful for reporting mid-task totals.
pub async fn aggregate<S: DurableStore>(store: &S, task_id: &str) -> Result<TaskCost, CoreError> {
    let executions = store.list_executions_by_task(task_id).await?;
    let mut cost = TaskCost::default();
    for execution in &executions {
        cost.total_tokens += execution.total_tokens();
        cost.total_cost_usd += execution.cost_usd;
        cost.execution_count += 1;
    }
    Ok(cost)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::execution::ExecutionStatus;
    use crate::model::queue_job::Lane;
    use crate::model::AgentExecution;
    use crate::store::InMemoryStore;

    fn execution(id: &str, task_id: &str, prompt: u64, completion: u64, cost: f64) -> AgentExecution {
        AgentExecution {
            id: id.to_string(),
            task_id: task_id.to_string(),
            phase: "developer".to_string(),
            agent_role: "developer".to_string(),
            prompt_excerpt: String::new(),
            final_output: None,
            prompt_tokens: prompt,
            completion_tokens: completion,
            cost_usd: cost,
            duration_ms: Some(1_000),
            status: ExecutionStatus::Completed,
            error: None,
            started_at: chrono::Utc::now(),
            ended_at: Some(chrono::Utc::now()),
        }
    }

    #[tokio::test]
    async fn recompute_sums_every_execution_for_the_task() {
        let store = InMemoryStore::new();
        let task = Task::new("t1", "user-1", "title", "description", Lane::Regular, 0, chrono::Utc::now());
        store.put_task(task).await.unwrap();

        store.append_execution(execution("e1", "t1", 100, 50, 0.01)).await.unwrap();
        store.append_execution(execution("e2", "t1", 200, 75, 0.02)).await.unwrap();
        store.append_execution(execution("e3", "t2", 999, 999, 9.99)).await.unwrap();

        let updated = recompute(&store, "t1").await.unwrap();
        assert_eq!(updated.total_tokens, 425);
        assert!((updated.total_cost_usd - 0.03).abs() < 1e-9);
    }
}
