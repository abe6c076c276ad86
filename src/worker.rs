//! The worker pool (spec.md §4.8, §5): ties the Job Queue to the
//! Orchestrator. A worker suspends only at the points spec.md §5 names —
//! `queue.pop`, durable-store I/O, and whatever the Orchestrator itself
//! awaits — and drives exactly one task at a time end to end.

use crate::agent_client::CodeAgentClient;
use crate::clock::Clock;
use crate::error::CoreError;
use crate::eventbus::EventBus;
use crate::model::{Lane, QueueJob, QueueJobState, Task};
use crate::orchestrator::Orchestrator;
use crate::queue::JobQueueBackend;
use crate::store::DurableStore;
use crate::workspace::{CredentialVault, GitClient, RepoSpec};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Resolves the repositories a task operates over from `Task.repository_ids`.
/// Out of scope for the core (spec.md names the project/repository registry
/// as external state); this is the seam a caller plugs an implementation
/// into, the same way [`GitClient`] and [`CredentialVault`] are seams.
#[async_trait]
pub trait RepoResolver: Send + Sync {
    async fn resolve(&self, task: &Task) -> Result<Vec<RepoSpec>, CoreError>;
}

/// Drives `lane` against `orchestrator`, one task at a time per spawned
/// loop, with `concurrency` such loops running per lane (spec.md §6's
/// `workers.regular` / `workers.premium`).
pub struct Worker<S, B, C, A, G, V, Q, R>
where
    S: DurableStore + 'static,
    B: EventBus + 'static,
    C: Clock + 'static,
    A: CodeAgentClient + 'static,
    G: GitClient + 'static,
    V: CredentialVault + 'static,
    Q: JobQueueBackend + 'static,
    R: RepoResolver + 'static,
{
    orchestrator: Arc<Orchestrator<S, B, C, A, G, V>>,
    store: Arc<S>,
    queue: Arc<Q>,
    clock: Arc<C>,
    resolver: Arc<R>,
    max_attempts: u32,
}

impl<S, B, C, A, G, V, Q, R> Worker<S, B, C, A, G, V, Q, R>
where
    S: DurableStore + 'static,
    B: EventBus + 'static,
    C: Clock + 'static,
    A: CodeAgentClient + 'static,
    G: GitClient + 'static,
    V: CredentialVault + 'static,
    Q: JobQueueBackend + 'static,
    R: RepoResolver + 'static,
{
    pub fn new(
        orchestrator: Arc<Orchestrator<S, B, C, A, G, V>>,
        store: Arc<S>,
        queue: Arc<Q>,
        clock: Arc<C>,
        resolver: Arc<R>,
        max_attempts: u32,
    ) -> Arc<Self> {
        Arc::new(Self { orchestrator, store, queue, clock, resolver, max_attempts })
    }

    /// Spawn `concurrency` independent loops pulling from `lane`. Each loop
    /// blocks on `queue.pop` between tasks — the pool-sizing knob named in
    /// spec.md §6.
    pub fn spawn_pool(self: &Arc<Self>, lane: Lane, concurrency: usize) -> Vec<JoinHandle<()>> {
        (0..concurrency)
            .map(|_| {
                let worker = self.clone();
                tokio::spawn(async move { worker.run_loop(lane).await })
            })
            .collect()
    }

    async fn run_loop(self: Arc<Self>, lane: Lane) {
        loop {
            let job = match self.queue.pop(lane).await {
                Ok(job) => job,
                Err(CoreError::Cancelled(_)) => continue,
                Err(_) => continue,
            };
            self.process(job).await;
        }
    }

    async fn process(&self, job: QueueJob) {
        let task_id = job.task_id.clone();

        if self.queue.is_cancel_requested(&task_id).await {
            let _ = self.queue.set_state(&job.id, QueueJobState::Completed).await;
            return;
        }

        let repos = match self.store.get_task(&task_id).await {
            Ok(Some(task)) => match self.resolver.resolve(&task).await {
                Ok(repos) => repos,
                Err(e) => {
                    self.fail(&job, &task_id, e).await;
                    return;
                }
            },
            Ok(None) => {
                self.fail(&job, &task_id, CoreError::NotFound(format!("task {task_id}"))).await;
                return;
            }
            Err(e) => {
                self.fail(&job, &task_id, e).await;
                return;
            }
        };

        let started = self.clock.now();
        let result = self.orchestrator.execute(&task_id, &repos).await;
        let elapsed_secs = (self.clock.now() - started).num_milliseconds().max(0) as f64 / 1_000.0;
        self.queue.record_duration(job.lane, elapsed_secs).await;

        match result {
            Ok(()) => {
                log::info!("task {task_id}: job {} completed in {elapsed_secs:.1}s", job.id);
                let _ = self.queue.set_state(&job.id, QueueJobState::Completed).await;
            }
            Err(e) => self.fail(&job, &task_id, e).await,
        }
    }

    async fn fail(&self, job: &QueueJob, task_id: &str, error: CoreError) {
        if error.is_retryable() && job.attempt + 1 < self.max_attempts {
            log::warn!("task {task_id}: job {} failed with a retryable error, retrying (attempt {}): {error}", job.id, job.attempt + 1);
            let mut retry = job.clone();
            retry.attempt += 1;
            retry.last_error = Some(error.to_string());
            let _ = self.queue.push_front(retry).await;
            return;
        }
        log::error!("task {task_id}: job {} failed permanently: {error}", job.id);
        let _ = self.queue.set_state(&job.id, QueueJobState::Failed).await;
        let _ = self
            .store
            .update_task(task_id, {
                let reason = error.to_string();
                Box::new(move |t| t.failure_reason = Some(reason))
            })
            .await;
    }
}

/// Boot-time crash recovery (spec.md §4.8): every `Task` left `running` or
/// `paused` by a worker that died mid-execution is flipped to
/// `interrupted` and its job is re-enqueued at the front of its lane. The
/// Orchestrator's own resume logic (spec.md §4.5) picks up from there.
pub async fn recover_interrupted<S: DurableStore, Q: JobQueueBackend, C: Clock>(
    store: &S,
    queue: &Q,
    clock: &C,
) -> Result<usize, CoreError> {
    let recovered = store.recover_interrupted_tasks().await?;
    if !recovered.is_empty() {
        log::info!("recovering {} task(s) interrupted by a prior crash", recovered.len());
    }
    for task in &recovered {
        let job = QueueJob::new(uuid::Uuid::new_v4().to_string(), &task.id, task.lane, task.priority, clock.now());
        queue.push_front(job).await?;
    }
    Ok(recovered.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::queue_job::Lane;
    use crate::queue::InMemoryJobQueueBackend;
    use crate::store::InMemoryStore;

    #[tokio::test]
    async fn recover_interrupted_requeues_at_front_of_own_lane() {
        let store = InMemoryStore::new();
        let queue = InMemoryJobQueueBackend::new();
        let clock = crate::clock::SystemClock;

        let mut task = Task::new("t1", "user-1", "title", "desc", Lane::Premium, 5, clock.now());
        task.status = crate::model::TaskStatus::Running;
        store.put_task(task).await.unwrap();

        let recovered = recover_interrupted(&store, &queue, &clock).await.unwrap();
        assert_eq!(recovered, 1);

        let job = queue.pop(Lane::Premium).await.unwrap();
        assert_eq!(job.task_id, "t1");

        let updated = store.get_task("t1").await.unwrap().unwrap();
        assert_eq!(updated.status, crate::model::TaskStatus::Interrupted);
    }
}
