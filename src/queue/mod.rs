//! The Job Queue (spec.md §4.8): two lanes, premium drained preferentially,
//! crash recovery re-enqueues interrupted tasks at the front of their lane.

mod in_memory;

pub use in_memory::InMemoryJobQueueBackend;

use crate::clock::Clock;
use crate::error::CoreError;
use crate::model::{Lane, QueueJob, QueueJobState};
use async_trait::async_trait;
use std::sync::Arc;

/// The external interface named in spec.md §6: "push to lane, pop blocking
/// with lane priority, peek for position, remove by taskId, set/get job
/// state, list by lane and state." Dyn-compatible for `Arc<dyn
/// JobQueueBackend>` injection.
#[async_trait]
pub trait JobQueueBackend: Send + Sync {
    async fn push(&self, job: QueueJob) -> Result<(), CoreError>;

    /// Push `job` so it is dequeued ahead of everything else currently
    /// waiting in its lane (crash recovery, spec.md §4.8).
    async fn push_front(&self, job: QueueJob) -> Result<(), CoreError>;

    /// Block until a job is available in `lane`, respecting priority
    /// ordering, then mark it active and return it.
    async fn pop(&self, lane: Lane) -> Result<QueueJob, CoreError>;

    async fn remove(&self, task_id: &str) -> Result<bool, CoreError>;

    /// 1-based position in the combined waiting set, or `None` if not
    /// waiting (spec.md §8 invariant 7 treats dequeue order as a single
    /// ordering over the whole waiting set: premium lane first, then
    /// priority desc, then enqueue time asc).
    async fn position(&self, task_id: &str) -> Result<Option<usize>, CoreError>;

    async fn set_state(&self, job_id: &str, state: QueueJobState) -> Result<(), CoreError>;
    async fn get_state(&self, job_id: &str) -> Result<Option<QueueJobState>, CoreError>;
    async fn list_by_lane_and_state(
        &self,
        lane: Lane,
        state: QueueJobState,
    ) -> Result<Vec<QueueJob>, CoreError>;

    /// Whether `cancel` has been requested for `task_id` since its last job
    /// was enqueued. The queue itself cannot abort a running worker; this
    /// is the signal the worker polls at its suspension points.
    async fn is_cancel_requested(&self, task_id: &str) -> bool;
    async fn request_cancel(&self, task_id: &str);

    /// Record how long a job in `lane` took to finish end to end, feeding
    /// the moving average behind `estimate_wait`.
    async fn record_duration(&self, lane: Lane, seconds: f64);
    async fn average_duration(&self, lane: Lane) -> Option<f64>;
}

/// Friendly façade over a [`JobQueueBackend`], matching the operation names
/// in spec.md §4.8 exactly: `enqueue`, `cancel`, `position`, `estimateWait`.
pub struct JobQueue<Q: JobQueueBackend, C: Clock> {
    backend: Arc<Q>,
    clock: Arc<C>,
    max_attempts: u32,
}

impl<Q: JobQueueBackend, C: Clock> JobQueue<Q, C> {
    pub fn new(backend: Arc<Q>, clock: Arc<C>, max_attempts: u32) -> Self {
        Self { backend, clock, max_attempts }
    }

    pub async fn enqueue(
        &self,
        task_id: &str,
        lane: Lane,
        priority: i32,
    ) -> Result<String, CoreError> {
        let job = QueueJob::new(uuid::Uuid::new_v4().to_string(), task_id, lane, priority, self.clock.now());
        let job_id = job.id.clone();
        self.backend.push(job).await?;
        Ok(job_id)
    }

    /// Re-enqueue at the front of its lane, for crash recovery (spec.md
    /// §4.8, §8 invariant 6).
    pub async fn enqueue_at_front(
        &self,
        task_id: &str,
        lane: Lane,
        priority: i32,
    ) -> Result<String, CoreError> {
        let job = QueueJob::new(uuid::Uuid::new_v4().to_string(), task_id, lane, priority, self.clock.now());
        let job_id = job.id.clone();
        self.backend.push_front(job).await?;
        Ok(job_id)
    }

    pub async fn cancel(&self, task_id: &str) -> Result<(), CoreError> {
        self.backend.request_cancel(task_id).await;
        self.backend.remove(task_id).await?;
        Ok(())
    }

    pub async fn position(&self, task_id: &str) -> Result<Option<usize>, CoreError> {
        self.backend.position(task_id).await
    }

    /// Seconds estimate: moving-average job duration for `lane` times the
    /// number of jobs currently waiting ahead, assuming one active worker
    /// is the bottleneck. A dedicated worker pool per lane makes this a
    /// reasonable approximation rather than an exact ETA.
    pub async fn estimate_wait(&self, lane: Lane) -> Result<f64, CoreError> {
        let avg = self.backend.average_duration(lane).await.unwrap_or(0.0);
        let waiting = self
            .backend
            .list_by_lane_and_state(lane, QueueJobState::Waiting)
            .await?
            .len();
        Ok(avg * waiting as f64)
    }

    /// Pull a job for `lane`, handling the attempt policy: a transient
    /// infrastructure error gets exactly one retry, agent-reported errors
    /// do not retry (spec.md §4.8, §7).
    pub async fn pop(&self, lane: Lane) -> Result<QueueJob, CoreError> {
        self.backend.pop(lane).await
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub async fn is_cancel_requested(&self, task_id: &str) -> bool {
        self.backend.is_cancel_requested(task_id).await
    }

    pub async fn record_duration(&self, lane: Lane, seconds: f64) {
        self.backend.record_duration(lane, seconds).await
    }
}
