//! Reference [`JobQueueBackend`] implementation: two in-process lanes
//! ordered (premium first, priority desc, enqueue time asc), backed by
//! `tokio::sync::Notify` for blocking pop.

use super::JobQueueBackend;
use crate::error::CoreError;
use crate::model::{Lane, QueueJob, QueueJobState};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use tokio::sync::{Mutex, Notify};

fn lane_rank(lane: Lane) -> u8 {
    match lane {
        Lane::Premium => 0,
        Lane::Regular => 1,
    }
}

/// Combined dequeue ordering per spec.md §8 invariant 7.
fn cmp_jobs(a: &QueueJob, b: &QueueJob) -> std::cmp::Ordering {
    lane_rank(a.lane)
        .cmp(&lane_rank(b.lane))
        .then_with(|| b.priority.cmp(&a.priority))
        .then_with(|| a.enqueued_at.cmp(&b.enqueued_at))
}

#[derive(Default)]
struct Tables {
    front: HashMap<Lane, VecDeque<QueueJob>>,
    waiting: Vec<QueueJob>,
    active: HashMap<String, QueueJob>,
    completed: Vec<QueueJob>,
    failed: Vec<QueueJob>,
    cancelled: HashSet<String>,
    durations: HashMap<Lane, VecDeque<f64>>,
}

pub struct InMemoryJobQueueBackend {
    tables: Mutex<Tables>,
    notify: Notify,
}

impl Default for InMemoryJobQueueBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryJobQueueBackend {
    pub fn new() -> Self {
        Self { tables: Mutex::new(Tables::default()), notify: Notify::new() }
    }

    fn combined_order(tables: &Tables) -> Vec<QueueJob> {
        let mut ordered: Vec<QueueJob> = Vec::new();
        for lane in [Lane::Premium, Lane::Regular] {
            if let Some(front) = tables.front.get(&lane) {
                ordered.extend(front.iter().cloned());
            }
        }
        let mut waiting = tables.waiting.clone();
        waiting.sort_by(cmp_jobs);
        ordered.extend(waiting);
        ordered
    }
}

#[async_trait]
impl JobQueueBackend for InMemoryJobQueueBackend {
    async fn push(&self, job: QueueJob) -> Result<(), CoreError> {
        let mut tables = self.tables.lock().await;
        tables.waiting.push(job);
        self.notify.notify_waiters();
        Ok(())
    }

    async fn push_front(&self, job: QueueJob) -> Result<(), CoreError> {
        let mut tables = self.tables.lock().await;
        tables.front.entry(job.lane).or_default().push_back(job);
        self.notify.notify_waiters();
        Ok(())
    }

    async fn pop(&self, lane: Lane) -> Result<QueueJob, CoreError> {
        loop {
            {
                let mut tables = self.tables.lock().await;
                if let Some(front) = tables.front.get_mut(&lane) {
                    if let Some(mut job) = front.pop_front() {
                        job.state = QueueJobState::Active;
                        tables.active.insert(job.id.clone(), job.clone());
                        return Ok(job);
                    }
                }
                tables.waiting.sort_by(cmp_jobs);
                if let Some(idx) = tables.waiting.iter().position(|j| j.lane == lane) {
                    let mut job = tables.waiting.remove(idx);
                    job.state = QueueJobState::Active;
                    tables.active.insert(job.id.clone(), job.clone());
                    return Ok(job);
                }
            }
            self.notify.notified().await;
        }
    }

    async fn remove(&self, task_id: &str) -> Result<bool, CoreError> {
        let mut tables = self.tables.lock().await;
        let before = tables.waiting.len();
        tables.waiting.retain(|j| j.task_id != task_id);
        let removed_waiting = tables.waiting.len() != before;

        let mut removed_front = false;
        for deque in tables.front.values_mut() {
            let before = deque.len();
            deque.retain(|j| j.task_id != task_id);
            if deque.len() != before {
                removed_front = true;
            }
        }
        Ok(removed_waiting || removed_front)
    }

    async fn position(&self, task_id: &str) -> Result<Option<usize>, CoreError> {
        let tables = self.tables.lock().await;
        let ordered = Self::combined_order(&tables);
        Ok(ordered.iter().position(|j| j.task_id == task_id).map(|i| i + 1))
    }

    async fn set_state(&self, job_id: &str, state: QueueJobState) -> Result<(), CoreError> {
        let mut tables = self.tables.lock().await;
        if let Some(mut job) = tables.active.remove(job_id) {
            job.state = state;
            match state {
                QueueJobState::Completed => tables.completed.push(job),
                QueueJobState::Failed => tables.failed.push(job),
                _ => {
                    tables.active.insert(job_id.to_string(), job);
                }
            }
            return Ok(());
        }
        if let Some(job) = tables.waiting.iter_mut().find(|j| j.id == job_id) {
            job.state = state;
            return Ok(());
        }
        Err(CoreError::NotFound(format!("queue job {}", job_id)))
    }

    async fn get_state(&self, job_id: &str) -> Result<Option<QueueJobState>, CoreError> {
        let tables = self.tables.lock().await;
        if let Some(job) = tables.active.get(job_id) {
            return Ok(Some(job.state));
        }
        if let Some(job) = tables.waiting.iter().find(|j| j.id == job_id) {
            return Ok(Some(job.state));
        }
        if let Some(job) = tables.completed.iter().find(|j| j.id == job_id) {
            return Ok(Some(job.state));
        }
        if let Some(job) = tables.failed.iter().find(|j| j.id == job_id) {
            return Ok(Some(job.state));
        }
        Ok(None)
    }

    async fn list_by_lane_and_state(
        &self,
        lane: Lane,
        state: QueueJobState,
    ) -> Result<Vec<QueueJob>, CoreError> {
        let tables = self.tables.lock().await;
        let all = Self::combined_order(&tables)
            .into_iter()
            .chain(tables.active.values().cloned())
            .chain(tables.completed.iter().cloned())
            .chain(tables.failed.iter().cloned());
        Ok(all.filter(|j| j.lane == lane && j.state == state).collect())
    }

    async fn is_cancel_requested(&self, task_id: &str) -> bool {
        self.tables.lock().await.cancelled.contains(task_id)
    }

    async fn request_cancel(&self, task_id: &str) {
        self.tables.lock().await.cancelled.insert(task_id.to_string());
    }

    async fn record_duration(&self, lane: Lane, seconds: f64) {
        let mut tables = self.tables.lock().await;
        let samples = tables.durations.entry(lane).or_default();
        samples.push_back(seconds);
        if samples.len() > 20 {
            samples.pop_front();
        }
    }

    async fn average_duration(&self, lane: Lane) -> Option<f64> {
        let tables = self.tables.lock().await;
        let samples = tables.durations.get(&lane)?;
        if samples.is_empty() {
            return None;
        }
        Some(samples.iter().sum::<f64>() / samples.len() as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, SystemClock};
    use std::sync::Arc;

    fn job(task_id: &str, lane: Lane, priority: i32, millis: i64) -> QueueJob {
        let now = SystemClock.now() + chrono::Duration::milliseconds(millis);
        QueueJob::new(uuid::Uuid::new_v4().to_string(), task_id, lane, priority, now)
    }

    #[tokio::test]
    async fn premium_is_drained_before_regular_at_equal_priority() {
        let backend = Arc::new(InMemoryJobQueueBackend::new());
        backend.push(job("regular-1", Lane::Regular, 5, 0)).await.unwrap();
        backend.push(job("premium-1", Lane::Premium, 5, 10)).await.unwrap();

        let first = backend.pop(Lane::Premium).await.unwrap();
        assert_eq!(first.task_id, "premium-1");
    }

    #[tokio::test]
    async fn within_lane_higher_priority_then_fifo() {
        let backend = Arc::new(InMemoryJobQueueBackend::new());
        backend.push(job("low", Lane::Regular, 1, 0)).await.unwrap();
        backend.push(job("high", Lane::Regular, 9, 10)).await.unwrap();
        backend.push(job("high-later", Lane::Regular, 9, 20)).await.unwrap();

        let first = backend.pop(Lane::Regular).await.unwrap();
        assert_eq!(first.task_id, "high");
        let second = backend.pop(Lane::Regular).await.unwrap();
        assert_eq!(second.task_id, "high-later");
        let third = backend.pop(Lane::Regular).await.unwrap();
        assert_eq!(third.task_id, "low");
    }

    #[tokio::test]
    async fn push_front_wins_over_regular_priority_ordering() {
        let backend = Arc::new(InMemoryJobQueueBackend::new());
        backend.push(job("normal", Lane::Regular, 100, 0)).await.unwrap();
        backend.push_front(job("recovered", Lane::Regular, 0, 50)).await.unwrap();

        let first = backend.pop(Lane::Regular).await.unwrap();
        assert_eq!(first.task_id, "recovered");
    }

    #[tokio::test]
    async fn position_reports_one_based_index_in_combined_order() {
        let backend = Arc::new(InMemoryJobQueueBackend::new());
        backend.push(job("a", Lane::Regular, 5, 0)).await.unwrap();
        backend.push(job("b", Lane::Premium, 5, 10)).await.unwrap();

        assert_eq!(backend.position("b").await.unwrap(), Some(1));
        assert_eq!(backend.position("a").await.unwrap(), Some(2));
        assert_eq!(backend.position("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn cancel_request_is_observable_without_removing_active_job() {
        let backend = InMemoryJobQueueBackend::new();
        backend.push(job("t1", Lane::Regular, 0, 0)).await.unwrap();
        let popped = backend.pop(Lane::Regular).await.unwrap();
        assert_eq!(popped.state, QueueJobState::Active);

        backend.request_cancel("t1").await;
        assert!(backend.is_cancel_requested("t1").await);
    }
}
