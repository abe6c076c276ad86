//! The Approval Broker (spec.md §4.3): a rendezvous between a suspended
//! phase and an out-of-band human decision, with an audit trail and a
//! bounded feedback-loop counter per checkpoint.

use crate::clock::Clock;
use crate::error::CoreError;
use crate::eventbus::{BusEvent, EventBus};
use crate::model::{ApprovalAction, ApprovalAuditEntry};
use crate::store::DurableStore;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{oneshot, Mutex};

/// The decision delivered to a suspended `request` call.
#[derive(Debug, Clone)]
pub struct ApprovalResponse {
    pub action: ApprovalAction,
    pub feedback: Option<String>,
}

struct PendingApproval {
    payload: serde_json::Value,
    attempt: u32,
    responder: oneshot::Sender<ApprovalResponse>,
}

fn key(task_id: &str, checkpoint_name: &str) -> (String, String) {
    (task_id.to_string(), checkpoint_name.to_string())
}

/// Lock-protected map of live rendezvous points, one DurableStore-backed
/// audit trail, and an Event Bus to announce `approval-required`.
///
/// Grounded in the teacher crate's `Arc<Mutex<HashMap<...>>>` pattern for
/// process-local session state (`ClientWrapper` session maps), generalized
/// here to oneshot-channel rendezvous per spec.md §9's note that ambient
/// mutable maps should become lock-protected collections keyed by
/// `(taskId, ...)`.
pub struct ApprovalBroker<S: DurableStore, B: EventBus, C: Clock> {
    store: Arc<S>,
    bus: Arc<B>,
    clock: Arc<C>,
    pending: Mutex<HashMap<(String, String), PendingApproval>>,
    attempts: Mutex<HashMap<(String, String), u32>>,
}

impl<S: DurableStore, B: EventBus, C: Clock> ApprovalBroker<S, B, C> {
    pub fn new(store: Arc<S>, bus: Arc<B>, clock: Arc<C>) -> Self {
        Self {
            store,
            bus,
            clock,
            pending: Mutex::new(HashMap::new()),
            attempts: Mutex::new(HashMap::new()),
        }
    }

    /// Suspend the caller on a fresh rendezvous for `(task_id,
    /// checkpoint_name)`, publishing `approval-required` with `payload`.
    /// `timeout_ms = 0` waits forever (spec.md §4.3 property b).
    pub async fn request(
        &self,
        task_id: &str,
        checkpoint_name: &str,
        payload: serde_json::Value,
        timeout_ms: u64,
    ) -> Result<ApprovalResponse, CoreError> {
        let k = key(task_id, checkpoint_name);
        let (tx, rx) = oneshot::channel();

        let attempt = {
            let mut pending = self.pending.lock().await;
            if pending.contains_key(&k) {
                return Err(CoreError::Validation(format!(
                    "an approval is already pending for task {} checkpoint {}",
                    task_id, checkpoint_name
                )));
            }
            let mut attempts = self.attempts.lock().await;
            let attempt = attempts.entry(k.clone()).or_insert(0);
            *attempt += 1;
            let attempt = *attempt;
            pending.insert(k.clone(), PendingApproval { payload: payload.clone(), attempt, responder: tx });
            attempt
        };

        let event = BusEvent::new(
            "approval-required",
            serde_json::json!({
                "taskId": task_id,
                "checkpointName": checkpoint_name,
                "approvalAttempt": attempt,
                "payload": payload,
            }),
            self.clock.now(),
        );
        self.bus.publish(task_id, event).await;

        let response = if timeout_ms == 0 {
            rx.await.map_err(|_| CoreError::Fatal("approval rendezvous dropped".into()))?
        } else {
            match tokio::time::timeout(std::time::Duration::from_millis(timeout_ms), rx).await {
                Ok(result) => result.map_err(|_| CoreError::Fatal("approval rendezvous dropped".into()))?,
                Err(_) => {
                    self.pending.lock().await.remove(&k);
                    self.audit(task_id, checkpoint_name, ApprovalAction::Timeout, None, attempt).await?;
                    return Ok(ApprovalResponse { action: ApprovalAction::Timeout, feedback: None });
                }
            }
        };

        Ok(response)
    }

    /// Deliver a decision to the rendezvous for `(task_id,
    /// checkpoint_name)`. Writes the audit entry before the waiting
    /// `request` call observes it (spec.md §4.3 property d).
    pub async fn resolve(
        &self,
        task_id: &str,
        checkpoint_name: &str,
        action: ApprovalAction,
        feedback: Option<String>,
    ) -> Result<(), CoreError> {
        let k = key(task_id, checkpoint_name);
        let entry = {
            let mut pending = self.pending.lock().await;
            pending.remove(&k).ok_or_else(|| {
                CoreError::NotFound(format!(
                    "no pending approval for task {} checkpoint {}",
                    task_id, checkpoint_name
                ))
            })?
        };

        self.audit(task_id, checkpoint_name, action, feedback.clone(), entry.attempt).await?;
        let _ = entry.responder.send(ApprovalResponse { action, feedback });
        Ok(())
    }

    /// Resolve every pending approval for `task_id` as a rejection
    /// (spec.md §4.3, §4.5 cancellation semantics).
    pub async fn cancel_task(&self, task_id: &str) -> Result<(), CoreError> {
        let entries: Vec<((String, String), PendingApproval)> = {
            let mut pending = self.pending.lock().await;
            let keys: Vec<(String, String)> =
                pending.keys().filter(|(t, _)| t == task_id).cloned().collect();
            keys.into_iter().filter_map(|k| pending.remove(&k).map(|v| (k, v))).collect()
        };

        for ((task_id, checkpoint_name), entry) in entries {
            self.audit(
                &task_id,
                &checkpoint_name,
                ApprovalAction::Cancel,
                Some("task_cancelled".to_string()),
                entry.attempt,
            )
            .await?;
            let _ = entry.responder.send(ApprovalResponse {
                action: ApprovalAction::Reject,
                feedback: Some("task_cancelled".to_string()),
            });
        }
        Ok(())
    }

    pub async fn has_pending(&self, task_id: &str, checkpoint_name: &str) -> bool {
        self.pending.lock().await.contains_key(&key(task_id, checkpoint_name))
    }

    /// Re-publish the last `approval-required` event for a still-pending
    /// rendezvous, for clients that joined late.
    pub async fn resend(&self, task_id: &str) -> Result<(), CoreError> {
        let pending = self.pending.lock().await;
        for ((t, checkpoint_name), entry) in pending.iter() {
            if t != task_id {
                continue;
            }
            let event = BusEvent::new(
                "approval-required",
                serde_json::json!({
                    "taskId": task_id,
                    "checkpointName": checkpoint_name,
                    "approvalAttempt": entry.attempt,
                    "payload": entry.payload,
                }),
                self.clock.now(),
            );
            self.bus.publish(task_id, event).await;
        }
        Ok(())
    }

    async fn audit(
        &self,
        task_id: &str,
        checkpoint_name: &str,
        action: ApprovalAction,
        feedback: Option<String>,
        attempt: u32,
    ) -> Result<(), CoreError> {
        self.store
            .append_approval_audit(ApprovalAuditEntry {
                id: uuid::Uuid::new_v4().to_string(),
                task_id: task_id.to_string(),
                checkpoint_name: checkpoint_name.to_string(),
                action,
                feedback,
                attempt,
                timestamp: self.clock.now(),
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::eventbus::InMemoryEventBus;
    use crate::store::InMemoryStore;

    fn broker() -> ApprovalBroker<InMemoryStore, InMemoryEventBus, SystemClock> {
        ApprovalBroker::new(
            Arc::new(InMemoryStore::new()),
            Arc::new(InMemoryEventBus::new()),
            Arc::new(SystemClock),
        )
    }

    #[tokio::test]
    async fn second_request_for_same_checkpoint_while_pending_is_an_error() {
        let broker = broker();
        let broker = Arc::new(broker);
        let b2 = broker.clone();
        let handle = tokio::spawn(async move {
            b2.request("t1", "plan-approval", serde_json::json!({}), 0).await
        });

        // give the spawned request a chance to register the rendezvous
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(broker.has_pending("t1", "plan-approval").await);

        let second = broker.request("t1", "plan-approval", serde_json::json!({}), 0).await;
        assert!(second.is_err());

        broker.resolve("t1", "plan-approval", ApprovalAction::Approve, None).await.unwrap();
        let resolved = handle.await.unwrap().unwrap();
        assert_eq!(resolved.action, ApprovalAction::Approve);
    }

    #[tokio::test]
    async fn zero_timeout_never_times_out_and_resolve_delivers_feedback() {
        let broker = Arc::new(broker());
        let b2 = broker.clone();
        let handle = tokio::spawn(async move {
            b2.request("t2", "story-approval", serde_json::json!({"story": "s0"}), 0).await
        });

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        broker
            .resolve(
                "t2",
                "story-approval",
                ApprovalAction::RequestChanges,
                Some("add null check".to_string()),
            )
            .await
            .unwrap();

        let response = handle.await.unwrap().unwrap();
        assert_eq!(response.action, ApprovalAction::RequestChanges);
        assert_eq!(response.feedback.as_deref(), Some("add null check"));

        let audit = broker.store.list_approval_audit_by_task("t2").await.unwrap();
        assert_eq!(audit.len(), 1);
        assert_eq!(audit[0].action, ApprovalAction::RequestChanges);
    }

    #[tokio::test]
    async fn timeout_resolves_with_timeout_action_and_audit_entry() {
        let broker = broker();
        let response = broker
            .request("t3", "merge-approval", serde_json::json!({}), 10)
            .await
            .unwrap();
        assert_eq!(response.action, ApprovalAction::Timeout);
        assert!(!broker.has_pending("t3", "merge-approval").await);

        let audit = broker.store.list_approval_audit_by_task("t3").await.unwrap();
        assert_eq!(audit.len(), 1);
        assert_eq!(audit[0].action, ApprovalAction::Timeout);
    }

    #[tokio::test]
    async fn cancel_task_rejects_every_pending_checkpoint() {
        let broker = Arc::new(broker());
        let b2 = broker.clone();
        let b3 = broker.clone();
        let h1 = tokio::spawn(async move {
            b2.request("t4", "plan-approval", serde_json::json!({}), 0).await
        });
        let h2 = tokio::spawn(async move {
            b3.request("t4", "analysis-approval", serde_json::json!({}), 0).await
        });

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        broker.cancel_task("t4").await.unwrap();

        let r1 = h1.await.unwrap().unwrap();
        let r2 = h2.await.unwrap().unwrap();
        assert_eq!(r1.action, ApprovalAction::Reject);
        assert_eq!(r1.feedback.as_deref(), Some("task_cancelled"));
        assert_eq!(r2.action, ApprovalAction::Reject);
        assert!(!broker.has_pending("t4", "plan-approval").await);
        assert!(!broker.has_pending("t4", "analysis-approval").await);
    }
}
