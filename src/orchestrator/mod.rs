//! The Orchestrator (spec.md §4.5): drives a Task through the fixed phase
//! sequence, deriving all resume state from `completed_phases` and
//! `last_completed_story_index` rather than ad-hoc "have we done this
//! already?" checks (spec.md §9).

use crate::agent_client::CodeAgentClient;
use crate::clock::Clock;
use crate::context::OrchestrationContext;
use crate::error::CoreError;
use crate::eventbus::{BusEvent, EventBus};
use crate::model::{
    AnalysisPayload, CompletedPhase, DeveloperPayload, GlobalScanPayload, MergePayload, PhaseName,
    PhasePayload, PlanningPayload, TaskStatus, TestGenerationPayload,
};
use crate::phases::{analysis, developer, globalscan, merge, planning, testgen};
use crate::store::DurableStore;
use crate::workspace::{CredentialVault, GitClient, RepoSpec};
use std::sync::Arc;

/// Drives one task end to end. Stateless across tasks — every piece of
/// progress lives in the Durable Store, so any worker can pick up any task.
pub struct Orchestrator<S, B, C, A, G, V>
where
    S: DurableStore + 'static,
    B: EventBus + 'static,
    C: Clock + 'static,
    A: CodeAgentClient + 'static,
    G: GitClient + 'static,
    V: CredentialVault + 'static,
{
    ctx: Arc<OrchestrationContext<S, B, C, A, G, V>>,
}

impl<S, B, C, A, G, V> Orchestrator<S, B, C, A, G, V>
where
    S: DurableStore + 'static,
    B: EventBus + 'static,
    C: Clock + 'static,
    A: CodeAgentClient + 'static,
    G: GitClient + 'static,
    V: CredentialVault + 'static,
{
    pub fn new(ctx: Arc<OrchestrationContext<S, B, C, A, G, V>>) -> Self {
        Self { ctx }
    }

    /// spec.md §4.5's algorithm, steps 1-6.
    pub async fn execute(&self, task_id: &str, repos: &[RepoSpec]) -> Result<(), CoreError> {
        let ctx = &self.ctx;
        let task = ctx
            .store
            .get_task(task_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("task {task_id}")))?;

        ctx.store.set_task_status(task_id, TaskStatus::Running).await?;

        // Workspace Coordinator's prepareWorkspace (spec.md §4.7): clone
        // every repository the task touches before any phase that reads or
        // writes the working tree runs. Idempotent, so safe to repeat on
        // resume.
        let workspace_error = ctx
            .workspace
            .prepare_workspace(task_id, repos, &task.owner_user_id, &[])
            .await
            .err();

        let start_index = task
            .completed_phases
            .iter()
            .map(|cp| cp.phase.index() + 1)
            .max()
            .unwrap_or(0)
            .min(PhaseName::ORDER.len());

        // Planning is skippable for assessed-simple tasks; skip it here if
        // it isn't already in `completed_phases` and the task reads simple.
        let skip_planning = start_index == 0 && planning::is_simple(&task.description);

        let mut planning_payload = find_payload(&task.completed_phases, PhaseName::Planning, as_planning);
        let mut analysis_payload = find_payload(&task.completed_phases, PhaseName::Analysis, as_analysis);
        let mut developer_payload = find_payload(&task.completed_phases, PhaseName::Developer, as_developer);
        let mut testgen_payload = find_payload(&task.completed_phases, PhaseName::TestGeneration, as_testgen);
        let mut merge_payload = find_payload(&task.completed_phases, PhaseName::Merge, as_merge);

        let mut failure_reason: Option<String> = workspace_error.map(|e| e.to_string());

        'phases: for phase in PhaseName::ORDER.iter().copied().skip(if failure_reason.is_some() {
            PhaseName::ORDER.len()
        } else {
            start_index
        }) {
            if phase == PhaseName::Planning && skip_planning {
                continue;
            }
            if phase == PhaseName::TestGeneration && !ctx.config.testgen_enabled {
                continue;
            }
            if phase == PhaseName::GlobalScan {
                // GlobalScan always runs, handled after this loop.
                break;
            }

            log::info!("task {task_id}: entering phase {phase:?}");
            ctx.store
                .update_task(task_id, Box::new(move |t| t.current_phase = Some(phase)))
                .await?;

            let outcome = match phase {
                PhaseName::Planning => {
                    let result = planning::run(ctx, task_id, &task.description).await;
                    match result {
                        Ok(payload) => {
                            let completed = CompletedPhase {
                                phase,
                                payload: PhasePayload::Planning(payload.clone()),
                                completed_at: ctx.clock.now(),
                            };
                            ctx.store.complete_phase(task_id, completed).await?;
                            planning_payload = Some(payload);
                            Ok(())
                        }
                        Err(e) => Err(e.source),
                    }
                }
                PhaseName::Analysis => {
                    let enriched = planning_payload
                        .as_ref()
                        .map(|p| p.enriched_prompt.clone())
                        .unwrap_or_else(|| task.description.clone());
                    let result = analysis::run(ctx, task_id, &enriched).await;
                    match result {
                        Ok(payload) => {
                            let completed = CompletedPhase {
                                phase,
                                payload: PhasePayload::Analysis(payload.clone()),
                                completed_at: ctx.clock.now(),
                            };
                            ctx.store.complete_phase(task_id, completed).await?;
                            ctx.store
                                .update_task(
                                    task_id,
                                    Box::new({
                                        let branch = payload.branch_name.clone();
                                        move |t| t.branch_name = Some(branch)
                                    }),
                                )
                                .await?;
                            analysis_payload = Some(payload);
                            Ok(())
                        }
                        Err(e) => Err(e.source),
                    }
                }
                PhaseName::Developer => {
                    let Some(analysis) = analysis_payload.clone() else {
                        failure_reason = Some("developer phase reached with no analysis payload".to_string());
                        break 'phases;
                    };
                    let resume_from = task.last_completed_story_index.map(|i| i + 1).unwrap_or(0);
                    let result = developer::run(ctx, task_id, repos, analysis.stories, resume_from).await;
                    match result {
                        Ok(payload) => {
                            let completed = CompletedPhase {
                                phase,
                                payload: PhasePayload::Developer(payload.clone()),
                                completed_at: ctx.clock.now(),
                            };
                            ctx.store.complete_phase(task_id, completed).await?;
                            developer_payload = Some(payload);
                            Ok(())
                        }
                        Err(e) => Err(e.source),
                    }
                }
                PhaseName::TestGeneration => {
                    let stories = developer_payload.as_ref().map(|d| d.stories.clone()).unwrap_or_default();
                    let result = testgen::run(ctx, task_id, &stories).await;
                    match result {
                        Ok(payload) => {
                            let completed = CompletedPhase {
                                phase,
                                payload: PhasePayload::TestGeneration(payload.clone()),
                                completed_at: ctx.clock.now(),
                            };
                            ctx.store.complete_phase(task_id, completed).await?;
                            testgen_payload = Some(payload);
                            Ok(())
                        }
                        Err(e) => Err(e.source),
                    }
                }
                PhaseName::Merge => {
                    let branch_name = task.branch_name.clone().unwrap_or_else(|| format!("agentforge/{task_id}"));
                    let result = merge::run(
                        ctx,
                        task_id,
                        &task.owner_user_id,
                        repos,
                        &branch_name,
                        &task.title,
                        analysis_payload.as_ref().map(|a| a.summary.as_str()).unwrap_or(&task.description),
                    )
                    .await;
                    match result {
                        Ok(payload) => {
                            let completed = CompletedPhase {
                                phase,
                                payload: PhasePayload::Merge(payload.clone()),
                                completed_at: ctx.clock.now(),
                            };
                            ctx.store.complete_phase(task_id, completed).await?;
                            ctx.store
                                .update_task(
                                    task_id,
                                    Box::new({
                                        let prs = payload.pull_requests.clone();
                                        move |t| t.pull_requests = prs
                                    }),
                                )
                                .await?;
                            merge_payload = Some(payload);
                            Ok(())
                        }
                        Err(e) => Err(e.source),
                    }
                }
                PhaseName::GlobalScan => unreachable!("handled after the loop"),
            };

            if let Err(e) = outcome {
                log::error!("task {task_id}: phase {phase:?} failed: {e}");
                failure_reason = Some(e.to_string());
                break;
            }
        }

        // GlobalScan always runs, even after a failure (spec.md §4.5 step 5).
        if !task.has_completed(PhaseName::GlobalScan) {
            ctx.store
                .update_task(task_id, Box::new(move |t| t.current_phase = Some(PhaseName::GlobalScan)))
                .await?;
            match globalscan::run(ctx, task_id, repos).await {
                Ok(payload) => {
                    let completed = CompletedPhase {
                        phase: PhaseName::GlobalScan,
                        payload: PhasePayload::GlobalScan(payload),
                        completed_at: ctx.clock.now(),
                    };
                    ctx.store.complete_phase(task_id, completed).await?;
                }
                Err(e) => {
                    log::error!("task {task_id}: global scan failed: {e}");
                    failure_reason.get_or_insert_with(|| e.to_string());
                }
            }
        }

        // A concurrent `cancel()` may have already flipped the task to
        // `cancelled` (e.g. by rejecting a pending approval out from under
        // this call) before this phase loop noticed; a terminal cancellation
        // is sticky and must not be overwritten with `failed` (spec.md §4.5
        // invariant 5, S6).
        let already_cancelled =
            matches!(ctx.store.get_task(task_id).await?.map(|t| t.status), Some(TaskStatus::Cancelled));

        let final_status = if already_cancelled {
            TaskStatus::Cancelled
        } else if failure_reason.is_none() && merge_payload.as_ref().is_some_and(|m| m.merged) {
            TaskStatus::Completed
        } else if failure_reason.is_some() {
            TaskStatus::Failed
        } else {
            // Merge ran but opened nothing (no changes anywhere) — still a
            // successful, if quiet, completion.
            TaskStatus::Completed
        };

        crate::metrics::recompute(&*ctx.store, task_id).await?;
        log::info!("task {task_id}: orchestration finished with status {}", status_label(final_status));

        let now = ctx.clock.now();
        ctx.store
            .update_task(
                task_id,
                Box::new(move |t| {
                    t.status = final_status;
                    t.failure_reason = failure_reason.clone();
                    t.clear_resume_fields();
                    t.updated_at = now;
                }),
            )
            .await?;

        ctx.bus
            .publish(
                task_id,
                BusEvent::new(
                    "orchestration:complete",
                    serde_json::json!({ "taskId": task_id, "status": status_label(final_status) }),
                    now,
                ),
            )
            .await;

        Ok(())
    }

    /// Cancellation (spec.md §4.5, §5): safe from any non-terminal state,
    /// and idempotent — calling it again on an already-terminal task is a
    /// no-op rather than resurrecting it as `cancelled`.
    pub async fn cancel(&self, task_id: &str) -> Result<(), CoreError> {
        let ctx = &self.ctx;
        let task = ctx
            .store
            .get_task(task_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("task {task_id}")))?;
        if task.status.is_terminal() {
            log::debug!("task {task_id}: cancel requested but already terminal ({:?}), ignoring", task.status);
            return Ok(());
        }

        log::info!("task {task_id}: cancelling");
        ctx.approval.cancel_task(task_id).await?;
        // Best-effort: the code agent may not have a live session by the
        // time cancel arrives (e.g. the task is between phases).
        let _ = ctx.agent.abort_session(task_id).await;

        ctx.store.set_task_status(task_id, TaskStatus::Cancelled).await?;
        let now = ctx.clock.now();
        ctx.store
            .update_task(task_id, Box::new(move |t| t.clear_resume_fields()))
            .await?;
        ctx.bus
            .publish(task_id, BusEvent::new("orchestration:cancelled", serde_json::json!({ "taskId": task_id }), now))
            .await;
        Ok(())
    }
}

fn status_label(status: TaskStatus) -> &'static str {
    match status {
        TaskStatus::Pending => "pending",
        TaskStatus::Queued => "queued",
        TaskStatus::Running => "running",
        TaskStatus::WaitingForApproval => "waiting_for_approval",
        TaskStatus::Paused => "paused",
        TaskStatus::Interrupted => "interrupted",
        TaskStatus::Completed => "completed",
        TaskStatus::Cancelled => "cancelled",
        TaskStatus::Failed => "failed",
    }
}

fn find_payload<T: Clone>(
    completed: &[CompletedPhase],
    phase: PhaseName,
    extract: fn(&PhasePayload) -> Option<&T>,
) -> Option<T> {
    completed.iter().find(|cp| cp.phase == phase).and_then(|cp| extract(&cp.payload)).cloned()
}

fn as_planning(payload: &PhasePayload) -> Option<&PlanningPayload> {
    match payload {
        PhasePayload::Planning(p) => Some(p),
        _ => None,
    }
}

fn as_analysis(payload: &PhasePayload) -> Option<&AnalysisPayload> {
    match payload {
        PhasePayload::Analysis(p) => Some(p),
        _ => None,
    }
}

fn as_developer(payload: &PhasePayload) -> Option<&DeveloperPayload> {
    match payload {
        PhasePayload::Developer(p) => Some(p),
        _ => None,
    }
}

fn as_testgen(payload: &PhasePayload) -> Option<&TestGenerationPayload> {
    match payload {
        PhasePayload::TestGeneration(p) => Some(p),
        _ => None,
    }
}

fn as_merge(payload: &PhasePayload) -> Option<&MergePayload> {
    match payload {
        PhasePayload::Merge(p) => Some(p),
        _ => None,
    }
}

#[allow(dead_code)]
fn as_globalscan(payload: &PhasePayload) -> Option<&GlobalScanPayload> {
    match payload {
        PhasePayload::GlobalScan(p) => Some(p),
        _ => None,
    }
}
