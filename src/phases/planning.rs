//! Planning (spec.md §4.6): assess complexity, clarify, derive an enriched
//! prompt, judge-and-fix internally, then request user approval.

use super::common::{activity, extract_tool_payload, observe_events, run_agent_turn};
use crate::agent_client::{CodeAgentClient, SessionOptions};
use crate::clock::Clock;
use crate::context::OrchestrationContext;
use crate::error::{CoreError, PhaseError};
use crate::eventbus::EventBus;
use crate::model::{ActivityType, ApprovalAction, ClarificationQA, PlanningPayload};
use crate::observer::ObserverContext;
use crate::store::DurableStore;
use crate::workspace::{CredentialVault, GitClient};

const PHASE: &str = "planning";

/// Whether a task needs a planning pass at all. Spec.md's S1 scenario
/// (`skipPlanningForSimpleTasks=true`) skips Planning for tasks whose
/// description is short and names no more than one file.
pub fn is_simple(task_description: &str) -> bool {
    task_description.split_whitespace().count() <= 12
}

pub async fn run<S, B, C, A, G, V>(
    ctx: &OrchestrationContext<S, B, C, A, G, V>,
    task_id: &str,
    task_description: &str,
) -> Result<PlanningPayload, PhaseError>
where
    S: DurableStore + 'static,
    B: EventBus + 'static,
    C: Clock + 'static,
    A: CodeAgentClient + 'static,
    G: GitClient + 'static,
    V: CredentialVault + 'static,
{
    run_inner(ctx, task_id, task_description)
        .await
        .map_err(|e| PhaseError::new(PHASE, e))
}

async fn run_inner<S, B, C, A, G, V>(
    ctx: &OrchestrationContext<S, B, C, A, G, V>,
    task_id: &str,
    task_description: &str,
) -> Result<PlanningPayload, CoreError>
where
    S: DurableStore + 'static,
    B: EventBus + 'static,
    C: Clock + 'static,
    A: CodeAgentClient + 'static,
    G: GitClient + 'static,
    V: CredentialVault + 'static,
{
    let now = ctx.clock.now();
    ctx.archive
        .record(activity(task_id, ActivityType::PhaseStart, Some(PHASE), None, "planning started", now), now)
        .await?;

    let session_id = ctx
        .agent
        .create_session(SessionOptions { title: format!("plan-{task_id}"), directory: String::new(), auto_approve: true })
        .await?;

    let obs_ctx = ObserverContext {
        task_id: task_id.to_string(),
        session_id: session_id.clone(),
        phase: PHASE.to_string(),
        story_id: None,
    };

    let mut feedback: Option<String> = None;
    let mut payload = PlanningPayload {
        clarifications: Vec::new(),
        ux_flows: Vec::new(),
        planned_tasks: Vec::new(),
        enriched_prompt: task_description.to_string(),
    };

    for _ in 0..ctx.config.planning_max_judge_iterations {
        let prompt = match &feedback {
            Some(fb) => format!(
                "Revise the plan for: {task_description}\nJudge feedback: {fb}\nCall submit_plan with the revised plan, then call report_verdict."
            ),
            None => format!(
                "Plan the following task: {task_description}\nAssess complexity, derive clarifying questions if needed, UX flows, a task breakdown, and an enriched prompt. Call submit_plan, then call report_verdict."
            ),
        };

        let events = run_agent_turn(
            &*ctx.store,
            &*ctx.clock,
            task_id,
            PHASE,
            "planner",
            &*ctx.agent,
            &session_id,
            &prompt,
            ctx.config.phase_idle_timeout_ms,
        )
        .await?;
        observe_events(&ctx.observer, &obs_ctx, &events).await;

        if let Some(plan_args) = extract_tool_payload(&events, "submit_plan") {
            payload = parse_planning_payload(plan_args, task_description)?;
        }

        match super::common::extract_verdict(&events) {
            Some((crate::model::StoryVerdict::Approved, _)) => break,
            Some((crate::model::StoryVerdict::NeedsRevision, fb)) => feedback = fb,
            Some((crate::model::StoryVerdict::Rejected, fb)) => {
                return Err(CoreError::AgentError(
                    fb.unwrap_or_else(|| "internal judge rejected the plan".to_string()),
                ));
            }
            None => break,
        }
    }

    let approval_payload = serde_json::to_value(&payload)
        .map_err(|e| CoreError::Fatal(format!("serializing planning payload: {e}")))?;
    let mut rounds = 0;
    loop {
        let response = ctx
            .approval
            .request(task_id, "planning-approval", approval_payload.clone(), ctx.config.approval_default_timeout_ms)
            .await?;
        match response.action {
            ApprovalAction::Approve => break,
            ApprovalAction::RequestChanges => {
                rounds += 1;
                if rounds >= ctx.config.approval_max_feedback_rounds {
                    return Err(CoreError::UserRejection {
                        checkpoint: "planning-approval".to_string(),
                        feedback: response.feedback,
                    });
                }
                // Re-run one more judge iteration against the feedback.
                let prompt = format!(
                    "Revise the plan for: {task_description}\nReviewer feedback: {}\nCall submit_plan.",
                    response.feedback.clone().unwrap_or_default()
                );
                let events = run_agent_turn(
                    &*ctx.store,
                    &*ctx.clock,
                    task_id,
                    PHASE,
                    "planner",
                    &*ctx.agent,
                    &session_id,
                    &prompt,
                    ctx.config.phase_idle_timeout_ms,
                )
                .await?;
                observe_events(&ctx.observer, &obs_ctx, &events).await;
                if let Some(plan_args) = extract_tool_payload(&events, "submit_plan") {
                    payload = parse_planning_payload(plan_args, task_description)?;
                }
            }
            ApprovalAction::Reject | ApprovalAction::Timeout | ApprovalAction::Cancel => {
                return Err(CoreError::UserRejection {
                    checkpoint: "planning-approval".to_string(),
                    feedback: response.feedback,
                });
            }
        }
    }

    ctx.agent.delete_session(&session_id).await.ok();
    Ok(payload)
}

fn parse_planning_payload(args: &serde_json::Value, fallback_prompt: &str) -> Result<PlanningPayload, CoreError> {
    let clarifications = args
        .get("clarifications")
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|qa| {
                    Some(ClarificationQA {
                        question: qa.get("question")?.as_str()?.to_string(),
                        answer: qa.get("answer")?.as_str().unwrap_or_default().to_string(),
                    })
                })
                .collect()
        })
        .unwrap_or_default();
    let ux_flows = string_array(args, "ux_flows");
    let planned_tasks = string_array(args, "planned_tasks");
    let enriched_prompt = args
        .get("enriched_prompt")
        .and_then(|v| v.as_str())
        .unwrap_or(fallback_prompt)
        .to_string();

    Ok(PlanningPayload { clarifications, ux_flows, planned_tasks, enriched_prompt })
}

fn string_array(args: &serde_json::Value, key: &str) -> Vec<String> {
    args.get(key)
        .and_then(|v| v.as_array())
        .map(|arr| arr.iter().filter_map(|v| v.as_str().map(|s| s.to_string())).collect())
        .unwrap_or_default()
}
