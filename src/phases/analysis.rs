//! Analysis (spec.md §4.6): turn the enriched prompt into a branch name and
//! a set of Stories, judge-and-fix internally, then request approval.

use super::common::{activity, extract_tool_payload, extract_verdict, observe_events, run_agent_turn};
use crate::agent_client::{CodeAgentClient, SessionOptions};
use crate::clock::Clock;
use crate::context::OrchestrationContext;
use crate::error::{CoreError, PhaseError};
use crate::eventbus::EventBus;
use crate::model::{ActivityType, ApprovalAction, AnalysisPayload, Story, StoryVerdict};
use crate::observer::ObserverContext;
use crate::store::DurableStore;
use crate::workspace::{CredentialVault, GitClient};

const PHASE: &str = "analysis";

pub async fn run<S, B, C, A, G, V>(
    ctx: &OrchestrationContext<S, B, C, A, G, V>,
    task_id: &str,
    enriched_prompt: &str,
) -> Result<AnalysisPayload, PhaseError>
where
    S: DurableStore + 'static,
    B: EventBus + 'static,
    C: Clock + 'static,
    A: CodeAgentClient + 'static,
    G: GitClient + 'static,
    V: CredentialVault + 'static,
{
    run_inner(ctx, task_id, enriched_prompt).await.map_err(|e| PhaseError::new(PHASE, e))
}

async fn run_inner<S, B, C, A, G, V>(
    ctx: &OrchestrationContext<S, B, C, A, G, V>,
    task_id: &str,
    enriched_prompt: &str,
) -> Result<AnalysisPayload, CoreError>
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
        .record(activity(task_id, ActivityType::PhaseStart, Some(PHASE), None, "analysis started", now), now)
        .await?;

    let session_id = ctx
        .agent
        .create_session(SessionOptions { title: format!("analysis-{task_id}"), directory: String::new(), auto_approve: true })
        .await?;
    let obs_ctx = ObserverContext {
        task_id: task_id.to_string(),
        session_id: session_id.clone(),
        phase: PHASE.to_string(),
        story_id: None,
    };

    let mut feedback: Option<String> = None;
    let mut payload = AnalysisPayload {
        branch_name: format!("agentforge/{task_id}"),
        stories: Vec::new(),
        summary: String::new(),
        approach: String::new(),
        risks: Vec::new(),
    };

    for _ in 0..ctx.config.planning_max_judge_iterations {
        let prompt = match &feedback {
            Some(fb) => format!(
                "Revise the analysis for: {enriched_prompt}\nJudge feedback: {fb}\nCall submit_analysis with the revised breakdown, then call report_verdict."
            ),
            None => format!(
                "Analyze the following enriched task and break it into Stories: {enriched_prompt}\nEach story needs files to modify/create/read and acceptance criteria. Call submit_analysis, then call report_verdict."
            ),
        };

        let events = run_agent_turn(
            &*ctx.store,
            &*ctx.clock,
            task_id,
            PHASE,
            "analyst",
            &*ctx.agent,
            &session_id,
            &prompt,
            ctx.config.phase_idle_timeout_ms,
        )
        .await?;
        observe_events(&ctx.observer, &obs_ctx, &events).await;

        if let Some(args) = extract_tool_payload(&events, "submit_analysis") {
            payload = parse_analysis_payload(args, task_id);
        }

        match extract_verdict(&events) {
            Some((StoryVerdict::Approved, _)) => break,
            Some((StoryVerdict::NeedsRevision, fb)) => feedback = fb,
            Some((StoryVerdict::Rejected, fb)) => {
                return Err(CoreError::AgentError(
                    fb.unwrap_or_else(|| "internal judge rejected the analysis".to_string()),
                ));
            }
            None => break,
        }
    }

    if payload.stories.is_empty() {
        return Err(CoreError::Fatal("analysis produced no stories".to_string()));
    }

    let approval_payload = serde_json::to_value(&payload)
        .map_err(|e| CoreError::Fatal(format!("serializing analysis payload: {e}")))?;
    let mut rounds = 0;
    loop {
        let response = ctx
            .approval
            .request(task_id, "analysis-approval", approval_payload.clone(), ctx.config.approval_default_timeout_ms)
            .await?;
        match response.action {
            ApprovalAction::Approve => break,
            ApprovalAction::RequestChanges => {
                rounds += 1;
                if rounds >= ctx.config.approval_max_feedback_rounds {
                    return Err(CoreError::UserRejection {
                        checkpoint: "analysis-approval".to_string(),
                        feedback: response.feedback,
                    });
                }
                let prompt = format!(
                    "Revise the analysis for: {enriched_prompt}\nReviewer feedback: {}\nCall submit_analysis.",
                    response.feedback.clone().unwrap_or_default()
                );
                let events = run_agent_turn(
                    &*ctx.store,
                    &*ctx.clock,
                    task_id,
                    PHASE,
                    "analyst",
                    &*ctx.agent,
                    &session_id,
                    &prompt,
                    ctx.config.phase_idle_timeout_ms,
                )
                .await?;
                observe_events(&ctx.observer, &obs_ctx, &events).await;
                if let Some(args) = extract_tool_payload(&events, "submit_analysis") {
                    payload = parse_analysis_payload(args, task_id);
                }
            }
            ApprovalAction::Reject | ApprovalAction::Timeout | ApprovalAction::Cancel => {
                return Err(CoreError::UserRejection {
                    checkpoint: "analysis-approval".to_string(),
                    feedback: response.feedback,
                });
            }
        }
    }

    ctx.agent.delete_session(&session_id).await.ok();
    Ok(payload)
}

fn parse_analysis_payload(args: &serde_json::Value, task_id: &str) -> AnalysisPayload {
    let branch_name = args
        .get("branch_name")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .unwrap_or_else(|| format!("agentforge/{task_id}"));
    let summary = args.get("summary").and_then(|v| v.as_str()).unwrap_or_default().to_string();
    let approach = args.get("approach").and_then(|v| v.as_str()).unwrap_or_default().to_string();
    let risks = args
        .get("risks")
        .and_then(|v| v.as_array())
        .map(|arr| arr.iter().filter_map(|v| v.as_str().map(|s| s.to_string())).collect())
        .unwrap_or_default();
    let stories = args
        .get("stories")
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .enumerate()
                .map(|(idx, s)| parse_story(s, idx))
                .collect()
        })
        .unwrap_or_default();

    AnalysisPayload { branch_name, stories, summary, approach, risks }
}

fn parse_story(value: &serde_json::Value, idx: usize) -> Story {
    let mut story = Story::new(
        value.get("id").and_then(|v| v.as_str()).map(|s| s.to_string()).unwrap_or_else(|| format!("story-{idx}")),
        value.get("title").and_then(|v| v.as_str()).unwrap_or_default(),
        value.get("description").and_then(|v| v.as_str()).unwrap_or_default(),
    );
    story.files_to_modify = string_array(value, "files_to_modify");
    story.files_to_create = string_array(value, "files_to_create");
    story.files_to_read = string_array(value, "files_to_read");
    story.acceptance_criteria = string_array(value, "acceptance_criteria");
    story
}

fn string_array(value: &serde_json::Value, key: &str) -> Vec<String> {
    value
        .get(key)
        .and_then(|v| v.as_array())
        .map(|arr| arr.iter().filter_map(|v| v.as_str().map(|s| s.to_string())).collect())
        .unwrap_or_default()
}
