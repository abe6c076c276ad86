//! Shared helpers used by every phase driver.

use crate::agent_client::{CodeAgentClient, PromptOptions, RawAgentEvent, WaitOptions};
use crate::clock::Clock;
use crate::error::CoreError;
use crate::model::{ActivityEntry, ActivityType, AgentExecution, ExecutionStatus, StoryVerdict, ToolCall, Vulnerability};
use crate::observer::{AgentEvent, ObserverContext, SecurityObserver};
use crate::store::DurableStore;

const PROMPT_EXCERPT_CHARS: usize = 200;

/// Send one prompt, collect every event until the agent goes idle, and
/// record the turn as one [`AgentExecution`] (plus one [`ToolCall`] per tool
/// invocation the agent made) so `metrics.rs`'s Cost & Metrics Aggregator
/// has rows to sum and Vulnerability→ToolCall joins are satisfiable.
#[allow(clippy::too_many_arguments)]
pub async fn run_agent_turn<S: DurableStore, C: Clock, A: CodeAgentClient>(
    store: &S,
    clock: &C,
    task_id: &str,
    phase: &str,
    agent_role: &str,
    agent: &A,
    session_id: &str,
    prompt: &str,
    idle_timeout_ms: u64,
) -> Result<Vec<RawAgentEvent>, CoreError> {
    let started_at = clock.now();
    agent.send_prompt(session_id, prompt, PromptOptions::default()).await?;
    let events = agent.wait_for_idle(session_id, WaitOptions { idle_timeout_ms }).await?;
    record_turn(store, task_id, phase, agent_role, prompt, &events, started_at, clock.now()).await?;
    Ok(events)
}

/// Narrow `events` and persist the [`AgentExecution`]/[`ToolCall`] rows for
/// one agent turn. `ToolCall.id` is set to the wire `tool_use_id` itself
/// (not a freshly generated id), since spec.md's causal-join invariant
/// between a Vulnerability and the ToolCall it references is stated in
/// terms of that shared id.
async fn record_turn<S: DurableStore>(
    store: &S,
    task_id: &str,
    phase: &str,
    agent_role: &str,
    prompt: &str,
    events: &[RawAgentEvent],
    started_at: chrono::DateTime<chrono::Utc>,
    ended_at: chrono::DateTime<chrono::Utc>,
) -> Result<(), CoreError> {
    let narrowed: Vec<AgentEvent> = events.iter().cloned().filter_map(RawAgentEvent::into_agent_event).collect();
    let final_output = narrowed.iter().rev().find_map(|event| match event {
        AgentEvent::MessagePartUpdated { text, .. } => Some(text.clone()),
        _ => None,
    });

    let execution_id = uuid::Uuid::new_v4().to_string();
    store
        .append_execution(AgentExecution {
            id: execution_id.clone(),
            task_id: task_id.to_string(),
            phase: phase.to_string(),
            agent_role: agent_role.to_string(),
            prompt_excerpt: excerpt(prompt),
            final_output,
            prompt_tokens: 0,
            completion_tokens: 0,
            cost_usd: 0.0,
            duration_ms: Some((ended_at - started_at).num_milliseconds().max(0) as u64),
            status: ExecutionStatus::Completed,
            error: None,
            started_at,
            ended_at: Some(ended_at),
        })
        .await?;

    let mut call_order = 0u32;
    for event in &narrowed {
        let AgentEvent::ToolExecuteBefore { tool_use_id, turn_number, tool, args } = event else { continue };
        if tool_use_id.is_empty() {
            continue;
        }
        let output = narrowed.iter().find_map(|other| match other {
            AgentEvent::ToolExecuteAfter { tool_use_id: id, result, .. } if id == tool_use_id => Some(result.clone()),
            _ => None,
        });
        let shell_command = event
            .is_bash_before()
            .then(|| args.get("command").and_then(|v| v.as_str()).map(|s| s.to_string()))
            .flatten();
        store
            .append_tool_call(ToolCall {
                id: tool_use_id.clone(),
                execution_id: execution_id.clone(),
                turn_number: *turn_number,
                tool_name: tool.clone(),
                tool_use_id: tool_use_id.clone(),
                input: args.clone(),
                output,
                success: None,
                file_path: event.file_path(),
                shell_command,
                duration_ms: None,
                call_order,
                started_at,
            })
            .await?;
        call_order += 1;
    }

    Ok(())
}

fn excerpt(prompt: &str) -> String {
    if prompt.chars().count() <= PROMPT_EXCERPT_CHARS {
        prompt.to_string()
    } else {
        prompt.chars().take(PROMPT_EXCERPT_CHARS).collect::<String>() + "…"
    }
}

/// Run every narrowed event through the Security Observer.
pub async fn observe_events<C: Clock>(
    observer: &SecurityObserver<C>,
    ctx: &ObserverContext,
    events: &[RawAgentEvent],
) -> Vec<Vulnerability> {
    let mut found = Vec::new();
    for raw in events {
        if let Some(event) = raw.clone().into_agent_event() {
            found.extend(observer.observe(ctx, &event).await);
        }
    }
    found
}

/// A judge turn reports its decision as a tool call named `report_verdict`
/// with `{"verdict": "approved"|"needs_revision"|"rejected", "feedback"?}`.
/// This keeps the judge's output a structured tool invocation rather than
/// free-form text the core would have to parse (spec.md §9's note against
/// dynamic JSON casting applies here too).
pub fn extract_verdict(events: &[RawAgentEvent]) -> Option<(StoryVerdict, Option<String>)> {
    events.iter().rev().find_map(|event| {
        if event.properties.tool.as_deref() != Some("report_verdict") {
            return None;
        }
        let args = event.properties.args.as_ref()?;
        let verdict = match args.get("verdict")?.as_str()? {
            "approved" => StoryVerdict::Approved,
            "needs_revision" => StoryVerdict::NeedsRevision,
            "rejected" => StoryVerdict::Rejected,
            _ => return None,
        };
        let feedback = args.get("feedback").and_then(|v| v.as_str()).map(|s| s.to_string());
        Some((verdict, feedback))
    })
}

/// Look up the most recent tool call named `tool_name` and return its
/// `args`, for phases that ask the agent to report structured output via a
/// dedicated tool call (e.g. `submit_plan`, `submit_analysis`) rather than
/// free text the core would have to parse back out of prose.
pub fn extract_tool_payload<'a>(events: &'a [RawAgentEvent], tool_name: &str) -> Option<&'a serde_json::Value> {
    events
        .iter()
        .rev()
        .find(|event| event.properties.tool.as_deref() == Some(tool_name))
        .and_then(|event| event.properties.args.as_ref())
}

pub fn activity(
    task_id: &str,
    kind: ActivityType,
    phase: Option<&str>,
    story_id: Option<&str>,
    content: impl Into<String>,
    now: chrono::DateTime<chrono::Utc>,
) -> ActivityEntry {
    ActivityEntry {
        id: uuid::Uuid::new_v4().to_string(),
        task_id: task_id.to_string(),
        kind,
        phase: phase.map(|s| s.to_string()),
        story_id: story_id.map(|s| s.to_string()),
        content: content.into(),
        details: None,
        timestamp: now,
    }
}
