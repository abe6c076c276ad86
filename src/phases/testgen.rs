//! TestGeneration (spec.md §4.6): generate tests for the approved stories,
//! run them, and iterate until they pass or the iteration cap is hit.

use super::common::{activity, extract_tool_payload, observe_events, run_agent_turn};
use crate::agent_client::{CodeAgentClient, SessionOptions};
use crate::clock::Clock;
use crate::context::OrchestrationContext;
use crate::error::{CoreError, PhaseError};
use crate::eventbus::EventBus;
use crate::model::{ActivityType, Story, TestGenerationPayload};
use crate::observer::ObserverContext;
use crate::store::DurableStore;
use crate::workspace::{CredentialVault, GitClient};

const PHASE: &str = "test_generation";

pub async fn run<S, B, C, A, G, V>(
    ctx: &OrchestrationContext<S, B, C, A, G, V>,
    task_id: &str,
    stories: &[Story],
) -> Result<TestGenerationPayload, PhaseError>
where
    S: DurableStore + 'static,
    B: EventBus + 'static,
    C: Clock + 'static,
    A: CodeAgentClient + 'static,
    G: GitClient + 'static,
    V: CredentialVault + 'static,
{
    run_inner(ctx, task_id, stories).await.map_err(|e| PhaseError::new(PHASE, e))
}

async fn run_inner<S, B, C, A, G, V>(
    ctx: &OrchestrationContext<S, B, C, A, G, V>,
    task_id: &str,
    stories: &[Story],
) -> Result<TestGenerationPayload, CoreError>
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
        .record(activity(task_id, ActivityType::PhaseStart, Some(PHASE), None, "test generation started", now), now)
        .await?;

    let session_id = ctx
        .agent
        .create_session(SessionOptions { title: format!("testgen-{task_id}"), directory: String::new(), auto_approve: true })
        .await?;
    let obs_ctx = ObserverContext {
        task_id: task_id.to_string(),
        session_id: session_id.clone(),
        phase: PHASE.to_string(),
        story_id: None,
    };

    let titles: Vec<&str> = stories.iter().map(|s| s.title.as_str()).collect();
    let mut result = TestGenerationPayload {
        tests_generated: 0,
        edge_cases_detected: 0,
        coverage_before: 0.0,
        coverage_after: 0.0,
        tests_passed: false,
    };

    for iteration in 0..ctx.config.testgen_max_iterations {
        let prompt = if iteration == 0 {
            format!(
                "Write tests covering the implemented stories: {:?}. Include edge cases. Run the suite and call submit_test_results with {{tests_generated, edge_cases_detected, coverage_before, coverage_after, tests_passed}}.",
                titles
            )
        } else {
            "The previous test run failed. Fix the failing tests or the code under test, re-run, and call submit_test_results again.".to_string()
        };

        let events = run_agent_turn(
            &*ctx.store,
            &*ctx.clock,
            task_id,
            PHASE,
            "test_generator",
            &*ctx.agent,
            &session_id,
            &prompt,
            ctx.config.phase_idle_timeout_ms,
        )
        .await?;
        observe_events(&ctx.observer, &obs_ctx, &events).await;

        if let Some(args) = extract_tool_payload(&events, "submit_test_results") {
            result = parse_test_payload(args);
        }

        if result.tests_passed {
            break;
        }
    }

    ctx.agent.delete_session(&session_id).await.ok();
    Ok(result)
}

fn parse_test_payload(args: &serde_json::Value) -> TestGenerationPayload {
    TestGenerationPayload {
        tests_generated: args.get("tests_generated").and_then(|v| v.as_u64()).unwrap_or(0) as u32,
        edge_cases_detected: args.get("edge_cases_detected").and_then(|v| v.as_u64()).unwrap_or(0) as u32,
        coverage_before: args.get("coverage_before").and_then(|v| v.as_f64()).unwrap_or(0.0) as f32,
        coverage_after: args.get("coverage_after").and_then(|v| v.as_f64()).unwrap_or(0.0) as f32,
        tests_passed: args.get("tests_passed").and_then(|v| v.as_bool()).unwrap_or(false),
    }
}
