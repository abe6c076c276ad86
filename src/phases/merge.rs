//! Merge (spec.md §4.6): push the task's branch in every repository with
//! committed changes and open a pull request.

use super::common::activity;
use crate::clock::Clock;
use crate::context::OrchestrationContext;
use crate::error::{CoreError, PhaseError};
use crate::eventbus::EventBus;
use crate::model::{ActivityType, MergePayload};
use crate::store::DurableStore;
use crate::workspace::{CredentialVault, GitClient, RepoSpec};
use crate::agent_client::CodeAgentClient;

const PHASE: &str = "merge";

pub async fn run<S, B, C, A, G, V>(
    ctx: &OrchestrationContext<S, B, C, A, G, V>,
    task_id: &str,
    owner_user_id: &str,
    repos: &[RepoSpec],
    branch_name: &str,
    title: &str,
    summary: &str,
) -> Result<MergePayload, PhaseError>
where
    S: DurableStore + 'static,
    B: EventBus + 'static,
    C: Clock + 'static,
    A: CodeAgentClient + 'static,
    G: GitClient + 'static,
    V: CredentialVault + 'static,
{
    run_inner(ctx, task_id, owner_user_id, repos, branch_name, title, summary)
        .await
        .map_err(|e| PhaseError::new(PHASE, e))
}

async fn run_inner<S, B, C, A, G, V>(
    ctx: &OrchestrationContext<S, B, C, A, G, V>,
    task_id: &str,
    owner_user_id: &str,
    repos: &[RepoSpec],
    branch_name: &str,
    title: &str,
    summary: &str,
) -> Result<MergePayload, CoreError>
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
        .record(activity(task_id, ActivityType::PhaseStart, Some(PHASE), None, "merge started", now), now)
        .await?;

    let mut pull_requests = Vec::new();
    for repo in repos {
        if !ctx.workspace.has_unpushed_commits(task_id, &repo.name).await? {
            continue;
        }
        ctx.workspace.push(task_id, &repo.name, owner_user_id, branch_name).await?;
        let pr = ctx
            .workspace
            .open_pull_request(&repo.name, branch_name, title, summary)
            .await?;
        pull_requests.push(pr);
    }

    let merged = !pull_requests.is_empty();
    let end = ctx.clock.now();
    ctx.archive
        .record(
            activity(
                task_id,
                ActivityType::PhaseComplete,
                Some(PHASE),
                None,
                format!("opened {} pull request(s)", pull_requests.len()),
                end,
            ),
            end,
        )
        .await?;

    Ok(MergePayload { pull_requests, merged })
}
