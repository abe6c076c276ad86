//! Developer (spec.md §4.6, §9): per Story, a bounded DEV → JUDGE →
//! OBSERVE(workspace scan) → FIX loop, committing an approved story and
//! rolling back a rejected one before moving to the next.

use super::common::{activity, extract_verdict, observe_events, run_agent_turn};
use crate::agent_client::{CodeAgentClient, SessionOptions};
use crate::clock::Clock;
use crate::context::OrchestrationContext;
use crate::error::{CoreError, PhaseError};
use crate::eventbus::EventBus;
use crate::model::{ActivityType, ApprovalAction, DeveloperPayload, Severity, Story, StoryVerdict, Vulnerability};
use crate::observer::{ObserverContext, ScanContext, ScanOptions};
use crate::store::DurableStore;
use crate::workspace::{CredentialVault, GitClient, RepoSpec};

const PHASE: &str = "developer";

/// `resume_from_story_index` implements spec.md §4.5's resume contract for
/// the Developer phase: `last_completed_story_index + 1`, or `0`. Stories
/// before it are assumed already committed (or rejected) from a prior run
/// and are returned unchanged.
pub async fn run<S, B, C, A, G, V>(
    ctx: &OrchestrationContext<S, B, C, A, G, V>,
    task_id: &str,
    repos: &[RepoSpec],
    mut stories: Vec<Story>,
    resume_from_story_index: usize,
) -> Result<DeveloperPayload, PhaseError>
where
    S: DurableStore + 'static,
    B: EventBus + 'static,
    C: Clock + 'static,
    A: CodeAgentClient + 'static,
    G: GitClient + 'static,
    V: CredentialVault + 'static,
{
    run_inner(ctx, task_id, repos, &mut stories, resume_from_story_index)
        .await
        .map(|total_commits| DeveloperPayload { stories, total_commits })
        .map_err(|e| PhaseError::new(PHASE, e))
}

async fn run_inner<S, B, C, A, G, V>(
    ctx: &OrchestrationContext<S, B, C, A, G, V>,
    task_id: &str,
    repos: &[RepoSpec],
    stories: &mut [Story],
    resume_from_story_index: usize,
) -> Result<u32, CoreError>
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
        .record(activity(task_id, ActivityType::PhaseStart, Some(PHASE), None, "developer started", now), now)
        .await?;

    let primary_repo = repos.first().ok_or_else(|| CoreError::Fatal("developer phase has no repositories".into()))?;
    let mut total_commits = stories
        .iter()
        .take(resume_from_story_index)
        .filter(|s| s.verdict == Some(StoryVerdict::Approved))
        .count() as u32;

    for (index, story) in stories.iter_mut().enumerate().skip(resume_from_story_index) {
        run_story(ctx, task_id, repos, primary_repo, story).await?;
        if story.verdict == Some(StoryVerdict::Approved) {
            total_commits += 1;
        }

        // Persist resume progress directly rather than routing through an
        // `onStoryComplete` callback into the orchestrator.
        ctx.store
            .update_task(task_id, Box::new(move |task| task.last_completed_story_index = Some(index)))
            .await?;
    }

    Ok(total_commits)
}

async fn run_story<S, B, C, A, G, V>(
    ctx: &OrchestrationContext<S, B, C, A, G, V>,
    task_id: &str,
    repos: &[RepoSpec],
    primary_repo: &RepoSpec,
    story: &mut Story,
) -> Result<(), CoreError>
where
    S: DurableStore + 'static,
    B: EventBus + 'static,
    C: Clock + 'static,
    A: CodeAgentClient + 'static,
    G: GitClient + 'static,
    V: CredentialVault + 'static,
{
    let start = ctx.clock.now();
    story.started_at = Some(start);
    ctx.archive
        .record(
            activity(task_id, ActivityType::StoryStart, Some(PHASE), Some(&story.id), format!("story '{}' started", story.title), start),
            start,
        )
        .await?;

    let session_id = ctx
        .agent
        .create_session(SessionOptions {
            title: format!("dev-{task_id}-{}", story.id),
            directory: String::new(),
            auto_approve: true,
        })
        .await?;
    let obs_ctx = ObserverContext {
        task_id: task_id.to_string(),
        session_id: session_id.clone(),
        phase: PHASE.to_string(),
        story_id: Some(story.id.clone()),
    };

    let mut feedback: Option<String> = None;
    let mut blocked_vuln: Option<Vulnerability> = None;

    for _ in 0..ctx.config.developer_max_iterations {
        story.iteration_count += 1;

        // DEV
        let dev_prompt = match &feedback {
            Some(fb) => format!(
                "Fix story '{}' per this reviewer feedback: {fb}\nDescription: {}\nAcceptance criteria: {:?}",
                story.title, story.description, story.acceptance_criteria
            ),
            None => format!(
                "Implement story '{}': {}\nFiles to modify: {:?}\nFiles to create: {:?}\nAcceptance criteria: {:?}",
                story.title, story.description, story.files_to_modify, story.files_to_create, story.acceptance_criteria
            ),
        };
        let dev_events = run_agent_turn(
            &*ctx.store,
            &*ctx.clock,
            task_id,
            PHASE,
            "developer",
            &*ctx.agent,
            &session_id,
            &dev_prompt,
            ctx.config.phase_idle_timeout_ms,
        )
        .await?;
        let dev_vulns = observe_events(&ctx.observer, &obs_ctx, &dev_events).await;
        record_vulnerabilities(ctx, &dev_vulns).await?;
        if let Some(v) = dev_vulns.into_iter().find(|v| v.blocked) {
            blocked_vuln = Some(v);
            break;
        }

        // JUDGE
        let judge_prompt = "Review the change you just made against the acceptance criteria. Call report_verdict with approved, needs_revision, or rejected.";
        let judge_events = run_agent_turn(
            &*ctx.store,
            &*ctx.clock,
            task_id,
            PHASE,
            "judge",
            &*ctx.agent,
            &session_id,
            judge_prompt,
            ctx.config.phase_idle_timeout_ms,
        )
        .await?;
        observe_events(&ctx.observer, &obs_ctx, &judge_events).await;

        // OBSERVE: workspace scan across every repository this task touches.
        let scan_opts = ScanOptions {
            max_files: ctx.config.observer_scan_max_files,
            max_file_kb: ctx.config.observer_scan_max_file_kb,
            depth: ctx.config.observer_scan_depth,
        };
        for repo in repos {
            let path = ctx.workspace.workspace_path(task_id, &repo.name);
            let scan_ctx = ScanContext { task_id: task_id.to_string(), phase: PHASE.to_string(), repository: Some(repo.name.clone()) };
            let (vulns, _files_scanned) = ctx.observer.scan_workspace(&path, scan_ctx, scan_opts.clone()).await;
            record_vulnerabilities(ctx, &vulns).await?;
            story.vulnerability_ids.extend(vulns.iter().map(|v| v.id.clone()));
            if let Some(v) = vulns.into_iter().find(|v| v.severity == Severity::Critical) {
                if v.blocked {
                    blocked_vuln = Some(v);
                }
            }
        }
        if blocked_vuln.is_some() {
            break;
        }

        match extract_verdict(&judge_events) {
            Some((StoryVerdict::Approved, _)) => {
                story.verdict = Some(StoryVerdict::Approved);
                break;
            }
            Some((StoryVerdict::NeedsRevision, fb)) => feedback = fb,
            Some((StoryVerdict::Rejected, fb)) => {
                story.verdict = Some(StoryVerdict::Rejected);
                feedback = fb;
                break;
            }
            None => {
                story.verdict = Some(StoryVerdict::NeedsRevision);
            }
        }
    }

    ctx.agent.delete_session(&session_id).await.ok();

    let end = ctx.clock.now();
    story.ended_at = Some(end);

    if let Some(vuln) = blocked_vuln {
        log::warn!("task {task_id}: story '{}' blocked by security policy: {}", story.title, vuln.description);
        ctx.workspace.discard_changes(task_id, &primary_repo.name).await?;
        story.verdict = Some(StoryVerdict::Rejected);
        ctx.archive
            .record(
                activity(
                    task_id,
                    ActivityType::StoryFailed,
                    Some(PHASE),
                    Some(&story.id),
                    format!("story '{}' blocked by security policy: {}", story.title, vuln.description),
                    end,
                ),
                end,
            )
            .await?;
        return Err(CoreError::PolicyBlock { vulnerability_id: vuln.id, reason: vuln.description });
    }

    match story.verdict {
        Some(StoryVerdict::Approved) => {
            let dirty = ctx.workspace.has_changes(task_id, &primary_repo.name).await?;
            let user_approved = if dirty {
                let checkpoint = format!("story-approval-{}", story.id);
                let payload = serde_json::json!({
                    "storyId": story.id,
                    "title": story.title,
                    "changedFiles": ctx.workspace.changed_files(task_id, &primary_repo.name).await?,
                });
                let response = ctx.approval.request(task_id, &checkpoint, payload, ctx.config.approval_default_timeout_ms).await?;
                matches!(response.action, ApprovalAction::Approve)
            } else {
                false
            };

            if user_approved {
                ctx.workspace.stage_all(task_id, &primary_repo.name).await?;
                let commit_hash = ctx
                    .workspace
                    .commit(task_id, &primary_repo.name, &format!("{}\n\n{}", story.title, story.description))
                    .await?;
                story.commit_hash = Some(commit_hash);
                ctx.archive
                    .record(
                        activity(task_id, ActivityType::StoryComplete, Some(PHASE), Some(&story.id), format!("story '{}' approved", story.title), end),
                        end,
                    )
                    .await?;
            } else {
                story.verdict = Some(StoryVerdict::Rejected);
                ctx.workspace.discard_changes(task_id, &primary_repo.name).await?;
                ctx.archive
                    .record(
                        activity(task_id, ActivityType::StoryFailed, Some(PHASE), Some(&story.id), format!("story '{}' not approved by reviewer", story.title), end),
                        end,
                    )
                    .await?;
            }
        }
        _ => {
            story.verdict = Some(story.verdict.unwrap_or(StoryVerdict::Rejected));
            ctx.workspace.discard_changes(task_id, &primary_repo.name).await?;
            ctx.archive
                .record(
                    activity(task_id, ActivityType::StoryFailed, Some(PHASE), Some(&story.id), format!("story '{}' not approved", story.title), end),
                    end,
                )
                .await?;
        }
    }

    debug_assert!(story.satisfies_rollback_invariant());
    Ok(())
}

async fn record_vulnerabilities<S, B, C, A, G, V>(
    ctx: &OrchestrationContext<S, B, C, A, G, V>,
    vulns: &[Vulnerability],
) -> Result<(), CoreError>
where
    S: DurableStore + 'static,
    B: EventBus + 'static,
    C: Clock + 'static,
    A: CodeAgentClient + 'static,
    G: GitClient + 'static,
    V: CredentialVault + 'static,
{
    for vuln in vulns {
        ctx.store.append_vulnerability(vuln.clone()).await?;
    }
    Ok(())
}
