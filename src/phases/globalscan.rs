//! GlobalScan (spec.md §4.6): always runs, even after an earlier phase
//! failed — a final workspace scan across every repository, rolled up into
//! per-severity/per-type/per-repository counts.

use super::common::activity;
use crate::clock::Clock;
use crate::context::OrchestrationContext;
use crate::error::{CoreError, PhaseError};
use crate::eventbus::EventBus;
use crate::model::{ActivityType, GlobalScanPayload};
use crate::observer::{ScanOptions, Severity};
use crate::store::DurableStore;
use crate::workspace::{CredentialVault, GitClient, RepoSpec};
use crate::agent_client::CodeAgentClient;
use std::collections::HashMap;

const PHASE: &str = "global_scan";

pub async fn run<S, B, C, A, G, V>(
    ctx: &OrchestrationContext<S, B, C, A, G, V>,
    task_id: &str,
    repos: &[RepoSpec],
) -> Result<GlobalScanPayload, PhaseError>
where
    S: DurableStore + 'static,
    B: EventBus + 'static,
    C: Clock + 'static,
    A: CodeAgentClient + 'static,
    G: GitClient + 'static,
    V: CredentialVault + 'static,
{
    run_inner(ctx, task_id, repos).await.map_err(|e| PhaseError::new(PHASE, e))
}

async fn run_inner<S, B, C, A, G, V>(
    ctx: &OrchestrationContext<S, B, C, A, G, V>,
    task_id: &str,
    repos: &[RepoSpec],
) -> Result<GlobalScanPayload, CoreError>
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
        .record(activity(task_id, ActivityType::PhaseStart, Some(PHASE), None, "global scan started", now), now)
        .await?;

    let opts = ScanOptions {
        max_files: ctx.config.observer_scan_max_files,
        max_file_kb: ctx.config.observer_scan_max_file_kb,
        depth: ctx.config.observer_scan_depth,
    };

    let repositories: Vec<(String, std::path::PathBuf)> = repos
        .iter()
        .map(|r| (r.name.clone(), std::path::PathBuf::from(ctx.workspace.workspace_path(task_id, &r.name))))
        .collect();
    let (vulnerabilities, files_scanned) = ctx.observer.scan_repositories(&repositories, task_id, PHASE, opts).await;
    let total_files_scanned = files_scanned as u64;

    let mut by_severity: HashMap<String, u32> = HashMap::new();
    let mut by_type: HashMap<String, u32> = HashMap::new();
    let mut by_repository: HashMap<String, u32> = HashMap::new();
    let mut vulnerability_ids = Vec::with_capacity(vulnerabilities.len());

    for vuln in &vulnerabilities {
        *by_severity.entry(severity_label(vuln.severity).to_string()).or_insert(0) += 1;
        *by_type.entry(vuln.vuln_type.clone()).or_insert(0) += 1;
        if let Some(repo) = repo_for_path(vuln.file_path.as_deref(), repos) {
            *by_repository.entry(repo.to_string()).or_insert(0) += 1;
        }
        vulnerability_ids.push(vuln.id.clone());
        ctx.store.append_vulnerability(vuln.clone()).await?;
    }

    let end = ctx.clock.now();
    ctx.archive
        .record(
            activity(
                task_id,
                ActivityType::PhaseComplete,
                Some(PHASE),
                None,
                format!("global scan found {} vulnerabilities", vulnerabilities.len()),
                end,
            ),
            end,
        )
        .await?;

    Ok(GlobalScanPayload {
        scanned_at: end,
        total_files_scanned,
        repositories_scanned: repos.iter().map(|r| r.name.clone()).collect(),
        vulnerability_ids,
        by_severity,
        by_type,
        by_repository,
    })
}

fn repo_for_path<'a>(path: Option<&str>, repos: &'a [RepoSpec]) -> Option<&'a str> {
    let path = path?;
    repos.iter().find(|r| path.contains(r.name.as_str())).map(|r| r.name.as_str())
}

fn severity_label(severity: Severity) -> &'static str {
    match severity {
        Severity::Critical => "critical",
        Severity::High => "high",
        Severity::Medium => "medium",
        Severity::Low => "low",
    }
}
