//! Closed phase-payload variants.
//!
//! spec.md §9 flags "dynamic casting of the task description back and forth
//! through JSON" as a pattern to re-architect away from: payloads here are a
//! tagged sum type with one variant per phase, not an open dictionary.

use crate::model::story::Story;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Output of the Planning phase (spec.md §4.6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanningPayload {
    pub clarifications: Vec<ClarificationQA>,
    pub ux_flows: Vec<String>,
    pub planned_tasks: Vec<String>,
    pub enriched_prompt: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClarificationQA {
    pub question: String,
    pub answer: String,
}

/// Output of the Analysis phase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisPayload {
    pub branch_name: String,
    pub stories: Vec<Story>,
    pub summary: String,
    pub approach: String,
    pub risks: Vec<String>,
}

/// Output of the Developer phase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeveloperPayload {
    pub stories: Vec<Story>,
    pub total_commits: u32,
}

/// Output of the TestGeneration phase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestGenerationPayload {
    pub tests_generated: u32,
    pub edge_cases_detected: u32,
    pub coverage_before: f32,
    pub coverage_after: f32,
    pub tests_passed: bool,
}

/// Output of the Merge phase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergePayload {
    pub pull_requests: Vec<PullRequestRef>,
    pub merged: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullRequestRef {
    pub repository: String,
    pub number: u64,
    pub url: String,
}

/// Output of the GlobalScan phase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalScanPayload {
    pub scanned_at: chrono::DateTime<chrono::Utc>,
    pub total_files_scanned: u64,
    pub repositories_scanned: Vec<String>,
    pub vulnerability_ids: Vec<String>,
    pub by_severity: HashMap<String, u32>,
    pub by_type: HashMap<String, u32>,
    pub by_repository: HashMap<String, u32>,
}

/// The approved payload recorded in a [`crate::model::checkpoint::PhaseCheckpoint`]
/// once a phase completes, tagged with an explicit `kind` discriminator
/// rather than an open JSON blob.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum PhasePayload {
    Planning(PlanningPayload),
    Analysis(AnalysisPayload),
    Developer(DeveloperPayload),
    TestGeneration(TestGenerationPayload),
    Merge(MergePayload),
    GlobalScan(GlobalScanPayload),
}
