//! `Vulnerability` — an immutable record emitted by the Security Observer.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Weight used by the risk-score rollup (spec.md §4.4):
    /// `min(100, 25*critical + 15*high + 5*medium + 1*low)`.
    pub fn weight(self) -> u32 {
        match self {
            Severity::Critical => 25,
            Severity::High => 15,
            Severity::Medium => 5,
            Severity::Low => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VulnerabilityCategory {
    DangerousCommand,
    NetworkAttack,
    CodeInjection,
    PathTraversal,
    SecretExposure,
    SupplyChain,
    Persistence,
    PromptInjection,
    ContainerEscape,
    ResourceExhaustion,
}

impl VulnerabilityCategory {
    /// Categories whose `critical`-severity matches hard-block execution
    /// (spec.md §4.4's "policy table").
    pub const HARD_BLOCK_CATEGORIES: [VulnerabilityCategory; 6] = [
        VulnerabilityCategory::DangerousCommand,
        VulnerabilityCategory::NetworkAttack,
        VulnerabilityCategory::CodeInjection,
        VulnerabilityCategory::Persistence,
        VulnerabilityCategory::ContainerEscape,
        VulnerabilityCategory::SupplyChain,
    ];
}

/// Immutable record emitted by the security observer (spec.md §3, §4.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vulnerability {
    pub id: String,
    pub task_id: String,
    pub session_id: String,
    pub phase: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub severity: Severity,
    pub category: VulnerabilityCategory,
    #[serde(rename = "type")]
    pub vuln_type: String,
    pub description: String,
    pub evidence: HashMap<String, String>,
    pub matched_pattern: String,
    pub tool_use_id: Option<String>,
    pub turn_number: Option<u32>,
    pub file_path: Option<String>,
    pub line_number: Option<u32>,
    pub code_snippet: Option<String>,
    pub owasp_category: Option<String>,
    pub cwe_id: Option<String>,
    pub recommendation: Option<String>,
    pub story_id: Option<String>,
    pub blocked: bool,
}

impl Vulnerability {
    /// Truncate offending evidence to 200 chars, per spec.md §4.4's output
    /// record rule.
    pub fn truncate_evidence(text: &str) -> String {
        const MAX: usize = 200;
        if text.chars().count() <= MAX {
            text.to_string()
        } else {
            let truncated: String = text.chars().take(MAX).collect();
            format!("{}…", truncated)
        }
    }
}
