//! Workspace scan mode (spec.md §4.4): walk code files and run the
//! catalogue over each line. Runs on a blocking thread since it does
//! synchronous filesystem I/O.

use super::catalogue::{CATALOGUE, CWE_BY_TYPE, OWASP_BY_TYPE, RECOMMENDATION_BY_TYPE};
use crate::model::Vulnerability;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

const ALLOWED_EXTENSIONS: &[&str] = &[
    "rs", "ts", "tsx", "js", "jsx", "py", "go", "java", "rb", "php", "sh", "bash", "yml", "yaml",
    "json", "env", "toml", "sql", "md",
];

const IGNORED_DIRS: &[&str] = &["node_modules", ".git", ".hg", ".svn", "target", "dist", "build", "out", "vendor"];

#[derive(Clone)]
pub struct ScanOptions {
    pub max_files: usize,
    pub max_file_kb: usize,
    pub depth: usize,
}

#[derive(Clone)]
pub struct ScanContext {
    pub task_id: String,
    pub phase: String,
    pub repository: Option<String>,
}

fn collect_files(root: &Path, depth: usize, opts: &ScanOptions, out: &mut Vec<PathBuf>) {
    if depth > opts.depth || out.len() >= opts.max_files {
        return;
    }
    let entries = match std::fs::read_dir(root) {
        Ok(entries) => entries,
        Err(_) => return,
    };
    for entry in entries.flatten() {
        if out.len() >= opts.max_files {
            return;
        }
        let path = entry.path();
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if path.is_dir() {
            if IGNORED_DIRS.contains(&name.as_ref()) {
                continue;
            }
            collect_files(&path, depth + 1, opts, out);
            continue;
        }
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        if !ALLOWED_EXTENSIONS.contains(&ext) {
            continue;
        }
        if let Ok(meta) = entry.metadata() {
            if meta.len() as usize > opts.max_file_kb * 1024 {
                continue;
            }
        }
        out.push(path);
    }
}

/// Synchronous scan body; callers run this inside `spawn_blocking`. Returns
/// the vulnerabilities found plus the number of files actually scanned.
pub fn scan_workspace_blocking(
    root: &Path,
    ctx: &ScanContext,
    opts: &ScanOptions,
    now: DateTime<Utc>,
) -> (Vec<Vulnerability>, usize) {
    let mut files = Vec::new();
    collect_files(root, 0, opts, &mut files);
    let file_count = files.len();

    let mut vulnerabilities = Vec::new();
    for path in files {
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(_) => continue,
        };
        let display_path = path.to_string_lossy().to_string();
        for (line_idx, line) in content.lines().enumerate() {
            for rule in CATALOGUE.iter() {
                if let Some(found) = rule.regex.find(line) {
                    let mut evidence = HashMap::new();
                    evidence.insert(
                        "matched".to_string(),
                        Vulnerability::truncate_evidence(found.as_str()),
                    );
                    vulnerabilities.push(Vulnerability {
                        id: uuid::Uuid::new_v4().to_string(),
                        task_id: ctx.task_id.clone(),
                        session_id: "workspace-scan".to_string(),
                        phase: ctx.phase.clone(),
                        timestamp: now,
                        severity: rule.severity,
                        category: rule.category,
                        vuln_type: rule.vuln_type.to_string(),
                        description: rule.description.to_string(),
                        evidence,
                        matched_pattern: rule.regex.as_str().to_string(),
                        tool_use_id: None,
                        turn_number: None,
                        file_path: Some(display_path.clone()),
                        line_number: Some((line_idx + 1) as u32),
                        code_snippet: Some(Vulnerability::truncate_evidence(line)),
                        owasp_category: OWASP_BY_TYPE.get(rule.vuln_type).map(|s| s.to_string()),
                        cwe_id: CWE_BY_TYPE.get(rule.vuln_type).map(|s| s.to_string()),
                        recommendation: RECOMMENDATION_BY_TYPE.get(rule.vuln_type).map(|s| s.to_string()),
                        story_id: None,
                        // Workspace scans never set blocked, per spec.md §4.4.
                        blocked: false,
                    });
                }
            }
        }
    }
    (vulnerabilities, file_count)
}
