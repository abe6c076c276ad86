//! A `Story` — a sub-unit produced by Analysis and implemented by Developer.

use serde::{Deserialize, Serialize};

/// Verdict reached by Developer's inner judge loop for a single story.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StoryVerdict {
    Approved,
    NeedsRevision,
    Rejected,
}

/// A child of a Task produced by the Analysis phase (spec.md §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Story {
    pub id: String,
    pub title: String,
    pub description: String,
    pub files_to_modify: Vec<String>,
    pub files_to_create: Vec<String>,
    pub files_to_read: Vec<String>,
    pub acceptance_criteria: Vec<String>,
    pub iteration_count: u32,
    pub verdict: Option<StoryVerdict>,
    pub commit_hash: Option<String>,
    pub vulnerability_ids: Vec<String>,
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
    pub ended_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl Story {
    pub fn new(id: impl Into<String>, title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: description.into(),
            files_to_modify: Vec::new(),
            files_to_create: Vec::new(),
            files_to_read: Vec::new(),
            acceptance_criteria: Vec::new(),
            iteration_count: 0,
            verdict: None,
            commit_hash: None,
            vulnerability_ids: Vec::new(),
            started_at: None,
            ended_at: None,
        }
    }

    /// Rollback invariant (spec.md §3 invariant 4, §4.7): an approved story
    /// must carry a commit hash; a rejected one must not.
    pub fn satisfies_rollback_invariant(&self) -> bool {
        match self.verdict {
            Some(StoryVerdict::Approved) => self.commit_hash.is_some(),
            Some(StoryVerdict::Rejected) => self.commit_hash.is_none(),
            _ => true,
        }
    }
}
