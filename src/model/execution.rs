//! `AgentExecution` and `ToolCall` (spec.md §3).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Running,
    Completed,
    Failed,
    TimedOut,
    Aborted,
}

/// One per `(task, phase, attempt)` — a single session against the code
/// agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentExecution {
    pub id: String,
    pub task_id: String,
    pub phase: String,
    pub agent_role: String,
    pub prompt_excerpt: String,
    pub final_output: Option<String>,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub cost_usd: f64,
    pub duration_ms: Option<u64>,
    pub status: ExecutionStatus,
    pub error: Option<String>,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub ended_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl AgentExecution {
    pub fn total_tokens(&self) -> u64 {
        self.prompt_tokens + self.completion_tokens
    }
}

/// One per tool invocation by the code agent within an execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub execution_id: String,
    pub turn_number: u32,
    pub tool_name: String,
    pub tool_use_id: String,
    pub input: serde_json::Value,
    pub output: Option<serde_json::Value>,
    pub success: Option<bool>,
    pub file_path: Option<String>,
    pub shell_command: Option<String>,
    pub duration_ms: Option<u64>,
    pub call_order: u32,
    pub started_at: chrono::DateTime<chrono::Utc>,
}
