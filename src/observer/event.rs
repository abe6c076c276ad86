//! The three event shapes the code-agent event stream delivers, per
//! spec.md §4.4 and §6's `CodeAgentClient` event shape.

use serde_json::Value;

#[derive(Debug, Clone)]
pub enum AgentEvent {
    ToolExecuteBefore {
        tool_use_id: String,
        turn_number: u32,
        tool: String,
        args: Value,
    },
    ToolExecuteAfter {
        tool_use_id: String,
        turn_number: u32,
        tool: String,
        result: Value,
    },
    MessagePartUpdated {
        turn_number: u32,
        text: String,
    },
}

impl AgentEvent {
    pub fn tool_use_id(&self) -> Option<&str> {
        match self {
            AgentEvent::ToolExecuteBefore { tool_use_id, .. } => Some(tool_use_id),
            AgentEvent::ToolExecuteAfter { tool_use_id, .. } => Some(tool_use_id),
            AgentEvent::MessagePartUpdated { .. } => None,
        }
    }

    pub fn turn_number(&self) -> u32 {
        match self {
            AgentEvent::ToolExecuteBefore { turn_number, .. } => *turn_number,
            AgentEvent::ToolExecuteAfter { turn_number, .. } => *turn_number,
            AgentEvent::MessagePartUpdated { turn_number, .. } => *turn_number,
        }
    }

    pub fn tool_name(&self) -> Option<&str> {
        match self {
            AgentEvent::ToolExecuteBefore { tool, .. } => Some(tool),
            AgentEvent::ToolExecuteAfter { tool, .. } => Some(tool),
            AgentEvent::MessagePartUpdated { .. } => None,
        }
    }

    /// The text the catalogue matches against: bash command / tool args for
    /// `tool.execute.before`, serialized result for `tool.execute.after`,
    /// raw text for `message.part.updated`.
    pub fn text_content(&self) -> String {
        match self {
            AgentEvent::ToolExecuteBefore { args, .. } => args.to_string(),
            AgentEvent::ToolExecuteAfter { result, .. } => result.to_string(),
            AgentEvent::MessagePartUpdated { text, .. } => text.clone(),
        }
    }

    pub fn is_message(&self) -> bool {
        matches!(self, AgentEvent::MessagePartUpdated { .. })
    }

    pub fn is_bash_before(&self) -> bool {
        matches!(self, AgentEvent::ToolExecuteBefore { tool, .. } if tool == "bash")
    }

    /// File path argument, when the tool is a read/write/edit call that
    /// names a target file.
    pub fn file_path(&self) -> Option<String> {
        match self {
            AgentEvent::ToolExecuteBefore { args, .. } => args
                .get("path")
                .or_else(|| args.get("file"))
                .or_else(|| args.get("filePath"))
                .and_then(Value::as_str)
                .map(|s| s.to_string()),
            _ => None,
        }
    }
}
