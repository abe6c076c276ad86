//! The code-agent session client (spec.md §6, §9): "the code-agent session
//! is an external collaborator... a narrow interface; implementations are
//! free to sit behind any transport."

use crate::error::CoreError;
use crate::observer::AgentEvent;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    pub title: String,
    pub directory: String,
    pub auto_approve: bool,
}

#[derive(Debug, Clone, Default)]
pub struct PromptOptions {
    pub system_prompt: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct WaitOptions {
    pub idle_timeout_ms: u64,
}

/// Raw event shape delivered by the client, before the Security Observer
/// narrows it into an [`AgentEvent`]: `{type, properties: {tool?, args?,
/// result?, part?}}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawAgentEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub properties: RawAgentEventProperties,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawAgentEventProperties {
    pub tool: Option<String>,
    pub args: Option<serde_json::Value>,
    pub result: Option<serde_json::Value>,
    pub part: Option<String>,
    pub tool_use_id: Option<String>,
    pub turn_number: Option<u32>,
}

impl RawAgentEvent {
    /// Narrow a raw wire event into the closed [`AgentEvent`] the Security
    /// Observer and phase drivers consume. Returns `None` for event types
    /// the core doesn't interpret.
    pub fn into_agent_event(self) -> Option<AgentEvent> {
        let turn_number = self.properties.turn_number.unwrap_or(0);
        match self.event_type.as_str() {
            "tool.execute.before" => Some(AgentEvent::ToolExecuteBefore {
                tool_use_id: self.properties.tool_use_id.unwrap_or_default(),
                turn_number,
                tool: self.properties.tool.unwrap_or_default(),
                args: self.properties.args.unwrap_or(serde_json::Value::Null),
            }),
            "tool.execute.after" => Some(AgentEvent::ToolExecuteAfter {
                tool_use_id: self.properties.tool_use_id.unwrap_or_default(),
                turn_number,
                tool: self.properties.tool.unwrap_or_default(),
                result: self.properties.result.unwrap_or(serde_json::Value::Null),
            }),
            "message.part.updated" => Some(AgentEvent::MessagePartUpdated {
                turn_number,
                text: self.properties.part.unwrap_or_default(),
            }),
            _ => None,
        }
    }
}

/// `connect()`; `createSession`; `sendPrompt`; `waitForIdle`;
/// `abortSession`; `deleteSession` (spec.md §6). Dyn-compatible so phases
/// can hold it as `Arc<dyn CodeAgentClient>`.
#[async_trait]
pub trait CodeAgentClient: Send + Sync {
    async fn connect(&self) -> Result<(), CoreError>;
    async fn create_session(&self, opts: SessionOptions) -> Result<String, CoreError>;
    async fn send_prompt(&self, session_id: &str, text: &str, opts: PromptOptions) -> Result<(), CoreError>;
    async fn wait_for_idle(&self, session_id: &str, opts: WaitOptions) -> Result<Vec<RawAgentEvent>, CoreError>;
    async fn abort_session(&self, session_id: &str) -> Result<(), CoreError>;
    async fn delete_session(&self, session_id: &str) -> Result<(), CoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_execute_before_narrows_to_a_typed_agent_event() {
        let raw = RawAgentEvent {
            event_type: "tool.execute.before".to_string(),
            properties: RawAgentEventProperties {
                tool: Some("bash".to_string()),
                args: Some(serde_json::json!({ "command": "ls" })),
                tool_use_id: Some("tc-1".to_string()),
                turn_number: Some(3),
                ..Default::default()
            },
        };
        let event = raw.into_agent_event().expect("known event type narrows");
        assert_eq!(event.tool_name(), Some("bash"));
        assert_eq!(event.turn_number(), 3);
        assert_eq!(event.tool_use_id(), Some("tc-1"));
    }

    #[test]
    fn unknown_event_type_does_not_narrow() {
        let raw = RawAgentEvent {
            event_type: "session.renamed".to_string(),
            properties: RawAgentEventProperties::default(),
        };
        assert!(raw.into_agent_event().is_none());
    }
}
