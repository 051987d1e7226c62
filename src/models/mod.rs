// Data models matching the frontend TypeScript types

pub mod settings;

pub use settings::{
    ClaudePermissions, RalphLoopDefaults, Settings, SettingsValidationError,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    Assistant,
    ToolUse,
    ToolResult,
    System,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
            MessageRole::ToolUse => "tool_use",
            MessageRole::ToolResult => "tool_result",
            MessageRole::System => "system",
        }
    }
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single message in a conversation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub role: MessageRole,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_error: Option<bool>,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            id: crate::utils::generate_id("msg"),
            role,
            content: content.into(),
            tool_name: None,
            tool_id: None,
            is_error: None,
            timestamp: Utc::now(),
        }
    }

    pub fn tool_use(tool_id: &str, tool_name: &str, input: &serde_json::Value) -> Self {
        let mut message = Self::new(MessageRole::ToolUse, input.to_string());
        message.tool_id = Some(tool_id.to_string());
        message.tool_name = Some(tool_name.to_string());
        message
    }

    pub fn tool_result(tool_id: &str, content: &str, is_error: bool) -> Self {
        let mut message = Self::new(MessageRole::ToolResult, content);
        message.tool_id = Some(tool_id.to_string());
        message.is_error = Some(is_error);
        message
    }
}

/// A conversation with the agent for a project
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: String,
    pub project_id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Claude CLI session ID used for `--resume`
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub messages: Vec<Message>,
}

/// Status of the interactive agent for a project
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Idle,
    Queued,
    Running,
    Stopped,
    Error,
}

impl AgentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentStatus::Idle => "idle",
            AgentStatus::Queued => "queued",
            AgentStatus::Running => "running",
            AgentStatus::Stopped => "stopped",
            AgentStatus::Error => "error",
        }
    }

    /// Running or waiting for a slot
    pub fn is_active(&self) -> bool {
        matches!(self, AgentStatus::Queued | AgentStatus::Running)
    }
}
