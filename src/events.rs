// Event types and payload structures for real-time updates
// These are broadcast via WebSocket to connected clients

use crate::models::{AgentStatus, Message};
use crate::ralph_loop::{RalphLoopStatus, ReviewerFeedback, WorkerSummary};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

// Interactive agent events
pub const EVENT_AGENT_MESSAGE: &str = "agent:message";
pub const EVENT_AGENT_STATUS: &str = "agent:status";
pub const EVENT_AGENT_EXITED: &str = "agent:exited";

// Ralph Loop events
pub const EVENT_RALPH_STATUS: &str = "ralph_loop:status";
pub const EVENT_RALPH_ITERATION_START: &str = "ralph_loop:iteration_start";
pub const EVENT_RALPH_OUTPUT: &str = "ralph_loop:output";
pub const EVENT_RALPH_WORKER_COMPLETE: &str = "ralph_loop:worker_complete";
pub const EVENT_RALPH_REVIEWER_COMPLETE: &str = "ralph_loop:reviewer_complete";
pub const EVENT_RALPH_COMPLETE: &str = "ralph_loop:complete";
pub const EVENT_RALPH_ERROR: &str = "ralph_loop:error";

// Shell command events
pub const EVENT_SHELL_OUTPUT: &str = "shell:output";
pub const EVENT_SHELL_EXIT: &str = "shell:exit";

pub const EVENT_SETTINGS_UPDATED: &str = "settings:updated";
pub const EVENT_PROJECTS_UPDATED: &str = "projects:updated";

/// Payload for a message produced (or received) by the interactive agent
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentMessagePayload {
    pub conversation_id: String,
    pub message: Message,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentStatusPayload {
    pub status: AgentStatus,
    pub conversation_id: Option<String>,
    /// Position in the wait queue when `queued` (0-based)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_position: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentExitedPayload {
    pub conversation_id: String,
    pub exit_code: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RalphLoopStatusPayload {
    pub task_id: String,
    pub status: RalphLoopStatus,
    pub current_iteration: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RalphLoopIterationPayload {
    pub task_id: String,
    pub iteration: u32,
    pub max_turns: u32,
}

/// Streaming output from the worker or reviewer process
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RalphLoopOutputPayload {
    pub task_id: String,
    pub iteration: u32,
    /// "worker" or "reviewer"
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RalphLoopWorkerCompletePayload {
    pub task_id: String,
    pub summary: WorkerSummary,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RalphLoopReviewerCompletePayload {
    pub task_id: String,
    pub feedback: ReviewerFeedback,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RalphLoopCompletePayload {
    pub task_id: String,
    pub status: RalphLoopStatus,
    pub final_status: Option<crate::ralph_loop::RalphLoopFinalStatus>,
    pub iterations: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RalphLoopErrorPayload {
    pub task_id: String,
    pub error: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShellOutputPayload {
    pub id: String,
    /// "stdout" or "stderr"
    pub stream: String,
    pub data: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShellExitPayload {
    pub id: String,
    pub exit_code: Option<i32>,
    pub timed_out: bool,
    pub killed: bool,
}

/// A server event that can be broadcast to WebSocket clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerEvent {
    /// Event type (e.g., "ralph_loop:status", "agent:message")
    pub event: String,
    /// Project the event belongs to; `None` for global events
    pub project_id: Option<String>,
    /// Event payload as JSON value
    pub payload: serde_json::Value,
}

/// Broadcasts events to all connected WebSocket clients
pub struct EventBroadcaster {
    tx: broadcast::Sender<ServerEvent>,
}

impl EventBroadcaster {
    /// Create a new event broadcaster with a channel capacity of 1000 events
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1000);
        Self { tx }
    }

    /// Broadcast an event scoped to a project
    pub fn broadcast(&self, event_type: &str, project_id: &str, payload: impl Serialize) {
        self.send(event_type, Some(project_id.to_string()), payload);
    }

    /// Broadcast an event that is not tied to a project
    pub fn broadcast_global(&self, event_type: &str, payload: impl Serialize) {
        self.send(event_type, None, payload);
    }

    fn send(&self, event_type: &str, project_id: Option<String>, payload: impl Serialize) {
        let event = ServerEvent {
            event: event_type.to_string(),
            project_id,
            payload: serde_json::to_value(payload).unwrap_or(serde_json::Value::Null),
        };

        log::trace!("Broadcasting {} ({:?})", event.event, event.project_id);

        // Ignore send errors (no receivers)
        let _ = self.tx.send(event);
    }

    /// Subscribe to events (returns a receiver)
    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_broadcast_reaches_subscriber() {
        let broadcaster = EventBroadcaster::new();
        let mut rx = broadcaster.subscribe();

        broadcaster.broadcast(
            EVENT_SHELL_EXIT,
            "proj_1",
            ShellExitPayload {
                id: "sh_1".to_string(),
                exit_code: Some(0),
                timed_out: false,
                killed: false,
            },
        );

        let event = rx.recv().await.unwrap();
        assert_eq!(event.event, "shell:exit");
        assert_eq!(event.project_id.as_deref(), Some("proj_1"));
        assert_eq!(event.payload["exitCode"], 0);
    }

    #[test]
    fn test_broadcast_without_subscribers_is_noop() {
        let broadcaster = EventBroadcaster::new();
        broadcaster.broadcast_global(EVENT_SETTINGS_UPDATED, serde_json::json!({}));
    }

    #[test]
    fn test_server_event_serialization() {
        let event = ServerEvent {
            event: EVENT_RALPH_STATUS.to_string(),
            project_id: None,
            payload: serde_json::json!({ "taskId": "task-123" }),
        };

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "ralph_loop:status");
        assert!(json["projectId"].is_null());
        assert_eq!(json["payload"]["taskId"], "task-123");
    }
}
