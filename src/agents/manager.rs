// Interactive agent lifecycle management
//
// One interactive agent per project. At most `max_concurrent_agents` agent
// processes run at once; further requests wait in a FIFO queue.

use super::runner::{AgentRunOutput, AgentRunRequest, AgentRunner, CancelHandle, EventCallback};
use super::stream_parser::StreamEvent;
use crate::events::{
    AgentExitedPayload, AgentMessagePayload, AgentStatusPayload, EventBroadcaster,
    EVENT_AGENT_EXITED, EVENT_AGENT_MESSAGE, EVENT_AGENT_STATUS,
};
use crate::file_storage::{conversations, projects, settings};
use crate::file_storage::projects::Project;
use crate::models::{AgentStatus, Message, MessageRole};
use crate::utils::lock_mutex_recover;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AgentManagerError {
    #[error("An agent is already active for project {0}")]
    AlreadyActive(String),
    #[error("{0}")]
    NotFound(String),
    #[error("Message cannot be empty")]
    EmptyMessage,
    #[error("{0}")]
    Storage(String),
}

/// Returned when a message was accepted
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageResult {
    pub conversation_id: String,
    pub status: AgentStatus,
}

/// Current agent state of a project
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentStatusInfo {
    pub project_id: String,
    pub status: AgentStatus,
    pub conversation_id: Option<String>,
    pub queue_position: Option<usize>,
    pub started_at: Option<DateTime<Utc>>,
}

/// Process slots across all projects
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ResourceStatus {
    pub running: usize,
    pub queued: usize,
    pub max_concurrent: usize,
    pub running_projects: Vec<String>,
    pub queued_projects: Vec<String>,
}

struct RunningAgent {
    conversation_id: String,
    cancel: CancelHandle,
    started_at: DateTime<Utc>,
}

struct QueuedRequest {
    project_id: String,
    conversation_id: String,
    request: AgentRunRequest,
}

#[derive(Default)]
struct ManagerInner {
    running: HashMap<String, RunningAgent>,
    queue: VecDeque<QueuedRequest>,
    /// Projects whose `send_message` is between its check and its start
    reserved: HashSet<String>,
    /// Last reported status per project, with its conversation
    last_status: HashMap<String, (AgentStatus, Option<String>)>,
}

impl ManagerInner {
    fn is_active(&self, project_id: &str) -> bool {
        self.running.contains_key(project_id)
            || self.reserved.contains(project_id)
            || self.queue.iter().any(|q| q.project_id == project_id)
    }
}

/// Agent lifecycle manager
pub struct AgentManager {
    data_dir: PathBuf,
    runner: Arc<dyn AgentRunner>,
    broadcaster: Arc<EventBroadcaster>,
    inner: Mutex<ManagerInner>,
}

impl AgentManager {
    pub fn new(
        data_dir: PathBuf,
        runner: Arc<dyn AgentRunner>,
        broadcaster: Arc<EventBroadcaster>,
    ) -> Self {
        Self {
            data_dir,
            runner,
            broadcaster,
            inner: Mutex::new(ManagerInner::default()),
        }
    }

    fn max_concurrent(&self) -> usize {
        settings::load_settings(&self.data_dir).max_concurrent_agents as usize
    }

    /// Send a user message to the project's agent.
    ///
    /// Appends the message to the conversation (creating one when
    /// `conversation_id` is `None`) and starts or queues the agent.
    pub fn send_message(
        self: &Arc<Self>,
        project: &Project,
        conversation_id: Option<&str>,
        text: &str,
    ) -> Result<SendMessageResult, AgentManagerError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(AgentManagerError::EmptyMessage);
        }

        // Claim the project before anything is written, so a request that
        // loses the race leaves no orphan user message behind
        {
            let mut inner = lock_mutex_recover(&self.inner);
            if inner.is_active(&project.id) {
                return Err(AgentManagerError::AlreadyActive(project.id.clone()));
            }
            inner.reserved.insert(project.id.clone());
        }

        let prepared = self.prepare_request(project, conversation_id, text);

        let mut inner = lock_mutex_recover(&self.inner);
        inner.reserved.remove(&project.id);
        let (conversation_id, queued, max_concurrent) = prepared?;

        let status = if inner.running.len() < max_concurrent {
            self.start_locked(&mut inner, queued);
            AgentStatus::Running
        } else {
            log::info!(
                "[AgentManager] Queueing agent for project {} ({} running)",
                project.id,
                inner.running.len()
            );
            inner.queue.push_back(queued);
            let position = inner.queue.len() - 1;
            self.set_status_locked(
                &mut inner,
                &project.id,
                AgentStatus::Queued,
                Some(conversation_id.clone()),
                Some(position),
            );
            AgentStatus::Queued
        };

        Ok(SendMessageResult {
            conversation_id,
            status,
        })
    }

    /// Persist the user message and build the CLI request. Returns the
    /// conversation ID, the request and the current concurrency limit.
    fn prepare_request(
        &self,
        project: &Project,
        conversation_id: Option<&str>,
        text: &str,
    ) -> Result<(String, QueuedRequest, usize), AgentManagerError> {
        let conversation = match conversation_id {
            Some(id) => conversations::get_conversation(&self.data_dir, &project.id, id)
                .map_err(AgentManagerError::Storage)?
                .ok_or_else(|| {
                    AgentManagerError::NotFound(format!("Conversation not found: {}", id))
                })?,
            None => conversations::create_conversation(&self.data_dir, &project.id, None)
                .map_err(AgentManagerError::Storage)?,
        };

        let user_message = Message::new(MessageRole::User, text);
        conversations::append_message(
            &self.data_dir,
            &project.id,
            &conversation.id,
            user_message.clone(),
        )
        .map_err(AgentManagerError::Storage)?;
        self.broadcaster.broadcast(
            EVENT_AGENT_MESSAGE,
            &project.id,
            AgentMessagePayload {
                conversation_id: conversation.id.clone(),
                message: user_message,
            },
        );

        if let Err(e) = projects::touch_project(&self.data_dir, &project.id) {
            log::warn!("[AgentManager] Failed to touch project {}: {}", project.id, e);
        }

        let settings = settings::load_settings(&self.data_dir);
        let request = AgentRunRequest {
            working_dir: PathBuf::from(&project.path),
            prompt: settings.render_agent_prompt(text),
            model: None,
            resume_session_id: conversation.session_id.clone(),
            append_system_prompt: Some(settings.append_system_prompt.clone())
                .filter(|p| !p.trim().is_empty()),
            allowed_tools: settings.claude_permissions.allowed_tools.clone(),
            disallowed_tools: settings.claude_permissions.disallowed_tools.clone(),
            skip_permissions: settings.claude_permissions.skip_permissions,
        };

        let queued = QueuedRequest {
            project_id: project.id.clone(),
            conversation_id: conversation.id.clone(),
            request,
        };
        Ok((
            conversation.id,
            queued,
            settings.max_concurrent_agents as usize,
        ))
    }

    /// Whether the project has a running, queued or starting agent
    pub fn is_active(&self, project_id: &str) -> bool {
        lock_mutex_recover(&self.inner).is_active(project_id)
    }

    /// Drop what is remembered about a deleted project
    pub fn forget_project(&self, project_id: &str) {
        lock_mutex_recover(&self.inner).last_status.remove(project_id);
    }

    fn set_status_locked(
        &self,
        inner: &mut ManagerInner,
        project_id: &str,
        status: AgentStatus,
        conversation_id: Option<String>,
        queue_position: Option<usize>,
    ) {
        inner
            .last_status
            .insert(project_id.to_string(), (status, conversation_id.clone()));
        self.broadcaster.broadcast(
            EVENT_AGENT_STATUS,
            project_id,
            AgentStatusPayload {
                status,
                conversation_id,
                queue_position,
            },
        );
    }

    /// Register the agent as running and spawn its task
    fn start_locked(self: &Arc<Self>, inner: &mut ManagerInner, queued: QueuedRequest) {
        let cancel = CancelHandle::new();
        inner.running.insert(
            queued.project_id.clone(),
            RunningAgent {
                conversation_id: queued.conversation_id.clone(),
                cancel: cancel.clone(),
                started_at: Utc::now(),
            },
        );
        self.set_status_locked(
            inner,
            &queued.project_id,
            AgentStatus::Running,
            Some(queued.conversation_id.clone()),
            None,
        );

        log::info!(
            "[AgentManager] Starting agent for project {} (conversation {})",
            queued.project_id,
            queued.conversation_id
        );

        let manager = Arc::clone(self);
        tokio::spawn(async move {
            manager.run_agent(queued, cancel).await;
        });
    }

    async fn run_agent(self: Arc<Self>, queued: QueuedRequest, cancel: CancelHandle) {
        let QueuedRequest {
            project_id,
            conversation_id,
            request,
        } = queued;

        let on_event = self.event_sink(&project_id, &conversation_id);
        let result = self.runner.run(request, on_event, cancel).await;

        let (status, exit_code, error) = match &result {
            Ok(output) if output.cancelled => (AgentStatus::Stopped, output.exit_code, None),
            Ok(output) if output.succeeded() => (AgentStatus::Idle, output.exit_code, None),
            Ok(output) => (
                AgentStatus::Error,
                output.exit_code,
                Some(output.failure_reason()),
            ),
            Err(e) => (AgentStatus::Error, None, Some(e.to_string())),
        };

        if let Ok(AgentRunOutput {
            session_id: Some(session_id),
            ..
        }) = &result
        {
            if let Err(e) = conversations::set_session_id(
                &self.data_dir,
                &project_id,
                &conversation_id,
                session_id,
            ) {
                log::warn!("[AgentManager] Failed to store session ID: {}", e);
            }
        }

        if let Some(ref error) = error {
            log::warn!("[AgentManager] Agent for project {} failed: {}", project_id, error);
            let message = Message::new(MessageRole::System, error.clone());
            self.persist_and_broadcast(&project_id, &conversation_id, message);
        }

        {
            let mut inner = lock_mutex_recover(&self.inner);
            inner.running.remove(&project_id);
            self.set_status_locked(
                &mut inner,
                &project_id,
                status,
                Some(conversation_id.clone()),
                None,
            );
        }

        self.drain_queue();

        self.broadcaster.broadcast(
            EVENT_AGENT_EXITED,
            &project_id,
            AgentExitedPayload {
                conversation_id,
                exit_code,
                error,
            },
        );
    }

    /// Start queued agents while slots are free
    fn drain_queue(self: &Arc<Self>) {
        let max = self.max_concurrent();
        let mut inner = lock_mutex_recover(&self.inner);
        while inner.running.len() < max {
            match inner.queue.pop_front() {
                Some(next) => self.start_locked(&mut inner, next),
                None => break,
            }
        }

        let positions: Vec<(String, String)> = inner
            .queue
            .iter()
            .map(|q| (q.project_id.clone(), q.conversation_id.clone()))
            .collect();
        for (position, (project_id, conversation_id)) in positions.into_iter().enumerate() {
            self.set_status_locked(
                &mut inner,
                &project_id,
                AgentStatus::Queued,
                Some(conversation_id),
                Some(position),
            );
        }
    }

    /// Callback persisting each parsed event into the conversation
    fn event_sink(self: &Arc<Self>, project_id: &str, conversation_id: &str) -> EventCallback {
        let manager = Arc::clone(self);
        let project_id = project_id.to_string();
        let conversation_id = conversation_id.to_string();

        Arc::new(move |event: &StreamEvent| {
            if let StreamEvent::Init {
                session_id: Some(session_id),
                ..
            } = event
            {
                if let Err(e) = conversations::set_session_id(
                    &manager.data_dir,
                    &project_id,
                    &conversation_id,
                    session_id,
                ) {
                    log::warn!("[AgentManager] Failed to store session ID: {}", e);
                }
            }

            if let Some(message) = message_for_event(event) {
                manager.persist_and_broadcast(&project_id, &conversation_id, message);
            }
        })
    }

    fn persist_and_broadcast(&self, project_id: &str, conversation_id: &str, message: Message) {
        if let Err(e) = conversations::append_message(
            &self.data_dir,
            project_id,
            conversation_id,
            message.clone(),
        ) {
            log::warn!("[AgentManager] Failed to persist message: {}", e);
        }
        self.broadcaster.broadcast(
            EVENT_AGENT_MESSAGE,
            project_id,
            AgentMessagePayload {
                conversation_id: conversation_id.to_string(),
                message,
            },
        );
    }

    /// Stop the project's agent: kill the running process or drop the queued
    /// request. Returns `false` when nothing was active.
    pub fn stop(&self, project_id: &str) -> bool {
        let mut inner = lock_mutex_recover(&self.inner);

        if let Some(agent) = inner.running.get(project_id) {
            log::info!("[AgentManager] Stopping agent for project {}", project_id);
            agent.cancel.cancel();
            return true;
        }

        if let Some(index) = inner.queue.iter().position(|q| q.project_id == project_id) {
            if let Some(removed) = inner.queue.remove(index) {
                log::info!("[AgentManager] Removed queued agent for project {}", project_id);
                self.set_status_locked(
                    &mut inner,
                    project_id,
                    AgentStatus::Stopped,
                    Some(removed.conversation_id),
                    None,
                );
            }
            return true;
        }

        false
    }

    pub fn status(&self, project_id: &str) -> AgentStatusInfo {
        let inner = lock_mutex_recover(&self.inner);

        if let Some(agent) = inner.running.get(project_id) {
            return AgentStatusInfo {
                project_id: project_id.to_string(),
                status: AgentStatus::Running,
                conversation_id: Some(agent.conversation_id.clone()),
                queue_position: None,
                started_at: Some(agent.started_at),
            };
        }

        if let Some(position) = inner.queue.iter().position(|q| q.project_id == project_id) {
            return AgentStatusInfo {
                project_id: project_id.to_string(),
                status: AgentStatus::Queued,
                conversation_id: Some(inner.queue[position].conversation_id.clone()),
                queue_position: Some(position),
                started_at: None,
            };
        }

        let (status, conversation_id) = inner
            .last_status
            .get(project_id)
            .cloned()
            .unwrap_or((AgentStatus::Idle, None));

        AgentStatusInfo {
            project_id: project_id.to_string(),
            status,
            conversation_id,
            queue_position: None,
            started_at: None,
        }
    }

    pub fn resource_status(&self) -> ResourceStatus {
        let max_concurrent = self.max_concurrent();
        let inner = lock_mutex_recover(&self.inner);
        let mut running_projects: Vec<String> = inner.running.keys().cloned().collect();
        running_projects.sort();

        ResourceStatus {
            running: inner.running.len(),
            queued: inner.queue.len(),
            max_concurrent,
            running_projects,
            queued_projects: inner.queue.iter().map(|q| q.project_id.clone()).collect(),
        }
    }

    /// Cancel every running agent and clear the queue. Returns how many
    /// agents were affected.
    pub fn stop_all(&self) -> usize {
        let mut inner = lock_mutex_recover(&self.inner);
        let count = inner.running.len() + inner.queue.len();

        for agent in inner.running.values() {
            agent.cancel.cancel();
        }
        inner.queue.clear();

        if count > 0 {
            log::info!("[AgentManager] Stopped {} agent(s)", count);
        }
        count
    }
}

/// Conversation message for a stream event, if it should be recorded
fn message_for_event(event: &StreamEvent) -> Option<Message> {
    match event {
        StreamEvent::AssistantText { text } => {
            Some(Message::new(MessageRole::Assistant, text.clone()))
        }
        StreamEvent::ToolUse { id, name, input } => Some(Message::tool_use(id, name, input)),
        StreamEvent::ToolResult {
            tool_id,
            content,
            is_error,
        } => Some(Message::tool_result(tool_id, content, *is_error)),
        StreamEvent::Result {
            is_error: true,
            result_text,
            subtype,
            ..
        } => Some(Message::new(
            MessageRole::System,
            result_text
                .clone()
                .unwrap_or_else(|| format!("Agent finished with {}", subtype)),
        )),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::ServerEvent;
    use crate::models::settings::PartialSettings;
    use async_trait::async_trait;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::sync::{broadcast, Notify};

    /// Emits a fixed event script; optionally blocks until released or cancelled
    struct ScriptedRunner {
        events: Vec<StreamEvent>,
        gate: Option<Arc<Notify>>,
    }

    #[async_trait]
    impl AgentRunner for ScriptedRunner {
        async fn run(
            &self,
            _request: AgentRunRequest,
            on_event: EventCallback,
            cancel: CancelHandle,
        ) -> anyhow::Result<AgentRunOutput> {
            for event in &self.events {
                on_event(event);
            }
            if let Some(gate) = &self.gate {
                tokio::select! {
                    _ = gate.notified() => {}
                    _ = cancel.cancelled() => {
                        let mut output = AgentRunOutput::from_events(self.events.clone(), None);
                        output.cancelled = true;
                        return Ok(output);
                    }
                }
            }
            Ok(AgentRunOutput::from_events(self.events.clone(), Some(0)))
        }
    }

    fn script() -> Vec<StreamEvent> {
        vec![
            StreamEvent::Init {
                session_id: Some("sess-42".to_string()),
                model: None,
            },
            StreamEvent::AssistantText {
                text: "Hello from the agent".to_string(),
            },
            StreamEvent::Result {
                subtype: "success".to_string(),
                session_id: Some("sess-42".to_string()),
                result_text: None,
                cost_usd: Some(0.01),
                duration_ms: Some(5),
                is_error: false,
            },
        ]
    }

    struct Fixture {
        _data: TempDir,
        _workspace: TempDir,
        data_dir: PathBuf,
        manager: Arc<AgentManager>,
        broadcaster: Arc<EventBroadcaster>,
    }

    fn fixture(gate: Option<Arc<Notify>>) -> Fixture {
        let data = TempDir::new().unwrap();
        let workspace = TempDir::new().unwrap();
        let broadcaster = Arc::new(EventBroadcaster::new());
        let runner = Arc::new(ScriptedRunner {
            events: script(),
            gate,
        });
        let manager = Arc::new(AgentManager::new(
            data.path().to_path_buf(),
            runner,
            broadcaster.clone(),
        ));
        Fixture {
            data_dir: data.path().to_path_buf(),
            _data: data,
            _workspace: workspace,
            manager,
            broadcaster,
        }
    }

    fn register(fixture: &Fixture, name: &str) -> Project {
        let dir = fixture._workspace.path().join(name);
        std::fs::create_dir_all(&dir).unwrap();
        projects::register_project(&fixture.data_dir, &dir.to_string_lossy(), None).unwrap()
    }

    async fn wait_for(
        rx: &mut broadcast::Receiver<ServerEvent>,
        event: &str,
        project_id: &str,
    ) -> ServerEvent {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let received = rx.recv().await.unwrap();
                if received.event == event && received.project_id.as_deref() == Some(project_id) {
                    return received;
                }
            }
        })
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_send_message_persists_conversation() {
        let fixture = fixture(None);
        let project = register(&fixture, "app");
        let mut rx = fixture.broadcaster.subscribe();

        let result = fixture
            .manager
            .send_message(&project, None, "Explain the build")
            .unwrap();
        assert_eq!(result.status, AgentStatus::Running);

        wait_for(&mut rx, EVENT_AGENT_EXITED, &project.id).await;

        let conversation =
            conversations::get_conversation(&fixture.data_dir, &project.id, &result.conversation_id)
                .unwrap()
                .unwrap();
        assert_eq!(conversation.title, "Explain the build");
        assert_eq!(conversation.session_id.as_deref(), Some("sess-42"));
        let roles: Vec<MessageRole> = conversation.messages.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![MessageRole::User, MessageRole::Assistant]);
    }

    #[tokio::test]
    async fn test_empty_message_rejected() {
        let fixture = fixture(None);
        let project = register(&fixture, "app");
        assert!(matches!(
            fixture.manager.send_message(&project, None, "   "),
            Err(AgentManagerError::EmptyMessage)
        ));
    }

    #[tokio::test]
    async fn test_queueing_beyond_limit_and_stop() {
        let gate = Arc::new(Notify::new());
        let fixture = fixture(Some(gate.clone()));
        settings::update_settings(
            &fixture.data_dir,
            &PartialSettings {
                max_concurrent_agents: Some(1),
                ..Default::default()
            },
        )
        .unwrap();

        let first = register(&fixture, "first");
        let second = register(&fixture, "second");
        let mut rx = fixture.broadcaster.subscribe();

        let a = fixture.manager.send_message(&first, None, "one").unwrap();
        let b = fixture.manager.send_message(&second, None, "two").unwrap();
        assert_eq!(a.status, AgentStatus::Running);
        assert_eq!(b.status, AgentStatus::Queued);
        assert!(matches!(
            fixture.manager.send_message(&first, None, "again"),
            Err(AgentManagerError::AlreadyActive(_))
        ));

        let resources = fixture.manager.resource_status();
        assert_eq!(resources.running, 1);
        assert_eq!(resources.queued, 1);
        assert_eq!(resources.max_concurrent, 1);

        // Stopping the running agent frees the slot for the queued one
        assert!(fixture.manager.stop(&first.id));
        wait_for(&mut rx, EVENT_AGENT_EXITED, &first.id).await;
        assert_eq!(fixture.manager.status(&first.id).status, AgentStatus::Stopped);
        assert_eq!(fixture.manager.status(&second.id).status, AgentStatus::Running);

        gate.notify_one();
        wait_for(&mut rx, EVENT_AGENT_EXITED, &second.id).await;
        assert_eq!(fixture.manager.status(&second.id).status, AgentStatus::Idle);
        assert!(!fixture.manager.stop(&second.id));
    }

    #[tokio::test]
    async fn test_stop_queued_request() {
        let gate = Arc::new(Notify::new());
        let fixture = fixture(Some(gate.clone()));
        settings::update_settings(
            &fixture.data_dir,
            &PartialSettings {
                max_concurrent_agents: Some(1),
                ..Default::default()
            },
        )
        .unwrap();

        let first = register(&fixture, "first");
        let second = register(&fixture, "second");
        fixture.manager.send_message(&first, None, "one").unwrap();
        fixture.manager.send_message(&second, None, "two").unwrap();

        assert!(fixture.manager.stop(&second.id));
        assert_eq!(fixture.manager.status(&second.id).status, AgentStatus::Stopped);
        assert_eq!(fixture.manager.resource_status().queued, 0);

        fixture.manager.forget_project(&second.id);
        assert_eq!(fixture.manager.status(&second.id).status, AgentStatus::Idle);

        assert_eq!(fixture.manager.stop_all(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_racing_sends_store_one_user_message() {
        let gate = Arc::new(Notify::new());
        let fixture = fixture(Some(gate));
        let project = register(&fixture, "app");
        let conversation =
            conversations::create_conversation(&fixture.data_dir, &project.id, None).unwrap();
        let handle = tokio::runtime::Handle::current();

        let accepted = std::thread::scope(|scope| {
            let senders: Vec<_> = (0..6)
                .map(|n| {
                    let handle = handle.clone();
                    let manager = &fixture.manager;
                    let project = &project;
                    let conversation_id = conversation.id.as_str();
                    scope.spawn(move || {
                        let _runtime = handle.enter();
                        let text = format!("message {}", n);
                        manager
                            .send_message(project, Some(conversation_id), &text)
                            .is_ok()
                    })
                })
                .collect();
            senders
                .into_iter()
                .map(|sender| sender.join().unwrap())
                .filter(|accepted| *accepted)
                .count()
        });
        assert_eq!(accepted, 1);

        let stored =
            conversations::get_conversation(&fixture.data_dir, &project.id, &conversation.id)
                .unwrap()
                .unwrap();
        let user_messages = stored
            .messages
            .iter()
            .filter(|m| m.role == MessageRole::User)
            .count();
        assert_eq!(user_messages, 1);

        assert!(fixture.manager.stop(&project.id));
    }

    #[test]
    fn test_message_for_event() {
        assert!(message_for_event(&StreamEvent::Init {
            session_id: None,
            model: None
        })
        .is_none());

        let message = message_for_event(&StreamEvent::ToolResult {
            tool_id: "t1".to_string(),
            content: "ok".to_string(),
            is_error: false,
        })
        .unwrap();
        assert_eq!(message.role, MessageRole::ToolResult);
        assert_eq!(message.tool_id.as_deref(), Some("t1"));
    }
}
