//! Server application state shared across handlers

use super::error::{ApiError, ApiResult};
use crate::agents::{AgentManager, AgentRunner, ClaudeCliRunner};
use crate::config::ServerConfig;
use crate::events::EventBroadcaster;
use crate::file_storage::projects::{self, Project};
use crate::git::GitState;
use crate::ralph_loop::RalphLoopService;
use crate::shell::ShellService;
use crate::shutdown::{ShutdownResult, ShutdownState};
use std::path::PathBuf;
use std::sync::Arc;

/// Shared state for the server, containing all the services handlers use
#[derive(Clone)]
pub struct ServerAppState {
    /// Bearer token; `None` disables authentication
    pub auth_token: Option<String>,

    /// Root of all persisted data
    pub data_dir: PathBuf,

    /// Allowed CORS origins; empty means any
    pub cors_origins: Vec<String>,

    /// Shutdown state
    pub shutdown_state: ShutdownState,

    /// Event broadcaster for WebSocket clients
    pub broadcaster: Arc<EventBroadcaster>,

    /// Interactive agent per project
    pub agent_manager: Arc<AgentManager>,

    /// Active Ralph loops
    pub ralph_loops: Arc<RalphLoopService>,

    /// One-off shell commands
    pub shell: Arc<ShellService>,

    /// Git manager state
    pub git_state: Arc<GitState>,
}

impl ServerAppState {
    /// Build the state with the real `claude` CLI runner
    pub fn new(config: &ServerConfig, shutdown_state: ShutdownState) -> Self {
        let runner: Arc<dyn AgentRunner> =
            Arc::new(ClaudeCliRunner::new(config.claude_path.clone()));
        Self::with_runner(config, shutdown_state, runner)
    }

    /// Build the state around any agent runner (tests use scripted ones)
    pub fn with_runner(
        config: &ServerConfig,
        shutdown_state: ShutdownState,
        runner: Arc<dyn AgentRunner>,
    ) -> Self {
        let broadcaster = Arc::new(EventBroadcaster::new());
        let data_dir = config.data_dir.clone();

        Self {
            auth_token: config.auth_token.clone(),
            cors_origins: config.cors_origins.clone(),
            shutdown_state,
            agent_manager: Arc::new(AgentManager::new(
                data_dir.clone(),
                runner.clone(),
                broadcaster.clone(),
            )),
            ralph_loops: Arc::new(RalphLoopService::new(
                data_dir.clone(),
                runner,
                broadcaster.clone(),
            )),
            shell: Arc::new(ShellService::new(broadcaster.clone())),
            git_state: Arc::new(GitState::new()),
            broadcaster,
            data_dir,
        }
    }

    /// Look up a registered project or fail with 404
    pub fn project(&self, project_id: &str) -> ApiResult<Project> {
        projects::get_project(&self.data_dir, project_id)
            .map_err(ApiError::Internal)?
            .ok_or_else(|| ApiError::NotFound(format!("Project not found: {}", project_id)))
    }

    /// Stop everything that owns a child process
    pub fn stop_all(&self) -> ShutdownResult {
        ShutdownResult {
            agents_stopped: self.agent_manager.stop_all(),
            loops_stopped: self.ralph_loops.stop_all(),
            commands_killed: self.shell.kill_all(),
        }
    }
}
