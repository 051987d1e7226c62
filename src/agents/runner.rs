//! Running a single Claude CLI invocation
//!
//! `AgentRunner` is the seam between orchestration (interactive agents, the
//! Ralph Loop) and the actual `claude` process, so orchestration can be
//! exercised with scripted runners.

use super::stream_parser::{collect_text, parse_line, StreamEvent};
use anyhow::{anyhow, Context};
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::sync::watch;

/// Everything needed to launch one agent run
#[derive(Debug, Clone, Default)]
pub struct AgentRunRequest {
    pub working_dir: PathBuf,
    pub prompt: String,
    pub model: Option<String>,
    /// Claude session to continue (`--resume`)
    pub resume_session_id: Option<String>,
    pub append_system_prompt: Option<String>,
    pub allowed_tools: Vec<String>,
    pub disallowed_tools: Vec<String>,
    pub skip_permissions: bool,
}

/// Result of a finished (or cancelled) run
#[derive(Debug, Clone, Default)]
pub struct AgentRunOutput {
    /// Assistant text of the run
    pub text: String,
    pub session_id: Option<String>,
    pub cost_usd: Option<f64>,
    pub duration_ms: Option<u64>,
    pub exit_code: Option<i32>,
    /// The CLI reported an error result
    pub is_error: bool,
    pub cancelled: bool,
    pub stderr: String,
    pub events: Vec<StreamEvent>,
}

impl AgentRunOutput {
    /// Build the output from the parsed event stream
    pub fn from_events(events: Vec<StreamEvent>, exit_code: Option<i32>) -> Self {
        let mut output = AgentRunOutput {
            text: collect_text(&events),
            exit_code,
            ..Default::default()
        };

        for event in &events {
            match event {
                StreamEvent::Init { session_id, .. } if output.session_id.is_none() => {
                    output.session_id = session_id.clone();
                }
                StreamEvent::Result {
                    session_id,
                    cost_usd,
                    duration_ms,
                    is_error,
                    ..
                } => {
                    if session_id.is_some() {
                        output.session_id = session_id.clone();
                    }
                    output.cost_usd = *cost_usd;
                    output.duration_ms = *duration_ms;
                    output.is_error = *is_error;
                }
                _ => {}
            }
        }

        output.events = events;
        output
    }

    /// The run finished normally with a usable result
    pub fn succeeded(&self) -> bool {
        !self.cancelled && !self.is_error && self.exit_code == Some(0)
    }

    /// Human-readable failure reason
    pub fn failure_reason(&self) -> String {
        if self.cancelled {
            return "Agent run was cancelled".to_string();
        }
        let stderr = self.stderr.trim();
        match (self.exit_code, stderr.is_empty()) {
            (Some(code), false) => format!("Agent exited with code {}: {}", code, stderr),
            (Some(code), true) if self.is_error => {
                format!("Agent reported an error (exit code {}): {}", code, self.text)
            }
            (Some(code), true) => format!("Agent exited with code {}", code),
            (None, _) => "Agent was terminated by a signal".to_string(),
        }
    }
}

/// Callback invoked for every parsed event while the process runs
pub type EventCallback = Arc<dyn Fn(&StreamEvent) + Send + Sync>;

/// Cooperative cancellation for a running agent
#[derive(Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once `cancel` has been called
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

impl Default for CancelHandle {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
pub trait AgentRunner: Send + Sync {
    /// Run the agent to completion. Returns `Err` only when the process
    /// could not be started or its output could not be read; an unsuccessful
    /// exit is reported through `AgentRunOutput`.
    async fn run(
        &self,
        request: AgentRunRequest,
        on_event: EventCallback,
        cancel: CancelHandle,
    ) -> anyhow::Result<AgentRunOutput>;
}

/// Runs the real `claude` CLI in stream-json mode
pub struct ClaudeCliRunner {
    claude_path: Option<PathBuf>,
}

impl ClaudeCliRunner {
    pub fn new(claude_path: Option<PathBuf>) -> Self {
        Self { claude_path }
    }

    /// Command-line arguments for a request. The prompt goes on stdin.
    pub fn build_args(request: &AgentRunRequest) -> Vec<String> {
        let mut args: Vec<String> = vec![
            "--print".into(),
            "--output-format".into(),
            "stream-json".into(),
            "--verbose".into(),
        ];

        if let Some(session_id) = &request.resume_session_id {
            args.push("--resume".into());
            args.push(session_id.clone());
        }
        if let Some(model) = request.model.as_ref().filter(|m| !m.is_empty()) {
            args.push("--model".into());
            args.push(model.clone());
        }
        if let Some(prompt) = request
            .append_system_prompt
            .as_ref()
            .filter(|p| !p.trim().is_empty())
        {
            args.push("--append-system-prompt".into());
            args.push(prompt.clone());
        }
        if !request.allowed_tools.is_empty() {
            args.push("--allowedTools".into());
            args.extend(request.allowed_tools.iter().cloned());
        }
        if !request.disallowed_tools.is_empty() {
            args.push("--disallowedTools".into());
            args.extend(request.disallowed_tools.iter().cloned());
        }
        if request.skip_permissions {
            args.push("--dangerously-skip-permissions".into());
        }

        args
    }
}

#[async_trait]
impl AgentRunner for ClaudeCliRunner {
    async fn run(
        &self,
        request: AgentRunRequest,
        on_event: EventCallback,
        cancel: CancelHandle,
    ) -> anyhow::Result<AgentRunOutput> {
        let program = self
            .claude_path
            .clone()
            .ok_or_else(|| anyhow!("Claude CLI not found. Install it or set --claude-path"))?;
        let args = Self::build_args(&request);

        log::info!(
            "[ClaudeCliRunner] Spawning {:?} in {:?} (resume: {:?})",
            program,
            request.working_dir,
            request.resume_session_id
        );

        let mut child = Command::new(&program)
            .args(&args)
            .current_dir(&request.working_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to spawn {:?}", program))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(request.prompt.as_bytes())
                .await
                .context("Failed to write prompt to agent stdin")?;
            // Dropping stdin closes it so the CLI starts processing
        }

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow!("Failed to capture agent stdout"))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| anyhow!("Failed to capture agent stderr"))?;

        let stderr_task = tokio::spawn(async move {
            let mut buf = String::new();
            let _ = stderr.read_to_string(&mut buf).await;
            buf
        });

        let mut lines = BufReader::new(stdout).lines();
        let mut events = Vec::new();
        let mut cancelled = false;

        loop {
            tokio::select! {
                line = lines.next_line() => match line {
                    Ok(Some(line)) => {
                        for event in parse_line(&line) {
                            on_event(&event);
                            events.push(event);
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        log::warn!("[ClaudeCliRunner] Failed to read agent output: {}", e);
                        break;
                    }
                },
                _ = cancel.cancelled() => {
                    log::info!("[ClaudeCliRunner] Cancelling agent process");
                    if let Err(e) = child.kill().await {
                        log::warn!("[ClaudeCliRunner] Failed to kill agent process: {}", e);
                    }
                    cancelled = true;
                    break;
                }
            }
        }

        let status = child.wait().await.context("Failed to wait for agent")?;
        let stderr_output = stderr_task.await.unwrap_or_default();

        let mut output = AgentRunOutput::from_events(events, status.code());
        output.cancelled = cancelled;
        output.stderr = stderr_output;

        log::info!(
            "[ClaudeCliRunner] Agent finished (exit: {:?}, cancelled: {}, cost: {:?})",
            output.exit_code,
            output.cancelled,
            output.cost_usd
        );

        Ok(output)
    }
}
