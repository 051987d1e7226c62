//! Shell service - runs one-off commands in a project directory
//!
//! Commands run through `sh -c` (`cmd /C` on Windows). Output is streamed
//! line by line as `shell:output` events and completion is reported as a
//! single `shell:exit` event. Commands are killed when they exceed their
//! timeout or when `kill` is called. On unix each command leads its own
//! process group and the whole group is killed, background jobs included.

use crate::agents::CancelHandle;
use crate::events::{
    EventBroadcaster, ShellExitPayload, ShellOutputPayload, EVENT_SHELL_EXIT, EVENT_SHELL_OUTPUT,
};
use crate::utils::{generate_id, lock_mutex_recover};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;

pub const DEFAULT_TIMEOUT_SECS: u64 = 300;
pub const MAX_TIMEOUT_SECS: u64 = 3600;
pub const MAX_CONCURRENT_PER_PROJECT: usize = 5;

/// How long to wait for output readers after the process is gone. A
/// backgrounded grandchild can keep the pipes open indefinitely.
const READER_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Error)]
pub enum ShellError {
    #[error("Command cannot be empty")]
    EmptyCommand,
    #[error("Timeout must be between 1 and 3600 seconds")]
    InvalidTimeout,
    #[error("Too many running commands for this project (max {0})")]
    TooManyCommands(usize),
    #[error("Working directory does not exist: {0}")]
    MissingWorkingDir(String),
    #[error("Failed to start command: {0}")]
    Spawn(String),
}

/// A running command as reported by `list`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShellCommandInfo {
    pub id: String,
    pub project_id: String,
    pub command: String,
    pub cwd: String,
    pub timeout_secs: u64,
    pub started_at: DateTime<Utc>,
}

struct RunningCommand {
    info: ShellCommandInfo,
    cancel: CancelHandle,
    /// Shell pid, which is also the pgid on unix
    #[cfg_attr(not(unix), allow(dead_code))]
    pid: Option<u32>,
}

/// How a command ended
enum Termination {
    Exited(Option<i32>),
    TimedOut,
    Killed,
}

pub struct ShellService {
    broadcaster: Arc<EventBroadcaster>,
    running: Mutex<HashMap<String, RunningCommand>>,
    max_per_project: usize,
}

impl ShellService {
    pub fn new(broadcaster: Arc<EventBroadcaster>) -> Self {
        Self {
            broadcaster,
            running: Mutex::new(HashMap::new()),
            max_per_project: MAX_CONCURRENT_PER_PROJECT,
        }
    }

    /// Start a command and return immediately. Must be called inside a
    /// tokio runtime.
    pub fn run(
        self: &Arc<Self>,
        project_id: &str,
        working_dir: &Path,
        command: &str,
        timeout_secs: Option<u64>,
    ) -> Result<ShellCommandInfo, ShellError> {
        let command = command.trim();
        if command.is_empty() {
            return Err(ShellError::EmptyCommand);
        }
        let timeout_secs = timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS);
        if timeout_secs == 0 || timeout_secs > MAX_TIMEOUT_SECS {
            return Err(ShellError::InvalidTimeout);
        }
        if !working_dir.is_dir() {
            return Err(ShellError::MissingWorkingDir(
                working_dir.display().to_string(),
            ));
        }

        // Hold the lock across the limit check and the insert
        let mut running = lock_mutex_recover(&self.running);
        let active = running
            .values()
            .filter(|c| c.info.project_id == project_id)
            .count();
        if active >= self.max_per_project {
            return Err(ShellError::TooManyCommands(self.max_per_project));
        }

        let child = spawn_shell(command, working_dir)
            .map_err(|e| ShellError::Spawn(e.to_string()))?;

        let info = ShellCommandInfo {
            id: generate_id("sh"),
            project_id: project_id.to_string(),
            command: command.to_string(),
            cwd: working_dir.display().to_string(),
            timeout_secs,
            started_at: Utc::now(),
        };
        let cancel = CancelHandle::new();
        running.insert(
            info.id.clone(),
            RunningCommand {
                info: info.clone(),
                cancel: cancel.clone(),
                pid: child.id(),
            },
        );
        drop(running);

        log::info!(
            "[ShellService] Started {} in {}: {}",
            info.id,
            info.cwd,
            info.command
        );

        let service = Arc::clone(self);
        let supervised = info.clone();
        tokio::spawn(async move {
            service.supervise(supervised, child, cancel).await;
        });

        Ok(info)
    }

    /// Kill a running command. Returns false if it is not running.
    pub fn kill(&self, id: &str) -> bool {
        match lock_mutex_recover(&self.running).get(id) {
            Some(command) => {
                log::info!("[ShellService] Killing {}", id);
                command.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Running commands for a project, oldest first
    pub fn list(&self, project_id: &str) -> Vec<ShellCommandInfo> {
        let mut commands: Vec<ShellCommandInfo> = lock_mutex_recover(&self.running)
            .values()
            .filter(|c| c.info.project_id == project_id)
            .map(|c| c.info.clone())
            .collect();
        commands.sort_by(|a, b| a.started_at.cmp(&b.started_at));
        commands
    }

    /// Kill every running command (shutdown). Process groups are signalled
    /// right away since the supervising tasks may never run again.
    pub fn kill_all(&self) -> usize {
        let running = lock_mutex_recover(&self.running);
        for command in running.values() {
            #[cfg(unix)]
            kill_process_group(command.pid, &command.info.id);
            command.cancel.cancel();
        }
        running.len()
    }

    async fn supervise(
        self: Arc<Self>,
        info: ShellCommandInfo,
        mut child: Child,
        cancel: CancelHandle,
    ) {
        let readers: Vec<JoinHandle<()>> = [
            child.stdout.take().map(|out| self.stream_output(&info, "stdout", out)),
            child.stderr.take().map(|err| self.stream_output(&info, "stderr", err)),
        ]
        .into_iter()
        .flatten()
        .collect();

        let timeout = tokio::time::sleep(Duration::from_secs(info.timeout_secs));
        let termination = tokio::select! {
            status = child.wait() => match status {
                Ok(status) => Termination::Exited(status.code()),
                Err(e) => {
                    log::warn!("[ShellService] Failed to wait for {}: {}", info.id, e);
                    Termination::Exited(None)
                }
            },
            _ = timeout => Termination::TimedOut,
            _ = cancel.cancelled() => Termination::Killed,
        };

        if !matches!(termination, Termination::Exited(_)) {
            #[cfg(unix)]
            kill_process_group(child.id(), &info.id);
            if let Err(e) = child.kill().await {
                log::warn!("[ShellService] Failed to kill {}: {}", info.id, e);
            }
        }

        for reader in readers {
            let abort = reader.abort_handle();
            if tokio::time::timeout(READER_DRAIN_TIMEOUT, reader).await.is_err() {
                abort.abort();
            }
        }

        lock_mutex_recover(&self.running).remove(&info.id);

        let payload = match termination {
            Termination::Exited(exit_code) => ShellExitPayload {
                id: info.id.clone(),
                exit_code,
                timed_out: false,
                killed: false,
            },
            Termination::TimedOut => ShellExitPayload {
                id: info.id.clone(),
                exit_code: None,
                timed_out: true,
                killed: true,
            },
            Termination::Killed => ShellExitPayload {
                id: info.id.clone(),
                exit_code: None,
                timed_out: false,
                killed: true,
            },
        };

        log::info!(
            "[ShellService] {} finished (exit: {:?}, timed out: {}, killed: {})",
            info.id,
            payload.exit_code,
            payload.timed_out,
            payload.killed
        );
        self.broadcaster
            .broadcast(EVENT_SHELL_EXIT, &info.project_id, payload);
    }

    fn stream_output<R>(
        &self,
        info: &ShellCommandInfo,
        stream: &'static str,
        reader: R,
    ) -> JoinHandle<()>
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let broadcaster = Arc::clone(&self.broadcaster);
        let id = info.id.clone();
        let project_id = info.project_id.clone();

        tokio::spawn(async move {
            let mut reader = BufReader::new(reader);
            let mut buf = Vec::new();

            // Lines are read as bytes so non-UTF-8 output does not end the stream
            while let Ok(n) = reader.read_until(b'\n', &mut buf).await {
                if n == 0 {
                    break;
                }
                broadcaster.broadcast(
                    EVENT_SHELL_OUTPUT,
                    &project_id,
                    ShellOutputPayload {
                        id: id.clone(),
                        stream: stream.to_string(),
                        data: String::from_utf8_lossy(&buf).to_string(),
                    },
                );
                buf.clear();
            }
        })
    }
}

fn spawn_shell(command: &str, working_dir: &Path) -> std::io::Result<Child> {
    #[cfg(unix)]
    let (shell, flag) = ("sh", "-c");

    #[cfg(windows)]
    let (shell, flag) = ("cmd", "/C");

    let mut cmd = Command::new(shell);
    cmd.arg(flag)
        .arg(command)
        .current_dir(working_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    #[cfg(unix)]
    cmd.process_group(0);

    cmd.spawn()
}

/// SIGKILL the command's process group (its pgid equals the shell's pid)
#[cfg(unix)]
fn kill_process_group(pid: Option<u32>, command_id: &str) {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let Some(pid) = pid else {
        return;
    };
    if let Err(e) = killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
        log::debug!(
            "[ShellService] Failed to kill process group of {}: {}",
            command_id,
            e
        );
    }
}
