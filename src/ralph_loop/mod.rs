//! Ralph Loop - worker/reviewer orchestration
//!
//! The loop runs OUTSIDE the agent:
//! - Each phase spawns a FRESH agent process (clean context)
//! - The worker changes the project, the reviewer judges the result
//! - A rejection feeds the reviewer's feedback into the next worker prompt
//! - The loop ends on approval, after `max_turns` iterations, or on failure
//!
//! State is persisted after every phase, so a paused loop can be resumed
//! from disk, even after a restart.

mod decision;
mod prompts;
mod types;

pub use decision::{extract_balanced_objects, extract_json_blocks, parse_reviewer_decision};
pub use prompts::{build_reviewer_prompt, build_worker_prompt};
pub use types::*;

use crate::agents::{
    AgentRunOutput, AgentRunRequest, AgentRunner, CancelHandle, EventCallback, StreamEvent,
};
use crate::events::{
    EventBroadcaster, RalphLoopCompletePayload, RalphLoopErrorPayload, RalphLoopIterationPayload,
    RalphLoopOutputPayload, RalphLoopReviewerCompletePayload, RalphLoopStatusPayload,
    RalphLoopWorkerCompletePayload, EVENT_RALPH_COMPLETE, EVENT_RALPH_ERROR,
    EVENT_RALPH_ITERATION_START, EVENT_RALPH_OUTPUT, EVENT_RALPH_REVIEWER_COMPLETE,
    EVENT_RALPH_STATUS, EVENT_RALPH_WORKER_COMPLETE,
};
use crate::file_storage::projects::Project;
use crate::file_storage::{ralph_loops, settings};
use crate::models::settings::MAX_RALPH_TURNS_LIMIT;
use crate::models::Settings;
use crate::utils::{generate_id, lock_mutex_recover};
use chrono::Utc;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RalphLoopError {
    #[error("{0}")]
    InvalidConfig(String),
    #[error("A Ralph loop is already active for project {0}")]
    AlreadyActive(String),
    #[error("Ralph loop not found: {0}")]
    NotFound(String),
    /// Task IDs double as file names, so only `[A-Za-z0-9_-]` is accepted
    #[error("{0}")]
    InvalidId(String),
    /// The requested transition is not possible from the current status
    #[error("{0}")]
    InvalidState(String),
    #[error("{0}")]
    Storage(String),
}

fn check_task_id(task_id: &str) -> Result<(), RalphLoopError> {
    ralph_loops::validate_task_id(task_id).map_err(RalphLoopError::InvalidId)
}

/// Control flags of a loop that currently owns a background task
#[derive(Clone)]
struct LoopControl {
    task_id: String,
    cancel: CancelHandle,
    pause_requested: Arc<AtomicBool>,
    stop_requested: Arc<AtomicBool>,
}

impl LoopControl {
    fn new(task_id: &str) -> Self {
        Self {
            task_id: task_id.to_string(),
            cancel: CancelHandle::new(),
            pause_requested: Arc::new(AtomicBool::new(false)),
            stop_requested: Arc::new(AtomicBool::new(false)),
        }
    }
}

/// How a phase ended
enum PhaseOutcome {
    Continue,
    Finished,
}

/// Ralph loop service: owns every active loop, keyed by project ID
pub struct RalphLoopService {
    data_dir: PathBuf,
    runner: Arc<dyn AgentRunner>,
    broadcaster: Arc<EventBroadcaster>,
    active: Mutex<HashMap<String, LoopControl>>,
}

impl RalphLoopService {
    pub fn new(
        data_dir: PathBuf,
        runner: Arc<dyn AgentRunner>,
        broadcaster: Arc<EventBroadcaster>,
    ) -> Self {
        Self {
            data_dir,
            runner,
            broadcaster,
            active: Mutex::new(HashMap::new()),
        }
    }

    /// Resolve and validate a loop configuration against the user settings
    pub fn resolve_config(
        input: &StartRalphLoopInput,
        settings: &Settings,
    ) -> Result<RalphLoopConfig, RalphLoopError> {
        let task_description = input.task_description.trim();
        if task_description.is_empty() {
            return Err(RalphLoopError::InvalidConfig(
                "Task description cannot be empty".to_string(),
            ));
        }

        let max_turns = input
            .max_turns
            .unwrap_or(settings.ralph_loop.default_max_turns);
        if !(1..=MAX_RALPH_TURNS_LIMIT).contains(&max_turns) {
            return Err(RalphLoopError::InvalidConfig(format!(
                "maxTurns must be between 1 and {}",
                MAX_RALPH_TURNS_LIMIT
            )));
        }

        let pick_model = |requested: &Option<String>, default: &Option<String>| {
            requested
                .as_ref()
                .map(|m| m.trim().to_string())
                .filter(|m| !m.is_empty())
                .or_else(|| default.clone())
        };

        Ok(RalphLoopConfig {
            max_turns,
            worker_model: pick_model(&input.worker_model, &settings.ralph_loop.worker_model),
            reviewer_model: pick_model(&input.reviewer_model, &settings.ralph_loop.reviewer_model),
            task_description: task_description.to_string(),
        })
    }

    /// Start a new loop for the project in the background
    pub fn start(
        self: &Arc<Self>,
        project: &Project,
        input: StartRalphLoopInput,
    ) -> Result<RalphLoopState, RalphLoopError> {
        let settings = settings::load_settings(&self.data_dir);
        let config = Self::resolve_config(&input, &settings)?;

        let mut active = lock_mutex_recover(&self.active);
        if active.contains_key(&project.id) {
            return Err(RalphLoopError::AlreadyActive(project.id.clone()));
        }

        let state = RalphLoopState::new(generate_id("task"), project.id.clone(), config);
        ralph_loops::save_loop_state(&self.data_dir, &state).map_err(RalphLoopError::Storage)?;

        log::info!(
            "[RalphLoop] Starting loop {} for project {} (max turns: {})",
            state.task_id,
            project.id,
            state.config.max_turns
        );

        let control = LoopControl::new(&state.task_id);
        active.insert(project.id.clone(), control.clone());
        drop(active);

        self.spawn_loop(state.clone(), PathBuf::from(&project.path), control);
        Ok(state)
    }

    fn spawn_loop(
        self: &Arc<Self>,
        state: RalphLoopState,
        working_dir: PathBuf,
        control: LoopControl,
    ) {
        let service = Arc::clone(self);
        tokio::spawn(async move {
            service.run_loop(state, working_dir, control).await;
        });
    }

    /// Ask the loop to pause at the next phase boundary
    pub fn pause(
        &self,
        project_id: &str,
        task_id: &str,
    ) -> Result<RalphLoopState, RalphLoopError> {
        check_task_id(task_id)?;
        let active = lock_mutex_recover(&self.active);
        match active.get(project_id) {
            Some(control) if control.task_id == task_id => {
                log::info!("[RalphLoop] Pause requested for loop {}", task_id);
                control.pause_requested.store(true, Ordering::SeqCst);
            }
            _ => {
                return Err(RalphLoopError::InvalidState(format!(
                    "Ralph loop {} is not running",
                    task_id
                )))
            }
        }
        drop(active);
        self.get(project_id, task_id)
    }

    /// Continue a paused (or interrupted) loop from its persisted phase
    pub fn resume(
        self: &Arc<Self>,
        project: &Project,
        task_id: &str,
    ) -> Result<RalphLoopState, RalphLoopError> {
        check_task_id(task_id)?;
        let mut active = lock_mutex_recover(&self.active);
        if let Some(control) = active.get(&project.id) {
            return Err(if control.task_id == task_id {
                RalphLoopError::InvalidState(format!("Ralph loop {} is already running", task_id))
            } else {
                RalphLoopError::AlreadyActive(project.id.clone())
            });
        }

        let state = self.get(&project.id, task_id)?;
        if !matches!(
            state.status,
            RalphLoopStatus::Paused | RalphLoopStatus::Interrupted
        ) {
            return Err(RalphLoopError::InvalidState(format!(
                "Ralph loop {} cannot be resumed from status {}",
                task_id, state.status
            )));
        }

        log::info!(
            "[RalphLoop] Resuming loop {} at iteration {}",
            task_id,
            state.current_iteration
        );

        let control = LoopControl::new(task_id);
        active.insert(project.id.clone(), control.clone());
        drop(active);

        self.spawn_loop(state.clone(), PathBuf::from(&project.path), control);
        Ok(state)
    }

    /// Stop a loop. A running process is killed; a paused loop is marked
    /// stopped directly.
    pub fn stop(
        &self,
        project_id: &str,
        task_id: &str,
    ) -> Result<RalphLoopState, RalphLoopError> {
        check_task_id(task_id)?;
        let signalled = lock_mutex_recover(&self.active)
            .get(project_id)
            .filter(|c| c.task_id == task_id)
            .map(|control| {
                log::info!("[RalphLoop] Stopping loop {}", task_id);
                control.stop_requested.store(true, Ordering::SeqCst);
                control.cancel.cancel();
            })
            .is_some();
        if signalled {
            return self.get(project_id, task_id);
        }

        let mut state = self.get(project_id, task_id)?;
        if state.status.is_terminal() && state.status != RalphLoopStatus::Interrupted {
            return Err(RalphLoopError::InvalidState(format!(
                "Ralph loop {} already finished with status {}",
                task_id, state.status
            )));
        }

        state.set_status(RalphLoopStatus::Stopped);
        ralph_loops::save_loop_state(&self.data_dir, &state).map_err(RalphLoopError::Storage)?;
        self.emit_status(&state);
        self.emit_complete(&state);
        Ok(state)
    }

    pub fn get(&self, project_id: &str, task_id: &str) -> Result<RalphLoopState, RalphLoopError> {
        check_task_id(task_id)?;
        ralph_loops::load_loop_state(&self.data_dir, project_id, task_id)
            .map_err(RalphLoopError::Storage)?
            .ok_or_else(|| RalphLoopError::NotFound(task_id.to_string()))
    }

    pub fn list(&self, project_id: &str) -> Result<Vec<RalphLoopState>, RalphLoopError> {
        ralph_loops::list_loop_states(&self.data_dir, project_id).map_err(RalphLoopError::Storage)
    }

    /// Delete a loop and its artifacts. Refused while the loop is active.
    pub fn delete(&self, project_id: &str, task_id: &str) -> Result<(), RalphLoopError> {
        check_task_id(task_id)?;
        if self.active_task(project_id).as_deref() == Some(task_id) {
            return Err(RalphLoopError::InvalidState(format!(
                "Ralph loop {} is active; stop it before deleting",
                task_id
            )));
        }
        self.get(project_id, task_id)?;
        ralph_loops::delete_loop(&self.data_dir, project_id, task_id)
            .map_err(RalphLoopError::Storage)
    }

    /// Task ID of the project's active loop, if any
    pub fn active_task(&self, project_id: &str) -> Option<String> {
        lock_mutex_recover(&self.active)
            .get(project_id)
            .map(|c| c.task_id.clone())
    }

    /// Stop every active loop (shutdown). Returns how many were signalled.
    pub fn stop_all(&self) -> usize {
        let active = lock_mutex_recover(&self.active);
        for control in active.values() {
            control.stop_requested.store(true, Ordering::SeqCst);
            control.cancel.cancel();
        }
        if !active.is_empty() {
            log::info!("[RalphLoop] Stopping {} active loop(s)", active.len());
        }
        active.len()
    }

    async fn run_loop(
        self: Arc<Self>,
        mut state: RalphLoopState,
        working_dir: PathBuf,
        control: LoopControl,
    ) {
        loop {
            if control.stop_requested.load(Ordering::SeqCst) {
                self.finish(&mut state, RalphLoopStatus::Stopped, None, None);
                break;
            }
            if control.pause_requested.load(Ordering::SeqCst) {
                log::info!(
                    "[RalphLoop] Loop {} paused at iteration {}",
                    state.task_id,
                    state.current_iteration
                );
                state.set_status(RalphLoopStatus::Paused);
                self.persist(&state);
                self.emit_status(&state);
                break;
            }

            let (iteration, phase) = state.next_phase();
            let outcome = match phase {
                LoopPhase::Worker if iteration > state.config.max_turns => {
                    log::info!(
                        "[RalphLoop] Loop {} reached max turns ({})",
                        state.task_id,
                        state.config.max_turns
                    );
                    self.finish(
                        &mut state,
                        RalphLoopStatus::Completed,
                        Some(RalphLoopFinalStatus::MaxTurnsReached),
                        None,
                    );
                    PhaseOutcome::Finished
                }
                LoopPhase::Worker => {
                    self.run_worker(&mut state, iteration, &working_dir, &control)
                        .await
                }
                LoopPhase::Reviewer => {
                    self.run_reviewer(&mut state, iteration, &working_dir, &control)
                        .await
                }
            };

            if let PhaseOutcome::Finished = outcome {
                break;
            }
        }

        let mut active = lock_mutex_recover(&self.active);
        if active
            .get(&state.project_id)
            .is_some_and(|c| c.task_id == state.task_id)
        {
            active.remove(&state.project_id);
        }
    }

    async fn run_worker(
        &self,
        state: &mut RalphLoopState,
        iteration: u32,
        working_dir: &PathBuf,
        control: &LoopControl,
    ) -> PhaseOutcome {
        state.current_iteration = iteration;
        state.set_status(RalphLoopStatus::WorkerRunning);
        self.persist(state);
        self.emit_status(state);
        self.broadcaster.broadcast(
            EVENT_RALPH_ITERATION_START,
            &state.project_id,
            RalphLoopIterationPayload {
                task_id: state.task_id.clone(),
                iteration,
                max_turns: state.config.max_turns,
            },
        );

        let prompt = build_worker_prompt(
            &state.config.task_description,
            iteration,
            state.config.max_turns,
            state.last_feedback(),
        );
        let model = state.config.worker_model.clone();

        let output = match self
            .run_agent(state, "worker", iteration, prompt, model, working_dir, control)
            .await
        {
            Ok(output) => output,
            Err(outcome) => return outcome,
        };

        let summary = WorkerSummary {
            iteration,
            output: output.text,
            session_id: output.session_id,
            cost_usd: output.cost_usd,
            duration_ms: output.duration_ms,
            timestamp: Utc::now(),
        };
        if let Err(e) = ralph_loops::save_worker_summary(
            &self.data_dir,
            &state.project_id,
            &state.task_id,
            &summary,
        ) {
            log::warn!("[RalphLoop] Failed to save worker summary: {}", e);
        }

        state.worker_summaries.push(summary.clone());
        state.updated_at = Utc::now();
        self.persist(state);
        self.broadcaster.broadcast(
            EVENT_RALPH_WORKER_COMPLETE,
            &state.project_id,
            RalphLoopWorkerCompletePayload {
                task_id: state.task_id.clone(),
                summary,
            },
        );

        PhaseOutcome::Continue
    }

    async fn run_reviewer(
        &self,
        state: &mut RalphLoopState,
        iteration: u32,
        working_dir: &PathBuf,
        control: &LoopControl,
    ) -> PhaseOutcome {
        let worker = match state.worker_summary_for(iteration) {
            Some(worker) => worker.clone(),
            None => {
                let error = format!("No worker output recorded for iteration {}", iteration);
                self.finish(state, RalphLoopStatus::Failed, None, Some(error));
                return PhaseOutcome::Finished;
            }
        };

        state.set_status(RalphLoopStatus::ReviewerRunning);
        self.persist(state);
        self.emit_status(state);

        let prompt = build_reviewer_prompt(&state.config.task_description, &worker);
        let model = state.config.reviewer_model.clone();

        let output = match self
            .run_agent(state, "reviewer", iteration, prompt, model, working_dir, control)
            .await
        {
            Ok(output) => output,
            Err(outcome) => return outcome,
        };

        let feedback = match parse_reviewer_decision(&output.text, iteration) {
            Ok(feedback) => feedback,
            Err(e) => {
                self.finish(state, RalphLoopStatus::Failed, None, Some(e));
                return PhaseOutcome::Finished;
            }
        };

        if let Err(e) = ralph_loops::save_reviewer_feedback(
            &self.data_dir,
            &state.project_id,
            &state.task_id,
            &feedback,
        ) {
            log::warn!("[RalphLoop] Failed to save reviewer feedback: {}", e);
        }

        log::info!(
            "[RalphLoop] Loop {} iteration {}: reviewer decided {:?}",
            state.task_id,
            iteration,
            feedback.decision
        );

        let decision = feedback.decision;
        state.reviewer_feedback.push(feedback.clone());
        state.updated_at = Utc::now();
        self.persist(state);
        self.broadcaster.broadcast(
            EVENT_RALPH_REVIEWER_COMPLETE,
            &state.project_id,
            RalphLoopReviewerCompletePayload {
                task_id: state.task_id.clone(),
                feedback,
            },
        );

        match decision {
            ReviewDecision::Approve => {
                self.finish(
                    state,
                    RalphLoopStatus::Completed,
                    Some(RalphLoopFinalStatus::Approved),
                    None,
                );
                PhaseOutcome::Finished
            }
            ReviewDecision::Reject => PhaseOutcome::Continue,
        }
    }

    /// Run one agent phase. On failure or cancellation the loop is finished
    /// and the returned `Err` carries the outcome.
    #[allow(clippy::too_many_arguments)]
    async fn run_agent(
        &self,
        state: &mut RalphLoopState,
        role: &str,
        iteration: u32,
        prompt: String,
        model: Option<String>,
        working_dir: &PathBuf,
        control: &LoopControl,
    ) -> Result<AgentRunOutput, PhaseOutcome> {
        let settings = settings::load_settings(&self.data_dir);
        let request = AgentRunRequest {
            working_dir: working_dir.clone(),
            prompt,
            model,
            resume_session_id: None,
            append_system_prompt: Some(settings.append_system_prompt.clone())
                .filter(|p| !p.trim().is_empty()),
            allowed_tools: settings.claude_permissions.allowed_tools.clone(),
            disallowed_tools: settings.claude_permissions.disallowed_tools.clone(),
            skip_permissions: settings.claude_permissions.skip_permissions,
        };

        let on_event = self.output_sink(&state.project_id, &state.task_id, role, iteration);

        match self.runner.run(request, on_event, control.cancel.clone()).await {
            Ok(output) if output.cancelled || control.stop_requested.load(Ordering::SeqCst) => {
                self.finish(state, RalphLoopStatus::Stopped, None, None);
                Err(PhaseOutcome::Finished)
            }
            Ok(output) if output.succeeded() => Ok(output),
            Ok(output) => {
                let error = format!("{} failed: {}", role, output.failure_reason());
                self.finish(state, RalphLoopStatus::Failed, None, Some(error));
                Err(PhaseOutcome::Finished)
            }
            Err(e) => {
                let error = format!("{} failed to run: {}", role, e);
                self.finish(state, RalphLoopStatus::Failed, None, Some(error));
                Err(PhaseOutcome::Finished)
            }
        }
    }

    /// Forward agent output to clients as `ralph_loop:output`
    fn output_sink(
        &self,
        project_id: &str,
        task_id: &str,
        role: &str,
        iteration: u32,
    ) -> EventCallback {
        let broadcaster = Arc::clone(&self.broadcaster);
        let project_id = project_id.to_string();
        let task_id = task_id.to_string();
        let role = role.to_string();

        Arc::new(move |event: &StreamEvent| {
            let content = match event {
                StreamEvent::AssistantText { text } => text.clone(),
                StreamEvent::ToolUse { name, .. } => format!("[Using tool: {}]", name),
                _ => return,
            };
            broadcaster.broadcast(
                EVENT_RALPH_OUTPUT,
                &project_id,
                RalphLoopOutputPayload {
                    task_id: task_id.clone(),
                    iteration,
                    role: role.clone(),
                    content,
                },
            );
        })
    }

    /// Move the loop into a terminal status and announce it
    fn finish(
        &self,
        state: &mut RalphLoopState,
        status: RalphLoopStatus,
        final_status: Option<RalphLoopFinalStatus>,
        error: Option<String>,
    ) {
        state.set_status(status);
        state.final_status = final_status;
        state.error = error.clone();
        self.persist(state);
        self.emit_status(state);

        if let Some(error) = error {
            log::warn!("[RalphLoop] Loop {} failed: {}", state.task_id, error);
            self.broadcaster.broadcast(
                EVENT_RALPH_ERROR,
                &state.project_id,
                RalphLoopErrorPayload {
                    task_id: state.task_id.clone(),
                    error,
                },
            );
        } else {
            log::info!("[RalphLoop] Loop {} finished: {}", state.task_id, status);
        }

        self.emit_complete(state);
    }

    fn persist(&self, state: &RalphLoopState) {
        if let Err(e) = ralph_loops::save_loop_state(&self.data_dir, state) {
            log::error!("[RalphLoop] Failed to persist loop {}: {}", state.task_id, e);
        }
    }

    fn emit_status(&self, state: &RalphLoopState) {
        self.broadcaster.broadcast(
            EVENT_RALPH_STATUS,
            &state.project_id,
            RalphLoopStatusPayload {
                task_id: state.task_id.clone(),
                status: state.status,
                current_iteration: state.current_iteration,
            },
        );
    }

    fn emit_complete(&self, state: &RalphLoopState) {
        self.broadcaster.broadcast(
            EVENT_RALPH_COMPLETE,
            &state.project_id,
            RalphLoopCompletePayload {
                task_id: state.task_id.clone(),
                status: state.status,
                final_status: state.final_status,
                iterations: state.current_iteration,
            },
        );
    }
}
