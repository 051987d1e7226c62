//! Ralph loop state storage
//!
//! Layout per project:
//! `{data_dir}/projects/{project_id}/ralph-loops/{task_id}/state.json`
//! `{data_dir}/projects/{project_id}/ralph-loops/{task_id}/iteration-{n}/worker.json`
//! `{data_dir}/projects/{project_id}/ralph-loops/{task_id}/iteration-{n}/reviewer.json`

use super::{project_data_dir, read_json, remove_dir_if_exists, write_json, FileResult};
use crate::ralph_loop::{RalphLoopState, RalphLoopStatus, ReviewerFeedback, WorkerSummary};
use std::fs;
use std::path::{Path, PathBuf};

pub fn get_loops_dir(data_dir: &Path, project_id: &str) -> PathBuf {
    project_data_dir(data_dir, project_id).join("ralph-loops")
}

fn get_loop_dir(data_dir: &Path, project_id: &str, task_id: &str) -> PathBuf {
    get_loops_dir(data_dir, project_id).join(task_id)
}

fn get_iteration_dir(data_dir: &Path, project_id: &str, task_id: &str, iteration: u32) -> PathBuf {
    get_loop_dir(data_dir, project_id, task_id).join(format!("iteration-{}", iteration))
}

pub fn validate_task_id(task_id: &str) -> FileResult<()> {
    if task_id.is_empty()
        || !task_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(format!("Invalid task ID: {}", task_id));
    }
    Ok(())
}

/// Persist the full loop state
pub fn save_loop_state(data_dir: &Path, state: &RalphLoopState) -> FileResult<()> {
    validate_task_id(&state.task_id)?;
    let path = get_loop_dir(data_dir, &state.project_id, &state.task_id).join("state.json");
    write_json(&path, state)
}

/// Load a loop state, `None` if it was never persisted
pub fn load_loop_state(
    data_dir: &Path,
    project_id: &str,
    task_id: &str,
) -> FileResult<Option<RalphLoopState>> {
    validate_task_id(task_id)?;
    let path = get_loop_dir(data_dir, project_id, task_id).join("state.json");
    if !path.exists() {
        return Ok(None);
    }
    read_json(&path).map(Some)
}

/// List all loops of a project, newest first. Unreadable states are skipped.
pub fn list_loop_states(data_dir: &Path, project_id: &str) -> FileResult<Vec<RalphLoopState>> {
    let loops_dir = get_loops_dir(data_dir, project_id);
    if !loops_dir.exists() {
        return Ok(Vec::new());
    }

    let entries = fs::read_dir(&loops_dir)
        .map_err(|e| format!("Failed to read loops directory {:?}: {}", loops_dir, e))?;

    let mut states = Vec::new();
    for entry in entries.flatten() {
        let state_path = entry.path().join("state.json");
        if !state_path.exists() {
            continue;
        }
        match read_json::<RalphLoopState>(&state_path) {
            Ok(state) => states.push(state),
            Err(e) => log::warn!("[RalphLoop] Skipping unreadable loop state: {}", e),
        }
    }

    states.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(states)
}

pub fn save_worker_summary(
    data_dir: &Path,
    project_id: &str,
    task_id: &str,
    summary: &WorkerSummary,
) -> FileResult<()> {
    validate_task_id(task_id)?;
    let path =
        get_iteration_dir(data_dir, project_id, task_id, summary.iteration).join("worker.json");
    write_json(&path, summary)
}

pub fn save_reviewer_feedback(
    data_dir: &Path,
    project_id: &str,
    task_id: &str,
    feedback: &ReviewerFeedback,
) -> FileResult<()> {
    validate_task_id(task_id)?;
    let path =
        get_iteration_dir(data_dir, project_id, task_id, feedback.iteration).join("reviewer.json");
    write_json(&path, feedback)
}

/// Remove a loop and all of its iteration artifacts
pub fn delete_loop(data_dir: &Path, project_id: &str, task_id: &str) -> FileResult<()> {
    validate_task_id(task_id)?;
    let loop_dir = get_loop_dir(data_dir, project_id, task_id);
    if !loop_dir.exists() {
        return Err(format!("Ralph loop not found: {}", task_id));
    }
    remove_dir_if_exists(&loop_dir)
}

/// Mark every loop persisted with a running status as interrupted.
///
/// Called once at startup: no process survives a server restart, so those
/// loops can never report back. Returns the number of loops updated.
pub fn mark_interrupted_loops(data_dir: &Path) -> FileResult<usize> {
    let projects_dir = data_dir.join("projects");
    if !projects_dir.exists() {
        return Ok(0);
    }

    let entries = fs::read_dir(&projects_dir)
        .map_err(|e| format!("Failed to read projects directory: {}", e))?;

    let mut count = 0;
    for entry in entries.flatten() {
        let project_id = entry.file_name().to_string_lossy().to_string();
        for mut state in list_loop_states(data_dir, &project_id)? {
            if !state.status.is_running() {
                continue;
            }
            log::info!(
                "[RalphLoop] Marking loop {} ({}) as interrupted",
                state.task_id,
                state.status
            );
            state.set_status(RalphLoopStatus::Interrupted);
            state.error = Some("Server stopped while the loop was running".to_string());
            save_loop_state(data_dir, &state)?;
            count += 1;
        }
    }

    Ok(count)
}
