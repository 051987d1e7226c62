//! Ralph Loop routes
//!
//! Start, inspect and control worker/reviewer loops of a project.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};

use super::SuccessResponse;
use crate::ralph_loop::{RalphLoopState, StartRalphLoopInput};
use crate::server::error::{ApiError, ApiResult, JsonBody};
use crate::server::ServerAppState;

pub fn router() -> Router<ServerAppState> {
    Router::new()
        .route("/api/projects/:id/ralph-loop", get(list_loops))
        .route("/api/projects/:id/ralph-loop/start", post(start_loop))
        .route(
            "/api/projects/:id/ralph-loop/:task_id",
            get(get_loop).delete(delete_loop),
        )
        .route("/api/projects/:id/ralph-loop/:task_id/stop", post(stop_loop))
        .route("/api/projects/:id/ralph-loop/:task_id/pause", post(pause_loop))
        .route(
            "/api/projects/:id/ralph-loop/:task_id/resume",
            post(resume_loop),
        )
}

async fn list_loops(
    State(state): State<ServerAppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<RalphLoopState>>> {
    state.project(&id)?;
    Ok(Json(state.ralph_loops.list(&id)?))
}

async fn start_loop(
    State(state): State<ServerAppState>,
    Path(id): Path<String>,
    JsonBody(input): JsonBody<StartRalphLoopInput>,
) -> ApiResult<(StatusCode, Json<RalphLoopState>)> {
    let project = state.project(&id)?;

    if state.agent_manager.is_active(&id) {
        return Err(ApiError::Conflict(
            "The project's agent is busy; stop it before starting a Ralph loop".to_string(),
        ));
    }

    let loop_state = state.ralph_loops.start(&project, input)?;
    Ok((StatusCode::CREATED, Json(loop_state)))
}

async fn get_loop(
    State(state): State<ServerAppState>,
    Path((id, task_id)): Path<(String, String)>,
) -> ApiResult<Json<RalphLoopState>> {
    state.project(&id)?;
    Ok(Json(state.ralph_loops.get(&id, &task_id)?))
}

async fn delete_loop(
    State(state): State<ServerAppState>,
    Path((id, task_id)): Path<(String, String)>,
) -> ApiResult<Json<SuccessResponse>> {
    state.project(&id)?;
    state.ralph_loops.delete(&id, &task_id)?;
    Ok(SuccessResponse::ok())
}

async fn stop_loop(
    State(state): State<ServerAppState>,
    Path((id, task_id)): Path<(String, String)>,
) -> ApiResult<Json<RalphLoopState>> {
    state.project(&id)?;
    Ok(Json(state.ralph_loops.stop(&id, &task_id)?))
}

async fn pause_loop(
    State(state): State<ServerAppState>,
    Path((id, task_id)): Path<(String, String)>,
) -> ApiResult<Json<RalphLoopState>> {
    state.project(&id)?;
    Ok(Json(state.ralph_loops.pause(&id, &task_id)?))
}

async fn resume_loop(
    State(state): State<ServerAppState>,
    Path((id, task_id)): Path<(String, String)>,
) -> ApiResult<Json<RalphLoopState>> {
    let project = state.project(&id)?;
    if state.agent_manager.is_active(&id) {
        return Err(ApiError::Conflict(
            "The project's agent is busy; stop it before resuming a Ralph loop".to_string(),
        ));
    }
    Ok(Json(state.ralph_loops.resume(&project, &task_id)?))
}
