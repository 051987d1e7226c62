//! Project registry routes

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;

use super::{invalid, storage, SuccessResponse};
use crate::events::EVENT_PROJECTS_UPDATED;
use crate::file_storage::projects::{self, CreateProjectInput, Project};
use crate::server::error::{ApiError, ApiResult, JsonBody};
use crate::server::ServerAppState;

pub fn router() -> Router<ServerAppState> {
    Router::new()
        .route("/api/projects", get(list_projects).post(create_project))
        .route(
            "/api/projects/:id",
            get(get_project).patch(rename_project).delete(delete_project),
        )
        .route("/api/projects/:id/favorite", post(toggle_favorite))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenameProjectRequest {
    pub name: String,
}

fn notify_projects_changed(state: &ServerAppState) {
    state
        .broadcaster
        .broadcast_global(EVENT_PROJECTS_UPDATED, json!({}));
}

async fn list_projects(State(state): State<ServerAppState>) -> ApiResult<Json<Vec<Project>>> {
    Ok(Json(storage(projects::list_projects(&state.data_dir))?))
}

async fn create_project(
    State(state): State<ServerAppState>,
    JsonBody(input): JsonBody<CreateProjectInput>,
) -> ApiResult<(StatusCode, Json<Project>)> {
    let project = invalid(projects::create_project(&state.data_dir, &input))?;
    log::info!("[Projects] Registered {} ({})", project.name, project.path);
    notify_projects_changed(&state);
    Ok((StatusCode::CREATED, Json(project)))
}

async fn get_project(
    State(state): State<ServerAppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Project>> {
    Ok(Json(state.project(&id)?))
}

async fn rename_project(
    State(state): State<ServerAppState>,
    Path(id): Path<String>,
    JsonBody(request): JsonBody<RenameProjectRequest>,
) -> ApiResult<Json<Project>> {
    state.project(&id)?;
    let project = invalid(projects::rename_project(&state.data_dir, &id, &request.name))?;
    notify_projects_changed(&state);
    Ok(Json(project))
}

async fn toggle_favorite(
    State(state): State<ServerAppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    state.project(&id)?;
    let is_favorite = storage(projects::toggle_project_favorite(&state.data_dir, &id))?;
    notify_projects_changed(&state);
    Ok(Json(json!({ "isFavorite": is_favorite })))
}

/// Unregister a project. Refused while its agent, a loop or a shell command runs.
async fn delete_project(
    State(state): State<ServerAppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<SuccessResponse>> {
    let project = state.project(&id)?;

    if state.agent_manager.is_active(&id) {
        return Err(ApiError::Conflict(
            "Stop the project's agent before deleting it".to_string(),
        ));
    }
    if state.ralph_loops.active_task(&id).is_some() {
        return Err(ApiError::Conflict(
            "Stop the project's Ralph loop before deleting it".to_string(),
        ));
    }
    if !state.shell.list(&id).is_empty() {
        return Err(ApiError::Conflict(
            "Shell commands are still running for this project".to_string(),
        ));
    }

    storage(projects::delete_project(&state.data_dir, &id))?;
    state.git_state.forget(&project.path);
    state.agent_manager.forget_project(&id);
    log::info!("[Projects] Deleted {}", id);
    notify_projects_changed(&state);
    Ok(SuccessResponse::ok())
}
