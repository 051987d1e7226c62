//! Shell command routes

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;

use crate::server::error::{ApiError, ApiResult, JsonBody};
use crate::server::ServerAppState;
use crate::shell::ShellCommandInfo;
use crate::utils::as_path;

pub fn router() -> Router<ServerAppState> {
    Router::new()
        .route(
            "/api/projects/:id/shell",
            get(list_commands).post(run_command),
        )
        .route("/api/projects/:id/shell/:command_id/kill", post(kill_command))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunCommandRequest {
    pub command: String,
    pub timeout_secs: Option<u64>,
}

async fn run_command(
    State(state): State<ServerAppState>,
    Path(id): Path<String>,
    JsonBody(request): JsonBody<RunCommandRequest>,
) -> ApiResult<(StatusCode, Json<ShellCommandInfo>)> {
    let project = state.project(&id)?;
    let info = state.shell.run(
        &id,
        as_path(&project.path),
        &request.command,
        request.timeout_secs,
    )?;
    Ok((StatusCode::ACCEPTED, Json(info)))
}

async fn list_commands(
    State(state): State<ServerAppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<ShellCommandInfo>>> {
    state.project(&id)?;
    Ok(Json(state.shell.list(&id)))
}

async fn kill_command(
    State(state): State<ServerAppState>,
    Path((id, command_id)): Path<(String, String)>,
) -> ApiResult<Json<serde_json::Value>> {
    state.project(&id)?;

    // Commands of other projects are invisible here
    if !state.shell.list(&id).iter().any(|c| c.id == command_id) {
        return Err(ApiError::NotFound(format!(
            "No running command: {}",
            command_id
        )));
    }

    let killed = state.shell.kill(&command_id);
    Ok(Json(json!({ "killed": killed })))
}
