//! Git routes
//!
//! Each handler resolves the project and runs one operation against its
//! repository through the shared `GitState` cache.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;

use super::{invalid, SuccessResponse};
use crate::git::{BranchInfo, CommitInfo, DiffInfo, FilePatch, GitManager, GitStatus};
use crate::server::error::{ApiError, ApiResult, JsonBody};
use crate::server::ServerAppState;

const DEFAULT_LOG_LIMIT: usize = 50;
const MAX_LOG_LIMIT: usize = 1000;

pub fn router() -> Router<ServerAppState> {
    Router::new()
        .route("/api/projects/:id/git/is-repository", get(is_repository))
        .route("/api/projects/:id/git/init", post(init_repository))
        .route("/api/projects/:id/git/status", get(status))
        .route(
            "/api/projects/:id/git/branches",
            get(list_branches).post(create_branch),
        )
        .route("/api/projects/:id/git/checkout", post(checkout))
        .route("/api/projects/:id/git/log", get(log_history))
        .route("/api/projects/:id/git/diff", get(working_diff))
        .route("/api/projects/:id/git/file-diff", get(file_diff))
        .route("/api/projects/:id/git/stage", post(stage))
        .route("/api/projects/:id/git/unstage", post(unstage))
        .route("/api/projects/:id/git/discard", post(discard))
        .route("/api/projects/:id/git/commit", post(commit))
        .route("/api/projects/:id/git/push", post(push))
}

#[derive(Debug, Deserialize)]
pub struct LogQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct FileDiffQuery {
    pub path: String,
    #[serde(default)]
    pub staged: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageRequest {
    #[serde(default)]
    pub paths: Vec<String>,
    #[serde(default)]
    pub all: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PathsRequest {
    pub paths: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitRequest {
    pub message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBranchRequest {
    pub name: String,
    #[serde(default)]
    pub checkout: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    pub branch: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushRequest {
    pub branch: Option<String>,
}

/// Run `f` against the repository of project `id`
fn with_repo<F, R>(state: &ServerAppState, id: &str, f: F) -> ApiResult<R>
where
    F: FnOnce(&GitManager) -> Result<R, git2::Error>,
{
    let project = state.project(id)?;
    invalid(state.git_state.with_manager(&project.path, f))
}

fn require_paths(paths: &[String]) -> ApiResult<()> {
    if paths.is_empty() {
        return Err(ApiError::BadRequest("At least one path is required".to_string()));
    }
    Ok(())
}

async fn is_repository(
    State(state): State<ServerAppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let project = state.project(&id)?;
    let is_repository = GitManager::is_repository(&project.path);
    Ok(Json(json!({ "isRepository": is_repository })))
}

async fn init_repository(
    State(state): State<ServerAppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<SuccessResponse>> {
    let project = state.project(&id)?;
    invalid(state.git_state.init(&project.path))?;
    log::info!("[Git] Initialized repository at {}", project.path);
    Ok(SuccessResponse::ok())
}

async fn status(
    State(state): State<ServerAppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<GitStatus>> {
    Ok(Json(with_repo(&state, &id, |git| git.get_status())?))
}

async fn list_branches(
    State(state): State<ServerAppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<BranchInfo>>> {
    Ok(Json(with_repo(&state, &id, |git| git.list_branches())?))
}

async fn create_branch(
    State(state): State<ServerAppState>,
    Path(id): Path<String>,
    JsonBody(request): JsonBody<CreateBranchRequest>,
) -> ApiResult<Json<BranchInfo>> {
    let branch = with_repo(&state, &id, |git| {
        git.create_branch(&request.name, request.checkout)
    })?;
    Ok(Json(branch))
}

async fn checkout(
    State(state): State<ServerAppState>,
    Path(id): Path<String>,
    JsonBody(request): JsonBody<CheckoutRequest>,
) -> ApiResult<Json<SuccessResponse>> {
    with_repo(&state, &id, |git| git.checkout_branch(&request.branch))?;
    Ok(SuccessResponse::ok())
}

async fn log_history(
    State(state): State<ServerAppState>,
    Path(id): Path<String>,
    Query(query): Query<LogQuery>,
) -> ApiResult<Json<Vec<CommitInfo>>> {
    let limit = query.limit.unwrap_or(DEFAULT_LOG_LIMIT).clamp(1, MAX_LOG_LIMIT);
    Ok(Json(with_repo(&state, &id, |git| {
        git.get_commit_history(limit)
    })?))
}

async fn working_diff(
    State(state): State<ServerAppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<DiffInfo>> {
    Ok(Json(with_repo(&state, &id, |git| git.get_working_diff())?))
}

async fn file_diff(
    State(state): State<ServerAppState>,
    Path(id): Path<String>,
    Query(query): Query<FileDiffQuery>,
) -> ApiResult<Json<FilePatch>> {
    Ok(Json(with_repo(&state, &id, |git| {
        git.get_file_diff(&query.path, query.staged)
    })?))
}

async fn stage(
    State(state): State<ServerAppState>,
    Path(id): Path<String>,
    JsonBody(request): JsonBody<StageRequest>,
) -> ApiResult<Json<SuccessResponse>> {
    if request.all {
        with_repo(&state, &id, |git| git.stage_all())?;
    } else {
        require_paths(&request.paths)?;
        with_repo(&state, &id, |git| git.stage_files(&request.paths))?;
    }
    Ok(SuccessResponse::ok())
}

async fn unstage(
    State(state): State<ServerAppState>,
    Path(id): Path<String>,
    JsonBody(request): JsonBody<PathsRequest>,
) -> ApiResult<Json<SuccessResponse>> {
    require_paths(&request.paths)?;
    with_repo(&state, &id, |git| git.unstage_files(&request.paths))?;
    Ok(SuccessResponse::ok())
}

async fn discard(
    State(state): State<ServerAppState>,
    Path(id): Path<String>,
    JsonBody(request): JsonBody<PathsRequest>,
) -> ApiResult<Json<SuccessResponse>> {
    require_paths(&request.paths)?;
    with_repo(&state, &id, |git| git.discard_changes(&request.paths))?;
    Ok(SuccessResponse::ok())
}

async fn commit(
    State(state): State<ServerAppState>,
    Path(id): Path<String>,
    JsonBody(request): JsonBody<CommitRequest>,
) -> ApiResult<Json<CommitInfo>> {
    let commit = with_repo(&state, &id, |git| git.create_commit(&request.message))?;
    log::info!("[Git] Committed {} in project {}", commit.short_id, id);
    Ok(Json(commit))
}

/// Pushing talks to the network, so it runs off the async workers
async fn push(
    State(state): State<ServerAppState>,
    Path(id): Path<String>,
    body: Option<JsonBody<PushRequest>>,
) -> ApiResult<Json<SuccessResponse>> {
    let project = state.project(&id)?;
    let request = body.map(|JsonBody(b)| b).unwrap_or_default();
    let git_state = Arc::clone(&state.git_state);

    let result = tokio::task::spawn_blocking(move || {
        git_state.with_manager(&project.path, |git| {
            git.push_branch(request.branch.as_deref())
        })
    })
    .await
    .map_err(|e| ApiError::Internal(format!("Push task failed: {}", e)))?;

    invalid(result)?;
    Ok(SuccessResponse::ok())
}
