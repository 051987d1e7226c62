//! Project file browser routes
//!
//! All paths are relative to the project root; `files::resolve_in_project`
//! refuses anything that escapes it.

use std::path::PathBuf;

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;

use crate::files::{self, DirEntry, FileContent, SearchResult};
use crate::server::error::{ApiResult, JsonBody};
use crate::server::ServerAppState;
use crate::utils::as_path;

pub fn router() -> Router<ServerAppState> {
    Router::new()
        .route("/api/projects/:id/files", get(list_dir))
        .route(
            "/api/projects/:id/files/content",
            get(read_file).put(write_file),
        )
        .route("/api/projects/:id/files/search", get(search))
}

#[derive(Debug, Default, Deserialize)]
pub struct PathQuery {
    #[serde(default)]
    pub path: String,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub q: String,
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteFileRequest {
    pub content: String,
}

fn project_root(state: &ServerAppState, id: &str) -> ApiResult<PathBuf> {
    let project = state.project(id)?;
    Ok(as_path(&project.path).to_path_buf())
}

async fn list_dir(
    State(state): State<ServerAppState>,
    Path(id): Path<String>,
    Query(query): Query<PathQuery>,
) -> ApiResult<Json<Vec<DirEntry>>> {
    let root = project_root(&state, &id)?;
    Ok(Json(files::list_dir(&root, &query.path)?))
}

async fn read_file(
    State(state): State<ServerAppState>,
    Path(id): Path<String>,
    Query(query): Query<PathQuery>,
) -> ApiResult<Json<FileContent>> {
    let root = project_root(&state, &id)?;
    Ok(Json(files::read_file(&root, &query.path)?))
}

async fn write_file(
    State(state): State<ServerAppState>,
    Path(id): Path<String>,
    Query(query): Query<PathQuery>,
    JsonBody(request): JsonBody<WriteFileRequest>,
) -> ApiResult<Json<DirEntry>> {
    let root = project_root(&state, &id)?;
    let entry = files::write_file(&root, &query.path, &request.content)?;
    log::debug!("[Files] Wrote {} in project {}", entry.path, id);
    Ok(Json(entry))
}

async fn search(
    State(state): State<ServerAppState>,
    Path(id): Path<String>,
    Query(query): Query<SearchQuery>,
) -> ApiResult<Json<Vec<SearchResult>>> {
    let root = project_root(&state, &id)?;
    Ok(Json(files::search(&root, &query.q, query.limit)?))
}
