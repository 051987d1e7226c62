//! REST routes
//!
//! Routes are organized into focused sub-modules by domain:
//! - project_routes: project registry
//! - conversation_routes: conversation history
//! - agent_routes: interactive agent per project
//! - ralph_loop_routes: worker/reviewer loops
//! - git_routes: repository operations
//! - shell_routes: one-off shell commands
//! - file_routes: project file browser
//! - settings_routes: user settings

pub mod agent_routes;
pub mod conversation_routes;
pub mod file_routes;
pub mod git_routes;
pub mod project_routes;
pub mod ralph_loop_routes;
pub mod settings_routes;
pub mod shell_routes;

use axum::Router;
use serde::Serialize;

use super::error::{ApiError, ApiResult};
use super::ServerAppState;

/// All `/api` routes except health and version
pub fn api_router() -> Router<ServerAppState> {
    Router::new()
        .merge(project_routes::router())
        .merge(conversation_routes::router())
        .merge(agent_routes::router())
        .merge(ralph_loop_routes::router())
        .merge(git_routes::router())
        .merge(shell_routes::router())
        .merge(file_routes::router())
        .merge(settings_routes::router())
}

/// Body for endpoints that only report success
#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

impl SuccessResponse {
    pub fn ok() -> axum::Json<Self> {
        axum::Json(Self { success: true })
    }
}

/// Storage helpers report plain strings; anything failing there is a server error
pub fn storage<T>(result: Result<T, String>) -> ApiResult<T> {
    result.map_err(ApiError::Internal)
}

/// Input validation failures surfaced by storage helpers
pub fn invalid<T>(result: Result<T, String>) -> ApiResult<T> {
    result.map_err(ApiError::BadRequest)
}
