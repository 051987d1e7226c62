//! Interactive agent routes

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;

use crate::agents::{AgentStatusInfo, ResourceStatus, SendMessageResult};
use crate::server::error::{ApiError, ApiResult, JsonBody};
use crate::server::ServerAppState;

pub fn router() -> Router<ServerAppState> {
    Router::new()
        .route("/api/projects/:id/agent/message", post(send_message))
        .route("/api/projects/:id/agent/stop", post(stop_agent))
        .route("/api/projects/:id/agent/status", get(agent_status))
        .route("/api/agents/resources", get(resources))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    pub message: String,
    pub conversation_id: Option<String>,
}

async fn send_message(
    State(state): State<ServerAppState>,
    Path(id): Path<String>,
    JsonBody(request): JsonBody<SendMessageRequest>,
) -> ApiResult<Json<SendMessageResult>> {
    let project = state.project(&id)?;

    if state.ralph_loops.active_task(&id).is_some() {
        return Err(ApiError::Conflict(
            "A Ralph loop is running for this project".to_string(),
        ));
    }

    let result = state.agent_manager.send_message(
        &project,
        request.conversation_id.as_deref(),
        &request.message,
    )?;
    Ok(Json(result))
}

async fn stop_agent(
    State(state): State<ServerAppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    state.project(&id)?;
    let stopped = state.agent_manager.stop(&id);
    Ok(Json(json!({ "stopped": stopped })))
}

async fn agent_status(
    State(state): State<ServerAppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<AgentStatusInfo>> {
    state.project(&id)?;
    Ok(Json(state.agent_manager.status(&id)))
}

async fn resources(State(state): State<ServerAppState>) -> Json<ResourceStatus> {
    Json(state.agent_manager.resource_status())
}
