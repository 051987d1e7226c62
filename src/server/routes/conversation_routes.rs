//! Conversation history routes

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::Deserialize;

use super::{invalid, storage, SuccessResponse};
use crate::file_storage::conversations::{self, ConversationIndexEntry};
use crate::models::Conversation;
use crate::server::error::{ApiError, ApiResult, JsonBody};
use crate::server::ServerAppState;

pub fn router() -> Router<ServerAppState> {
    Router::new()
        .route(
            "/api/projects/:id/conversations",
            get(list_conversations).post(create_conversation),
        )
        .route(
            "/api/projects/:id/conversations/:cid",
            get(get_conversation)
                .patch(rename_conversation)
                .delete(delete_conversation),
        )
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateConversationRequest {
    pub title: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenameConversationRequest {
    pub title: String,
}

fn require_conversation(
    state: &ServerAppState,
    project_id: &str,
    conversation_id: &str,
) -> ApiResult<Conversation> {
    invalid(conversations::get_conversation(
        &state.data_dir,
        project_id,
        conversation_id,
    ))?
    .ok_or_else(|| ApiError::NotFound(format!("Conversation not found: {}", conversation_id)))
}

async fn list_conversations(
    State(state): State<ServerAppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<ConversationIndexEntry>>> {
    state.project(&id)?;
    Ok(Json(storage(conversations::list_conversations(
        &state.data_dir,
        &id,
    ))?))
}

async fn create_conversation(
    State(state): State<ServerAppState>,
    Path(id): Path<String>,
    body: Option<JsonBody<CreateConversationRequest>>,
) -> ApiResult<(StatusCode, Json<Conversation>)> {
    state.project(&id)?;
    let request = body.map(|JsonBody(b)| b).unwrap_or_default();
    let conversation = storage(conversations::create_conversation(
        &state.data_dir,
        &id,
        request.title.as_deref(),
    ))?;
    Ok((StatusCode::CREATED, Json(conversation)))
}

async fn get_conversation(
    State(state): State<ServerAppState>,
    Path((id, cid)): Path<(String, String)>,
) -> ApiResult<Json<Conversation>> {
    state.project(&id)?;
    Ok(Json(require_conversation(&state, &id, &cid)?))
}

async fn rename_conversation(
    State(state): State<ServerAppState>,
    Path((id, cid)): Path<(String, String)>,
    JsonBody(request): JsonBody<RenameConversationRequest>,
) -> ApiResult<Json<Conversation>> {
    state.project(&id)?;
    require_conversation(&state, &id, &cid)?;
    Ok(Json(invalid(conversations::rename_conversation(
        &state.data_dir,
        &id,
        &cid,
        &request.title,
    ))?))
}

async fn delete_conversation(
    State(state): State<ServerAppState>,
    Path((id, cid)): Path<(String, String)>,
) -> ApiResult<Json<SuccessResponse>> {
    state.project(&id)?;
    require_conversation(&state, &id, &cid)?;

    let status = state.agent_manager.status(&id);
    if status.status.is_active() && status.conversation_id.as_deref() == Some(cid.as_str()) {
        return Err(ApiError::Conflict(
            "The agent is working in this conversation".to_string(),
        ));
    }

    storage(conversations::delete_conversation(&state.data_dir, &id, &cid))?;
    Ok(SuccessResponse::ok())
}
