//! HTTP error type shared by all route handlers
//!
//! Every handler returns `Result<_, ApiError>`; the response body is always
//! `{"error": "<message>"}`.

use crate::agents::AgentManagerError;
use crate::file_storage::settings::SettingsUpdateError;
use crate::files::FileBrowserError;
use crate::ralph_loop::RalphLoopError;
use crate::shell::ShellError;
use axum::{
    async_trait,
    extract::{FromRequest, Request},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::de::DeserializeOwned;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Internal(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            log::error!("[Api] {}", self);
        } else {
            log::debug!("[Api] {} {}", status.as_u16(), self);
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// `Json` extractor whose rejections (bad syntax, missing or unknown fields,
/// wrong content type) answer 400 with the usual error body
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonBody<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(JsonBody(value)),
            Err(rejection) => Err(ApiError::BadRequest(rejection.body_text())),
        }
    }
}

impl From<AgentManagerError> for ApiError {
    fn from(e: AgentManagerError) -> Self {
        match e {
            AgentManagerError::AlreadyActive(_) => ApiError::Conflict(e.to_string()),
            AgentManagerError::NotFound(_) => ApiError::NotFound(e.to_string()),
            AgentManagerError::EmptyMessage => ApiError::BadRequest(e.to_string()),
            AgentManagerError::Storage(_) => ApiError::Internal(e.to_string()),
        }
    }
}

impl From<RalphLoopError> for ApiError {
    fn from(e: RalphLoopError) -> Self {
        match e {
            RalphLoopError::InvalidConfig(_) | RalphLoopError::InvalidId(_) => {
                ApiError::BadRequest(e.to_string())
            }
            RalphLoopError::AlreadyActive(_) | RalphLoopError::InvalidState(_) => {
                ApiError::Conflict(e.to_string())
            }
            RalphLoopError::NotFound(_) => ApiError::NotFound(e.to_string()),
            RalphLoopError::Storage(_) => ApiError::Internal(e.to_string()),
        }
    }
}

impl From<ShellError> for ApiError {
    fn from(e: ShellError) -> Self {
        match e {
            ShellError::TooManyCommands(_) => ApiError::Conflict(e.to_string()),
            ShellError::Spawn(_) => ApiError::Internal(e.to_string()),
            ShellError::EmptyCommand
            | ShellError::InvalidTimeout
            | ShellError::MissingWorkingDir(_) => ApiError::BadRequest(e.to_string()),
        }
    }
}

impl From<FileBrowserError> for ApiError {
    fn from(e: FileBrowserError) -> Self {
        match e {
            FileBrowserError::NotFound(_) => ApiError::NotFound(e.to_string()),
            FileBrowserError::Io(_) => ApiError::Internal(e.to_string()),
            _ => ApiError::BadRequest(e.to_string()),
        }
    }
}

impl From<SettingsUpdateError> for ApiError {
    fn from(e: SettingsUpdateError) -> Self {
        match e {
            SettingsUpdateError::Invalid(_) => ApiError::BadRequest(e.to_string()),
            SettingsUpdateError::Storage(_) => ApiError::Internal(e.to_string()),
        }
    }
}
