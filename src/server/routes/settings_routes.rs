//! Settings routes

use axum::{extract::State, routing::get, Json, Router};

use crate::events::EVENT_SETTINGS_UPDATED;
use crate::file_storage::settings;
use crate::models::settings::PartialSettings;
use crate::models::Settings;
use crate::server::error::{ApiResult, JsonBody};
use crate::server::ServerAppState;

pub fn router() -> Router<ServerAppState> {
    Router::new().route("/api/settings", get(get_settings).put(update_settings))
}

async fn get_settings(State(state): State<ServerAppState>) -> Json<Settings> {
    Json(settings::load_settings(&state.data_dir))
}

async fn update_settings(
    State(state): State<ServerAppState>,
    JsonBody(patch): JsonBody<PartialSettings>,
) -> ApiResult<Json<Settings>> {
    let updated = settings::update_settings(&state.data_dir, &patch)?;
    state
        .broadcaster
        .broadcast_global(EVENT_SETTINGS_UPDATED, &updated);
    Ok(Json(updated))
}
