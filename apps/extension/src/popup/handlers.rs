use axum::{extract::State, http::StatusCode, Json};
use serde::Deserialize;

use crate::errors::AppError;
use crate::popup::PopupView;
use crate::state::AppState;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiKeyRequest {
    pub api_key: String,
}

/// POST /api/popup/open
pub async fn handle_open_popup(State(state): State<AppState>) -> Json<PopupView> {
    Json(state.runtime.open_popup().await)
}

/// POST /api/popup/close
pub async fn handle_close_popup(State(state): State<AppState>) -> StatusCode {
    state.runtime.close_popup().await;
    StatusCode::NO_CONTENT
}

/// GET /api/popup
pub async fn handle_get_popup(State(state): State<AppState>) -> Result<Json<PopupView>, AppError> {
    Ok(Json(state.runtime.popup().await?.view()))
}

/// PUT /api/settings/api-key
pub async fn handle_save_api_key(
    State(state): State<AppState>,
    Json(req): Json<ApiKeyRequest>,
) -> Result<Json<PopupView>, AppError> {
    let popup = state.runtime.popup().await?;
    Ok(Json(popup.save_api_key(&req.api_key).await))
}
