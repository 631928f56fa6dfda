use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;

use crate::errors::AppError;
use crate::messaging::TabId;
use crate::popup::PopupView;
use crate::runtime::TabInfo;
use crate::selection::PageEvent;
use crate::state::AppState;
use crate::storage::StoredText;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenTabRequest {
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub body_text: String,
}

#[derive(Deserialize)]
pub struct SelectTextRequest {
    pub text: String,
}

/// POST /api/tabs
pub async fn handle_open_tab(
    State(state): State<AppState>,
    Json(req): Json<OpenTabRequest>,
) -> Result<(StatusCode, Json<TabInfo>), AppError> {
    if req.url.trim().is_empty() {
        return Err(AppError::Validation("url must not be empty".to_string()));
    }
    let tab = state
        .runtime
        .open_tab(req.url, req.title, req.body_text)
        .await;
    Ok((StatusCode::CREATED, Json(tab)))
}

/// GET /api/tabs/:id
pub async fn handle_get_tab(
    State(state): State<AppState>,
    Path(id): Path<TabId>,
) -> Result<Json<TabInfo>, AppError> {
    Ok(Json(state.runtime.tab(id).await?))
}

/// DELETE /api/tabs/:id
pub async fn handle_close_tab(
    State(state): State<AppState>,
    Path(id): Path<TabId>,
) -> Result<StatusCode, AppError> {
    state.runtime.close_tab(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/tabs/:id/selection/start
pub async fn handle_start_selection(
    State(state): State<AppState>,
    Path(id): Path<TabId>,
) -> Result<Json<PopupView>, AppError> {
    let popup = state.runtime.popup().await?;
    let tab = state.runtime.active_tab(id).await?;
    Ok(Json(popup.start_selection(&tab).await))
}

/// PUT /api/tabs/:id/selection
pub async fn handle_select_text(
    State(state): State<AppState>,
    Path(id): Path<TabId>,
    Json(req): Json<SelectTextRequest>,
) -> Result<Json<TabInfo>, AppError> {
    Ok(Json(state.runtime.select_text(id, &req.text).await?))
}

/// POST /api/tabs/:id/events
pub async fn handle_page_event(
    State(state): State<AppState>,
    Path(id): Path<TabId>,
    Json(event): Json<PageEvent>,
) -> Result<StatusCode, AppError> {
    state.runtime.dispatch_event(id, event).await?;
    Ok(StatusCode::ACCEPTED)
}

/// GET /api/selection
pub async fn handle_get_selection(
    State(state): State<AppState>,
) -> Result<Json<StoredText>, AppError> {
    Ok(Json(state.runtime.store().stored_selection().await?))
}

/// DELETE /api/selection
pub async fn handle_clear_selection(
    State(state): State<AppState>,
) -> Result<Json<PopupView>, AppError> {
    let popup = state.runtime.popup().await?;
    Ok(Json(popup.clear_text().await))
}
