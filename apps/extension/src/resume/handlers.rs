use axum::{
    extract::{Multipart, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::errors::AppError;
use crate::popup::PopupView;
use crate::resume::{ResumeFile, ResumeRecord};
use crate::state::AppState;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredResumeResponse {
    pub resume: Option<ResumeRecord>,
    pub last_updated: Option<DateTime<Utc>>,
    /// Whether the stored resume has both name and email.
    pub usable: bool,
}

/// POST /api/resume/parse
/// Multipart upload with the resume in a `file` field.
pub async fn handle_parse_resume(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<PopupView>, AppError> {
    let popup = state.runtime.popup().await?;

    let mut file = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Invalid multipart body: {e}")))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let name = field.file_name().unwrap_or("resume").to_string();
        let mime_type = field.content_type().map(str::to_string);
        let bytes = field
            .bytes()
            .await
            .map_err(|e| AppError::Validation(format!("Failed to read upload: {e}")))?;
        file = Some(ResumeFile::from_upload(name, mime_type.as_deref(), bytes));
        break;
    }

    let file = file.ok_or_else(|| AppError::Validation("Missing `file` field".to_string()))?;
    Ok(Json(popup.upload_resume(file).await))
}

/// GET /api/resume
pub async fn handle_get_resume(
    State(state): State<AppState>,
) -> Result<Json<StoredResumeResponse>, AppError> {
    let store = state.runtime.store();
    Ok(Json(StoredResumeResponse {
        resume: store.resume().await?,
        last_updated: store.resume_last_updated().await?,
        usable: store.has_usable_resume().await?,
    }))
}

/// PUT /api/resume
pub async fn handle_save_resume(
    State(state): State<AppState>,
    Json(record): Json<ResumeRecord>,
) -> Result<Json<PopupView>, AppError> {
    let popup = state.runtime.popup().await?;
    Ok(Json(popup.save_resume(record).await))
}

/// DELETE /api/resume
pub async fn handle_clear_resume(
    State(state): State<AppState>,
) -> Result<Json<PopupView>, AppError> {
    let popup = state.runtime.popup().await?;
    Ok(Json(popup.clear_resume().await))
}
