use axum::{extract::State, Json};

use crate::errors::AppError;
use crate::popup::PopupView;
use crate::state::AppState;

/// POST /api/generate-cover-letter
/// Generates for the popup's current selection. Calling again regenerates.
pub async fn handle_generate_cover_letter(
    State(state): State<AppState>,
) -> Result<Json<PopupView>, AppError> {
    let popup = state.runtime.popup().await?;
    Ok(Json(popup.generate_cover_letter().await))
}
