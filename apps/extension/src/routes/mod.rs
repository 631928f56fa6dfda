pub mod health;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post, put},
    Router,
};

use crate::cover_letter::handlers as cover_letter;
use crate::popup::handlers as popup;
use crate::resume::file::MAX_INLINE_BYTES;
use crate::resume::handlers as resume;
use crate::selection::handlers as selection;
use crate::state::AppState;

/// Uploads get headroom over the inline limit so oversized files reach the
/// pipeline's own size check.
const UPLOAD_BODY_LIMIT: usize = MAX_INLINE_BYTES + 5 * 1024 * 1024;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health::health_handler))
        // Popup context
        .route("/api/popup", get(popup::handle_get_popup))
        .route("/api/popup/open", post(popup::handle_open_popup))
        .route("/api/popup/close", post(popup::handle_close_popup))
        .route("/api/settings/api-key", put(popup::handle_save_api_key))
        // Page contexts
        .route("/api/tabs", post(selection::handle_open_tab))
        .route(
            "/api/tabs/:id",
            get(selection::handle_get_tab).delete(selection::handle_close_tab),
        )
        .route(
            "/api/tabs/:id/selection/start",
            post(selection::handle_start_selection),
        )
        .route("/api/tabs/:id/selection", put(selection::handle_select_text))
        .route("/api/tabs/:id/events", post(selection::handle_page_event))
        .route(
            "/api/selection",
            get(selection::handle_get_selection).delete(selection::handle_clear_selection),
        )
        // Resume
        .route(
            "/api/resume/parse",
            post(resume::handle_parse_resume).layer(DefaultBodyLimit::max(UPLOAD_BODY_LIMIT)),
        )
        .route(
            "/api/resume",
            get(resume::handle_get_resume)
                .put(resume::handle_save_resume)
                .delete(resume::handle_clear_resume),
        )
        // Cover letter
        .route(
            "/api/generate-cover-letter",
            post(cover_letter::handle_generate_cover_letter),
        )
        .with_state(state)
}
