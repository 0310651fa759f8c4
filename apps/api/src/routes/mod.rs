pub mod health;

use axum::{
    routing::{get, post},
    Router,
};

use crate::formatting::handlers as formatting;
use crate::selection::handlers as selection;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Formatting API
        .route("/api/v1/format", post(formatting::handle_format))
        .route("/api/v1/format/wrap", post(formatting::handle_wrap))
        // Associations
        .route(
            "/api/v1/associations/:kind/:parent_id",
            get(selection::handle_list_associations),
        )
        // Selection dialogs
        .route("/api/v1/dialogs", post(selection::handle_open_dialog))
        .route(
            "/api/v1/dialogs/:id",
            get(selection::handle_get_dialog).delete(selection::handle_cancel),
        )
        .route("/api/v1/dialogs/:id/toggle", post(selection::handle_toggle))
        .route("/api/v1/dialogs/:id/commit", post(selection::handle_commit))
        .with_state(state)
}
