//! HTTP route handlers.

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};

use super::dto::*;
use super::state::AppState;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/eta", get(all_boards))
        .route("/eta/:identifier", get(boards_for))
        .with_state(state)
}

/// Health check endpoint.
async fn health() -> &'static str {
    "ok"
}

/// Every provider's board.
async fn all_boards(State(state): State<AppState>) -> Json<EtaResponse> {
    let boards = state.providers.iter().map(EtaBoard::from).collect();
    Json(EtaResponse { boards })
}

/// Boards for one registry identifier. Several instances may share it.
async fn boards_for(
    State(state): State<AppState>,
    Path(identifier): Path<String>,
) -> Response {
    let boards: Vec<EtaBoard> = state.matching(&identifier).map(EtaBoard::from).collect();

    if boards.is_empty() {
        return (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: format!("no provider named {identifier}"),
            }),
        )
            .into_response();
    }

    Json(EtaResponse { boards }).into_response()
}
