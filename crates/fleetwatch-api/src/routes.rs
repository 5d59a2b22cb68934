use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;

use crate::handlers::{health, ingest_position, ingest_positions_bulk};
use crate::state::AppState;
use crate::ws::ws_upgrade;

/// Build the API router: ingestion, health, and the live-feed upgrade.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/positions", post(ingest_position))
        .route("/positions/bulk", post(ingest_positions_bulk))
        .route("/health", get(health))
        .route("/ws", get(ws_upgrade))
        .with_state(state)
}
