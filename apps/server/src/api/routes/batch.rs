//! Batch API Routes

use crate::api::handlers::batch;
use crate::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};

/// Mounted under `/api/v1`.
pub fn batch_routes() -> Router<AppState> {
    Router::new()
        .route("/batches", post(batch::execute_batch))
        .route("/batches/routes", get(batch::list_routes))
}
