pub mod health;

use axum::{
    routing::{get, post},
    Router,
};

use crate::enhance::handlers;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        .route("/api/v1/ai/models", get(handlers::handle_list_models))
        .route("/api/v1/ai/enhance", post(handlers::handle_enhance))
        .route(
            "/api/v1/ai/enhance/batch",
            post(handlers::handle_enhance_batch),
        )
        .route("/api/v1/ai/extract", post(handlers::handle_extract))
        .with_state(state)
}
