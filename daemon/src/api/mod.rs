pub mod generate;
pub mod models;

use axum::{
    routing::{get, post},
    Router,
};

use crate::state::AppState;
use std::sync::Arc;

pub fn routes(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/checkpoints", get(models::list_checkpoints))
        .route("/api/loras", get(models::list_loras))
        .route("/api/generate", post(generate::generate))
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}
