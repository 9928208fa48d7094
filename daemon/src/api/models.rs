use axum::{extract::State, Json};
use serde::Serialize;
use std::sync::Arc;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Serialize)]
pub struct ModelsResponse {
    pub models: Vec<String>,
}

pub async fn list_checkpoints(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ModelsResponse>, ApiError> {
    Ok(Json(ModelsResponse {
        models: state.checkpoint_names()?,
    }))
}

pub async fn list_loras(State(state): State<Arc<AppState>>) -> Result<Json<ModelsResponse>, ApiError> {
    Ok(Json(ModelsResponse {
        models: state.catalog.list_adapters()?,
    }))
}
