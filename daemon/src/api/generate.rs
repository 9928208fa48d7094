use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use image::DynamicImage;
use pixelforge_core::{downscale_dynamic, encode, TargetSize};
use pixelforge_runtime_api::{GenerationRequest, ModelKey, ModelSpec};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::ApiError;
use crate::state::AppState;

/// Body sent by the frontend
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateBody {
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub negative_prompt: Option<String>,
    #[serde(default)]
    pub checkpoint_model: Option<String>,
    #[serde(default)]
    pub lora_model: Option<String>,
    /// Pixel-art size, defaults to `[output]` in the config
    pub width: Option<i64>,
    pub height: Option<i64>,
    pub steps: Option<u32>,
    pub guidance_scale: Option<f32>,
    pub seed: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct GenerateResponse {
    pub images: Vec<String>,
}

pub async fn generate(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<GenerateBody>, JsonRejection>,
) -> Result<Json<GenerateResponse>, ApiError> {
    let Json(body) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    let present = |field: Option<String>| field.filter(|v| !v.trim().is_empty());
    let (Some(prompt), Some(checkpoint)) = (present(body.prompt), present(body.checkpoint_model))
    else {
        return Err(ApiError::BadRequest(
            "Prompt and Checkpoint Model are required.".to_string(),
        ));
    };

    let target = state.config.pixel_target(body.width, body.height)?;
    let (key, spec) = state.model_spec(&checkpoint, body.lora_model.as_deref())?;

    let inference = &state.config.inference;
    let request = GenerationRequest {
        prompt,
        negative_prompt: body.negative_prompt.filter(|p| !p.trim().is_empty()),
        steps: body.steps.unwrap_or(inference.steps),
        guidance_scale: body.guidance_scale.unwrap_or(inference.guidance_scale),
        seed: body.seed,
    };

    let _permit = state
        .generation_slots
        .acquire()
        .await
        .map_err(ApiError::internal)?;

    tracing::info!("Generating {} pixel art with {}", target, key);
    let worker = state.clone();
    let image = tokio::task::spawn_blocking(move || render(&worker, &key, &spec, &request, target))
        .await
        .map_err(|e| ApiError::Internal(format!("generation task failed: {}", e)))??;

    Ok(Json(GenerateResponse {
        images: vec![image],
    }))
}

/// Load, generate, downscale and encode. Runs on the blocking pool.
fn render(
    state: &AppState,
    key: &ModelKey,
    spec: &ModelSpec,
    request: &GenerationRequest,
    target: TargetSize,
) -> Result<String, ApiError> {
    let model = state.models.get_or_load(key, spec)?;
    let full = model.generate(request)?.into_image()?;
    let full = DynamicImage::ImageRgb8(full);

    let pixel = downscale_dynamic(&full, target)?;
    let data_uri = encode::to_data_uri(&pixel).map_err(ApiError::internal)?;

    if let Some(store) = &state.store {
        match store.save(&request.prompt, &full, &pixel) {
            Ok(saved) => tracing::info!("Saved {} and {}", saved.full.display(), saved.pixel.display()),
            Err(e) => tracing::warn!("Failed to save outputs: {:#}", e),
        }
    }

    Ok(data_uri)
}
