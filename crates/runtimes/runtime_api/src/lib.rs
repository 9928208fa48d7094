//! pixelforge_runtime_api - Runtime API traits and types
//!
//! This crate defines the contract between the service and a diffusion
//! backend. A backend turns a [`ModelSpec`] into a loaded [`DiffusionModel`]
//! and the model turns a [`GenerationRequest`] into pixels. Nothing here
//! knows how sampling works.

use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// Failures a backend can report, split by who has to act on them
#[derive(Debug, Error)]
pub enum GenerateError {
    /// The request itself is unusable (empty prompt, prompt too long, ...)
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("checkpoint not found: {0}")]
    CheckpointNotFound(String),

    #[error("adapter not found: {0}")]
    AdapterNotFound(String),

    /// The adapter exists but holds weights this backend cannot apply
    #[error("unsupported adapter: {0}")]
    UnsupportedAdapter(String),

    /// Weights were found but could not be loaded
    #[error("failed to load model: {0}")]
    Load(String),

    #[error("inference failed: {0}")]
    Inference(String),
}

/// Text-to-image request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub prompt: String,
    #[serde(default)]
    pub negative_prompt: Option<String>,
    #[serde(default = "default_steps")]
    pub steps: u32,
    #[serde(default = "default_guidance_scale")]
    pub guidance_scale: f32,
    #[serde(default)]
    pub seed: Option<u64>,
}

fn default_steps() -> u32 {
    30
}

fn default_guidance_scale() -> f32 {
    7.5
}

impl Default for GenerationRequest {
    fn default() -> Self {
        Self {
            prompt: String::new(),
            negative_prompt: None,
            steps: default_steps(),
            guidance_scale: default_guidance_scale(),
            seed: None,
        }
    }
}

/// Image generation response
#[derive(Debug, Clone)]
pub struct ImageGenResponse {
    /// Raw pixel data (RGB, u8, row-major)
    pub pixels: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl ImageGenResponse {
    pub fn into_image(self) -> Result<RgbImage, GenerateError> {
        let (width, height, len) = (self.width, self.height, self.pixels.len());
        RgbImage::from_raw(width, height, self.pixels).ok_or_else(|| {
            GenerateError::Inference(format!(
                "backend returned {} bytes for a {}x{} RGB image",
                len, width, height
            ))
        })
    }
}

/// Where the base weights of a checkpoint live
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CheckpointSource {
    /// Directory in diffusers layout
    Local(PathBuf),
    /// HuggingFace repo id, fetched on load
    Hub(String),
}

/// Everything a loader needs to build one model instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSpec {
    pub checkpoint: CheckpointSource,
    pub adapter: Option<PathBuf>,
    /// Output resolution of the model
    pub width: u32,
    pub height: u32,
}

/// Identity of a loaded model: one per (checkpoint, adapter) pair
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModelKey {
    pub checkpoint: String,
    pub adapter: Option<String>,
}

impl std::fmt::Display for ModelKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.adapter {
            Some(adapter) => write!(f, "{}+{}", self.checkpoint, adapter),
            None => write!(f, "{}", self.checkpoint),
        }
    }
}

/// A loaded diffusion model.
///
/// Implementations serialize their own inference; callers may share one
/// instance between threads.
pub trait DiffusionModel: Send + Sync {
    /// Generate an image from a text prompt. Output size is fixed per model.
    fn generate(&self, request: &GenerationRequest) -> Result<ImageGenResponse, GenerateError>;

    /// Get the model name
    fn name(&self) -> &str;
}

/// Builds model instances. Loading is blocking and may take a long time.
pub trait ModelLoader: Send + Sync {
    fn load(&self, spec: &ModelSpec) -> Result<Arc<dyn DiffusionModel>, GenerateError>;
}
