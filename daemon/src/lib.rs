//! pixelforge_daemon - HTTP server for pixel-art generation
//!
//! This crate provides the daemon server that:
//! - Lists the checkpoints and style adapters on disk
//! - Renders prompts through a diffusion backend and downscales the result
//! - Keeps recently used models loaded and bounds concurrent generations

pub mod api;
pub mod cache;
pub mod error;
pub mod server;
pub mod state;

pub use cache::ModelCache;
pub use error::ApiError;
pub use server::{router, run_server};
pub use state::AppState;
