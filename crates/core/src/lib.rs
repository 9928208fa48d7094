//! pixelforge_core - Core library for pixel-art generation
//!
//! This crate provides:
//! - Nearest-neighbor downscaling of decoded images
//! - PNG / data-URI encoding and on-disk persistence of outputs
//! - Checkpoint and style adapter catalog
//! - Configuration

pub mod batch;
pub mod catalog;
pub mod config;
pub mod downscale;
pub mod encode;
pub mod storage;

pub use catalog::{CatalogError, ModelCatalog};
pub use config::Config;
pub use downscale::{downscale, downscale_dynamic, DownscaleError, TargetSize};
pub use storage::{OutputStore, SavedImages};
