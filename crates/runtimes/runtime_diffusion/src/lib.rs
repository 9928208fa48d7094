//! pixelforge_runtime_diffusion - Stable Diffusion inference runtime
//!
//! This crate implements the runtime API on top of candle's Stable
//! Diffusion 1.5 port. Checkpoints come from local diffusers directories or
//! the HuggingFace hub; style adapters are laid over the checkpoint UNet
//! before the pipeline is built.

mod adapter;
mod device;
mod files;
mod loader;
mod pipeline;

pub use adapter::{merged_file_name, merged_unet, overlay_tensors};
pub use device::{accelerator, select_device, weight_dtype};
pub use files::{HubFetcher, LocalLayout, WeightFiles};
pub use loader::{checkpoint_label, SdLoader, SdLoaderOptions};
pub use pipeline::{pad_tokens, StableDiffusionPipeline};
