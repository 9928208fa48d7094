use candle_core::{DType, Device};
use pixelforge_runtime_api::{
    CheckpointSource, DiffusionModel, GenerateError, ModelLoader, ModelSpec,
};
use std::path::PathBuf;
use std::sync::Arc;

use crate::adapter::merged_unet;
use crate::device::{select_device, weight_dtype};
use crate::files::{HubFetcher, LocalLayout, WeightFiles};
use crate::pipeline::StableDiffusionPipeline;

/// Loader settings, usually filled from the `[models]` and `[inference]`
/// config sections
#[derive(Debug, Clone)]
pub struct SdLoaderOptions {
    pub use_gpu: bool,
    pub use_f16: bool,
    /// HuggingFace cache and merged adapter weights live here
    pub cache_dir: PathBuf,
    pub hf_token: Option<String>,
}

/// Builds [`StableDiffusionPipeline`]s from local or hub checkpoints
pub struct SdLoader {
    device: Device,
    dtype: DType,
    hub: HubFetcher,
    merged_dir: PathBuf,
}

impl SdLoader {
    pub fn new(options: SdLoaderOptions) -> anyhow::Result<Self> {
        let device = select_device(options.use_gpu)?;
        let dtype = weight_dtype(&device, options.use_f16);
        tracing::info!("Diffusion weights will load as {:?}", dtype);

        Ok(Self {
            device,
            dtype,
            hub: HubFetcher::new(options.cache_dir.join("hub"), options.hf_token),
            merged_dir: options.cache_dir.join("merged"),
        })
    }

    fn weight_files(&self, source: &CheckpointSource) -> Result<WeightFiles, GenerateError> {
        match source {
            CheckpointSource::Local(dir) => {
                let layout = LocalLayout::scan(dir)?;
                let tokenizer = match layout.tokenizer.clone() {
                    Some(path) => path,
                    None => self.hub.fetch_tokenizer().map_err(load_error)?,
                };
                Ok(layout.with_tokenizer(tokenizer))
            }
            CheckpointSource::Hub(repo_id) => {
                self.hub.fetch_checkpoint(repo_id).map_err(load_error)
            }
        }
    }
}

fn load_error(e: anyhow::Error) -> GenerateError {
    GenerateError::Load(format!("{:#}", e))
}

/// Short name of a checkpoint for logs and merged file names
pub fn checkpoint_label(source: &CheckpointSource) -> String {
    match source {
        CheckpointSource::Local(dir) => dir
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| dir.display().to_string()),
        CheckpointSource::Hub(repo_id) => repo_id.clone(),
    }
}

impl ModelLoader for SdLoader {
    fn load(&self, spec: &ModelSpec) -> Result<Arc<dyn DiffusionModel>, GenerateError> {
        let label = checkpoint_label(&spec.checkpoint);
        let files = self.weight_files(&spec.checkpoint)?;

        let (unet, name) = match &spec.adapter {
            Some(adapter) => {
                let merged = merged_unet(&files.unet, adapter, &label, &self.merged_dir)?;
                let adapter_name = adapter
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_default();
                (merged, format!("{}+{}", label, adapter_name))
            }
            None => (files.unet.clone(), label),
        };

        tracing::info!("Loading {} on {:?}", name, self.device);
        let pipeline = StableDiffusionPipeline::load(
            name,
            &files,
            &unet,
            spec.width,
            spec.height,
            &self.device,
            self.dtype,
        )
        .map_err(load_error)?;

        Ok(Arc::new(pipeline))
    }
}
