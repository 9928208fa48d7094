use pixelforge_core::{Config, ModelCatalog, OutputStore};
use pixelforge_runtime_api::{CheckpointSource, ModelKey, ModelLoader, ModelSpec};
use std::sync::Arc;
use tokio::sync::Semaphore;

use crate::cache::ModelCache;
use crate::error::ApiError;

pub struct AppState {
    pub config: Config,
    pub catalog: ModelCatalog,
    pub models: ModelCache,
    /// `None` when saving outputs is disabled
    pub store: Option<OutputStore>,
    /// Bounds generations running at once
    pub generation_slots: Semaphore,
}

impl AppState {
    pub fn new(config: Config, loader: Arc<dyn ModelLoader>) -> Self {
        let store = config.output.save.then(|| config.output_store());
        Self {
            catalog: config.catalog(),
            models: ModelCache::new(loader, config.models.cache_capacity),
            store,
            generation_slots: Semaphore::new(config.inference.max_concurrent.max(1)),
            config,
        }
    }

    /// Names offered as checkpoints: the hub base model first, then local ones
    pub fn checkpoint_names(&self) -> Result<Vec<String>, ApiError> {
        let base = &self.config.models.base_model;
        let mut names = vec![base.clone()];
        names.extend(
            self.catalog
                .list_checkpoints()?
                .into_iter()
                .filter(|name| name != base),
        );
        Ok(names)
    }

    /// Resolve a checkpoint/adapter selection into a cache key and load spec.
    /// An empty adapter name means no adapter.
    pub fn model_spec(
        &self,
        checkpoint: &str,
        adapter: Option<&str>,
    ) -> Result<(ModelKey, ModelSpec), ApiError> {
        let source = if checkpoint == self.config.models.base_model {
            CheckpointSource::Hub(checkpoint.to_string())
        } else {
            CheckpointSource::Local(self.catalog.resolve_checkpoint(checkpoint)?)
        };

        let adapter = adapter.map(str::trim).filter(|name| !name.is_empty());
        let adapter_path = adapter
            .map(|name| self.catalog.resolve_adapter(name))
            .transpose()?;

        let key = ModelKey {
            checkpoint: checkpoint.to_string(),
            adapter: adapter.map(str::to_string),
        };
        let spec = ModelSpec {
            checkpoint: source,
            adapter: adapter_path,
            width: self.config.inference.width,
            height: self.config.inference.height,
        };
        Ok((key, spec))
    }
}
