use std::fs;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

/// Marker file that makes a directory a usable checkpoint (diffusers layout)
pub const CHECKPOINT_MARKER: &str = "unet/diffusion_pytorch_model.safetensors";

const ADAPTER_EXTENSION: &str = "safetensors";

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("invalid {kind} name '{name}'")]
    InvalidName { kind: &'static str, name: String },

    #[error("{kind} '{name}' not found in {dir}")]
    NotFound {
        kind: &'static str,
        name: String,
        dir: PathBuf,
    },

    #[error("failed to read {dir}: {source}")]
    Io {
        dir: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Checkpoints and style adapters available on disk.
///
/// A checkpoint is a sub-directory of `checkpoints_dir` holding a model in
/// diffusers layout. An adapter is a `.safetensors` file in `adapters_dir`.
#[derive(Debug, Clone)]
pub struct ModelCatalog {
    checkpoints_dir: PathBuf,
    adapters_dir: PathBuf,
}

impl ModelCatalog {
    pub fn new(checkpoints_dir: impl Into<PathBuf>, adapters_dir: impl Into<PathBuf>) -> Self {
        Self {
            checkpoints_dir: checkpoints_dir.into(),
            adapters_dir: adapters_dir.into(),
        }
    }

    pub fn checkpoints_dir(&self) -> &Path {
        &self.checkpoints_dir
    }

    pub fn adapters_dir(&self) -> &Path {
        &self.adapters_dir
    }

    pub fn list_checkpoints(&self) -> Result<Vec<String>, CatalogError> {
        let mut names: Vec<String> = read_names(&self.checkpoints_dir)?
            .into_iter()
            .filter(|name| self.checkpoints_dir.join(name).join(CHECKPOINT_MARKER).is_file())
            .collect();
        names.sort();
        Ok(names)
    }

    pub fn list_adapters(&self) -> Result<Vec<String>, CatalogError> {
        let mut names: Vec<String> = read_names(&self.adapters_dir)?
            .into_iter()
            .filter(|name| is_adapter_file(name) && self.adapters_dir.join(name).is_file())
            .collect();
        names.sort();
        Ok(names)
    }

    pub fn resolve_checkpoint(&self, name: &str) -> Result<PathBuf, CatalogError> {
        validate_name("checkpoint", name)?;
        let path = self.checkpoints_dir.join(name);
        if path.join(CHECKPOINT_MARKER).is_file() {
            Ok(path)
        } else {
            Err(CatalogError::NotFound {
                kind: "checkpoint",
                name: name.to_string(),
                dir: self.checkpoints_dir.clone(),
            })
        }
    }

    pub fn resolve_adapter(&self, name: &str) -> Result<PathBuf, CatalogError> {
        validate_name("adapter", name)?;
        let path = self.adapters_dir.join(name);
        if is_adapter_file(name) && path.is_file() {
            Ok(path)
        } else {
            Err(CatalogError::NotFound {
                kind: "adapter",
                name: name.to_string(),
                dir: self.adapters_dir.clone(),
            })
        }
    }
}

fn is_adapter_file(name: &str) -> bool {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case(ADAPTER_EXTENSION))
        .unwrap_or(false)
}

/// Names must be a single normal path component.
fn validate_name(kind: &'static str, name: &str) -> Result<(), CatalogError> {
    let mut components = Path::new(name).components();
    let valid = matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    ) && !name.contains(['/', '\\']);

    if valid {
        Ok(())
    } else {
        Err(CatalogError::InvalidName {
            kind,
            name: name.to_string(),
        })
    }
}

fn read_names(dir: &Path) -> Result<Vec<String>, CatalogError> {
    if !dir.exists() {
        tracing::debug!("{} does not exist, nothing to list", dir.display());
        return Ok(Vec::new());
    }

    let entries = fs::read_dir(dir).map_err(|source| CatalogError::Io {
        dir: dir.to_path_buf(),
        source,
    })?;

    Ok(entries
        .filter_map(|e| e.ok())
        .filter_map(|e| e.file_name().to_str().map(str::to_string))
        .collect())
}
