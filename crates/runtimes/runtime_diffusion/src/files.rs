//! Weight file layout and HuggingFace fetching

use anyhow::{Context, Result};
use hf_hub::api::sync::{Api, ApiBuilder};
use pixelforge_runtime_api::GenerateError;
use std::path::{Path, PathBuf};

pub const TEXT_ENCODER_WEIGHTS: &str = "text_encoder/model.safetensors";
pub const VAE_WEIGHTS: &str = "vae/diffusion_pytorch_model.safetensors";
pub const UNET_WEIGHTS: &str = "unet/diffusion_pytorch_model.safetensors";
pub const TOKENIZER: &str = "tokenizer/tokenizer.json";

/// Stable Diffusion 1.x checkpoints ship the CLIP vocab without a tokenizer.json
const TOKENIZER_REPO: &str = "openai/clip-vit-base-patch32";

/// Resolved paths of every file a pipeline needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeightFiles {
    pub text_encoder: PathBuf,
    pub vae: PathBuf,
    pub unet: PathBuf,
    pub tokenizer: PathBuf,
}

/// Files found in a local checkpoint directory. The tokenizer is optional.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalLayout {
    pub text_encoder: PathBuf,
    pub vae: PathBuf,
    pub unet: PathBuf,
    pub tokenizer: Option<PathBuf>,
}

impl LocalLayout {
    pub fn scan(dir: &Path) -> Result<Self, GenerateError> {
        if !dir.is_dir() {
            return Err(GenerateError::CheckpointNotFound(dir.display().to_string()));
        }

        let required = |rel: &str| {
            let path = dir.join(rel);
            if path.is_file() {
                Ok(path)
            } else {
                Err(GenerateError::Load(format!(
                    "checkpoint {} is missing {}",
                    dir.display(),
                    rel
                )))
            }
        };

        let tokenizer = dir.join(TOKENIZER);
        Ok(Self {
            text_encoder: required(TEXT_ENCODER_WEIGHTS)?,
            vae: required(VAE_WEIGHTS)?,
            unet: required(UNET_WEIGHTS)?,
            tokenizer: tokenizer.is_file().then_some(tokenizer),
        })
    }

    pub fn with_tokenizer(self, tokenizer: PathBuf) -> WeightFiles {
        WeightFiles {
            text_encoder: self.text_encoder,
            vae: self.vae,
            unet: self.unet,
            tokenizer: self.tokenizer.unwrap_or(tokenizer),
        }
    }
}

#[derive(Debug, Clone)]
pub struct HubFetcher {
    cache_dir: PathBuf,
    token: Option<String>,
}

impl HubFetcher {
    pub fn new(cache_dir: PathBuf, token: Option<String>) -> Self {
        Self { cache_dir, token }
    }

    fn api(&self) -> Result<Api> {
        ApiBuilder::new()
            .with_cache_dir(self.cache_dir.clone())
            .with_token(self.token.clone())
            .build()
            .context("failed to create HuggingFace client")
    }

    /// Download (or reuse from cache) the weights of a diffusers repo
    pub fn fetch_checkpoint(&self, repo_id: &str) -> Result<WeightFiles> {
        let api = self.api()?;
        let repo = api.model(repo_id.to_string());

        tracing::info!("Fetching {} from HuggingFace", repo_id);
        let get = |file: &str| {
            repo.get(file)
                .with_context(|| format!("failed to download {} from {}", file, repo_id))
        };

        let text_encoder = get(TEXT_ENCODER_WEIGHTS)?;
        let vae = get(VAE_WEIGHTS)?;
        let unet = get(UNET_WEIGHTS)?;
        let tokenizer = match repo.get(TOKENIZER) {
            Ok(path) => path,
            Err(_) => self.fetch_tokenizer()?,
        };

        Ok(WeightFiles {
            text_encoder,
            vae,
            unet,
            tokenizer,
        })
    }

    pub fn fetch_tokenizer(&self) -> Result<PathBuf> {
        self.api()?
            .model(TOKENIZER_REPO.to_string())
            .get("tokenizer.json")
            .with_context(|| format!("failed to download tokenizer from {}", TOKENIZER_REPO))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn touch(root: &Path, rel: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"").unwrap();
    }

    #[test]
    fn scans_complete_layout() {
        let dir = tempfile::tempdir().unwrap();
        for rel in [TEXT_ENCODER_WEIGHTS, VAE_WEIGHTS, UNET_WEIGHTS, TOKENIZER] {
            touch(dir.path(), rel);
        }

        let layout = LocalLayout::scan(dir.path()).unwrap();
        assert_eq!(layout.tokenizer, Some(dir.path().join(TOKENIZER)));

        let files = layout.with_tokenizer(PathBuf::from("/fallback/tokenizer.json"));
        assert_eq!(files.tokenizer, dir.path().join(TOKENIZER));
        assert_eq!(files.unet, dir.path().join(UNET_WEIGHTS));
    }

    #[test]
    fn tokenizer_falls_back_when_absent() {
        let dir = tempfile::tempdir().unwrap();
        for rel in [TEXT_ENCODER_WEIGHTS, VAE_WEIGHTS, UNET_WEIGHTS] {
            touch(dir.path(), rel);
        }

        let files = LocalLayout::scan(dir.path())
            .unwrap()
            .with_tokenizer(PathBuf::from("/fallback/tokenizer.json"));
        assert_eq!(files.tokenizer, PathBuf::from("/fallback/tokenizer.json"));
    }

    #[test]
    fn missing_weights_fail_to_load() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), TEXT_ENCODER_WEIGHTS);

        let err = LocalLayout::scan(dir.path()).unwrap_err();
        assert!(matches!(err, GenerateError::Load(ref msg) if msg.contains(VAE_WEIGHTS)));
    }

    #[test]
    fn missing_directory_is_not_found() {
        let err = LocalLayout::scan(Path::new("/nonexistent/pixelforge/checkpoint")).unwrap_err();
        assert!(matches!(err, GenerateError::CheckpointNotFound(_)));
    }
}
