use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::catalog::ModelCatalog;
use crate::downscale::{DownscaleError, TargetSize};
use crate::storage::OutputStore;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Daemon settings
    #[serde(default)]
    pub daemon: DaemonConfig,

    /// Model settings
    #[serde(default)]
    pub models: ModelsConfig,

    /// Inference settings
    #[serde(default)]
    pub inference: InferenceConfig,

    /// Pixel-art output settings
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Origins allowed by CORS
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelsConfig {
    /// Directory of checkpoints in diffusers layout (default: ~/.config/pixelforge/checkpoints/)
    #[serde(default = "default_checkpoints_dir")]
    pub checkpoints_dir: PathBuf,

    /// Directory of style adapters (default: ~/.config/pixelforge/loras/)
    #[serde(default = "default_adapters_dir")]
    pub adapters_dir: PathBuf,

    /// HuggingFace repo used when no local checkpoint is selected
    #[serde(default = "default_base_model")]
    pub base_model: String,

    /// Download cache for HuggingFace files
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,

    /// How many loaded models to keep in memory
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,

    /// HuggingFace token for private models
    #[serde(default)]
    pub hf_token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceConfig {
    /// Width of the generated image, before downscaling
    #[serde(default = "default_render_size")]
    pub width: u32,

    /// Height of the generated image, before downscaling
    #[serde(default = "default_render_size")]
    pub height: u32,

    #[serde(default = "default_steps")]
    pub steps: u32,

    #[serde(default = "default_guidance_scale")]
    pub guidance_scale: f32,

    /// Use GPU acceleration (Metal on macOS, CUDA on Linux)
    #[serde(default = "default_true")]
    pub use_gpu: bool,

    /// Half precision weights on CUDA
    #[serde(default = "default_true")]
    pub use_f16: bool,

    /// Generations allowed to run at the same time
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_pixel_size")]
    pub pixel_width: u32,

    #[serde(default = "default_pixel_size")]
    pub pixel_height: u32,

    /// Largest width or height a request may ask for
    #[serde(default = "default_max_pixel_size")]
    pub max_pixel_size: u32,

    /// Keep copies of every generation on disk
    #[serde(default = "default_true")]
    pub save: bool,

    #[serde(default = "default_full_dir")]
    pub full_dir: PathBuf,

    #[serde(default = "default_pixel_dir")]
    pub pixel_dir: PathBuf,

    /// Maximum length of the prompt part of saved file names
    #[serde(default = "default_slug_len")]
    pub slug_len: usize,
}

fn base_dir_or_fallback() -> PathBuf {
    Config::base_dir().unwrap_or_else(|_| PathBuf::from("~/.config/pixelforge"))
}

fn default_port() -> u16 {
    5000
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_allowed_origins() -> Vec<String> {
    vec!["http://localhost:5173".to_string()]
}

fn default_checkpoints_dir() -> PathBuf {
    base_dir_or_fallback().join("checkpoints")
}

fn default_adapters_dir() -> PathBuf {
    base_dir_or_fallback().join("loras")
}

fn default_base_model() -> String {
    "stable-diffusion-v1-5/stable-diffusion-v1-5".to_string()
}

fn default_cache_dir() -> PathBuf {
    base_dir_or_fallback().join("cache")
}

fn default_cache_capacity() -> usize {
    2
}

fn default_render_size() -> u32 {
    512
}

fn default_steps() -> u32 {
    30
}

fn default_guidance_scale() -> f32 {
    7.5
}

fn default_true() -> bool {
    true
}

fn default_max_concurrent() -> usize {
    1
}

fn default_pixel_size() -> u32 {
    16
}

fn default_max_pixel_size() -> u32 {
    512
}

fn default_full_dir() -> PathBuf {
    base_dir_or_fallback().join("outputs").join("full")
}

fn default_pixel_dir() -> PathBuf {
    base_dir_or_fallback().join("outputs").join("pixel")
}

fn default_slug_len() -> usize {
    30
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            allowed_origins: default_allowed_origins(),
        }
    }
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            checkpoints_dir: default_checkpoints_dir(),
            adapters_dir: default_adapters_dir(),
            base_model: default_base_model(),
            cache_dir: default_cache_dir(),
            cache_capacity: default_cache_capacity(),
            hf_token: None,
        }
    }
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            width: default_render_size(),
            height: default_render_size(),
            steps: default_steps(),
            guidance_scale: default_guidance_scale(),
            use_gpu: true,
            use_f16: true,
            max_concurrent: default_max_concurrent(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            pixel_width: default_pixel_size(),
            pixel_height: default_pixel_size(),
            max_pixel_size: default_max_pixel_size(),
            save: true,
            full_dir: default_full_dir(),
            pixel_dir: default_pixel_dir(),
            slug_len: default_slug_len(),
        }
    }
}

impl Config {
    /// Get the base directory: ~/.config/pixelforge/
    pub fn base_dir() -> Result<PathBuf> {
        let home = std::env::var("HOME")
            .map(PathBuf::from)
            .or_else(|_| std::env::var("USERPROFILE").map(PathBuf::from))
            .map_err(|_| anyhow::anyhow!("Could not determine home directory"))?;
        Ok(home.join(".config").join("pixelforge"))
    }

    /// Load config from default location
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load config from `path`, falling back to defaults when it does not exist
    pub fn load_from(path: &Path) -> Result<Self> {
        let config: Config = if path.exists() {
            let content = fs::read_to_string(path)?;
            toml::from_str(&content)?
        } else {
            Config::default()
        };
        config.validate()?;
        Ok(config)
    }

    /// Save config to default location
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        self.validate()?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Get the config file path: ~/.config/pixelforge/config.toml
    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::base_dir()?.join("config.toml"))
    }

    pub fn validate(&self) -> Result<()> {
        let inference = &self.inference;
        if inference.width == 0 || inference.height == 0 {
            anyhow::bail!("inference.width and inference.height must be positive");
        }
        if inference.width % 8 != 0 || inference.height % 8 != 0 {
            anyhow::bail!(
                "inference size must be a multiple of 8, got {}x{}",
                inference.width,
                inference.height
            );
        }
        if inference.steps == 0 {
            anyhow::bail!("inference.steps must be positive");
        }
        if inference.max_concurrent == 0 {
            anyhow::bail!("inference.max_concurrent must be positive");
        }
        if self.models.cache_capacity == 0 {
            anyhow::bail!("models.cache_capacity must be positive");
        }
        self.pixel_size()?;
        Ok(())
    }

    /// Default pixel-art target size
    pub fn pixel_size(&self) -> Result<TargetSize> {
        Ok(self.pixel_target(None, None)?)
    }

    /// Requested pixel-art size, falling back to the configured defaults
    /// and bounded by `output.max_pixel_size`
    pub fn pixel_target(
        &self,
        width: Option<i64>,
        height: Option<i64>,
    ) -> Result<TargetSize, DownscaleError> {
        let target = TargetSize::new(
            width.unwrap_or(i64::from(self.output.pixel_width)),
            height.unwrap_or(i64::from(self.output.pixel_height)),
        )?;
        let max = self.output.max_pixel_size;
        if target.width() > max || target.height() > max {
            return Err(DownscaleError::TooLarge {
                width: target.width(),
                height: target.height(),
            });
        }
        Ok(target)
    }

    pub fn catalog(&self) -> ModelCatalog {
        ModelCatalog::new(&self.models.checkpoints_dir, &self.models.adapters_dir)
    }

    pub fn output_store(&self) -> OutputStore {
        OutputStore::new(&self.output.full_dir, &self.output.pixel_dir, self.output.slug_len)
    }

    /// Read a value by dotted key, e.g. `daemon.port`
    pub fn get_value(&self, key: &str) -> Result<String> {
        let value = match key {
            "daemon.host" => self.daemon.host.clone(),
            "daemon.port" => self.daemon.port.to_string(),
            "daemon.allowed_origins" => self.daemon.allowed_origins.join(","),
            "models.checkpoints_dir" => self.models.checkpoints_dir.display().to_string(),
            "models.adapters_dir" => self.models.adapters_dir.display().to_string(),
            "models.base_model" => self.models.base_model.clone(),
            "models.cache_dir" => self.models.cache_dir.display().to_string(),
            "models.cache_capacity" => self.models.cache_capacity.to_string(),
            "models.hf_token" => self
                .models
                .hf_token
                .as_ref()
                .map(|_| "***".to_string())
                .unwrap_or_default(),
            "inference.width" => self.inference.width.to_string(),
            "inference.height" => self.inference.height.to_string(),
            "inference.steps" => self.inference.steps.to_string(),
            "inference.guidance_scale" => self.inference.guidance_scale.to_string(),
            "inference.use_gpu" => self.inference.use_gpu.to_string(),
            "inference.use_f16" => self.inference.use_f16.to_string(),
            "inference.max_concurrent" => self.inference.max_concurrent.to_string(),
            "output.pixel_width" => self.output.pixel_width.to_string(),
            "output.pixel_height" => self.output.pixel_height.to_string(),
            "output.max_pixel_size" => self.output.max_pixel_size.to_string(),
            "output.save" => self.output.save.to_string(),
            "output.full_dir" => self.output.full_dir.display().to_string(),
            "output.pixel_dir" => self.output.pixel_dir.display().to_string(),
            "output.slug_len" => self.output.slug_len.to_string(),
            _ => anyhow::bail!("Unknown config key: {}", key),
        };
        Ok(value)
    }

    /// Set a value by dotted key. The result is validated.
    pub fn set_value(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "daemon.host" => self.daemon.host = value.to_string(),
            "daemon.port" => self.daemon.port = value.parse()?,
            "daemon.allowed_origins" => {
                self.daemon.allowed_origins = value
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            }
            "models.checkpoints_dir" => self.models.checkpoints_dir = value.into(),
            "models.adapters_dir" => self.models.adapters_dir = value.into(),
            "models.base_model" => self.models.base_model = value.to_string(),
            "models.cache_dir" => self.models.cache_dir = value.into(),
            "models.cache_capacity" => self.models.cache_capacity = value.parse()?,
            "models.hf_token" => {
                self.models.hf_token = if value.is_empty() {
                    None
                } else {
                    Some(value.to_string())
                }
            }
            "inference.width" => self.inference.width = value.parse()?,
            "inference.height" => self.inference.height = value.parse()?,
            "inference.steps" => self.inference.steps = value.parse()?,
            "inference.guidance_scale" => self.inference.guidance_scale = value.parse()?,
            "inference.use_gpu" => self.inference.use_gpu = value.parse()?,
            "inference.use_f16" => self.inference.use_f16 = value.parse()?,
            "inference.max_concurrent" => self.inference.max_concurrent = value.parse()?,
            "output.pixel_width" => self.output.pixel_width = value.parse()?,
            "output.pixel_height" => self.output.pixel_height = value.parse()?,
            "output.max_pixel_size" => self.output.max_pixel_size = value.parse()?,
            "output.save" => self.output.save = value.parse()?,
            "output.full_dir" => self.output.full_dir = value.into(),
            "output.pixel_dir" => self.output.pixel_dir = value.into(),
            "output.slug_len" => self.output.slug_len = value.parse()?,
            _ => anyhow::bail!("Unknown config key: {}", key),
        }
        self.validate()
    }
}
