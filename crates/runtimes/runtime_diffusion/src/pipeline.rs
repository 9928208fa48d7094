//! Stable Diffusion 1.5 pipeline
//!
//! Wraps candle-transformers' stable_diffusion module: CLIP text encoder,
//! UNet denoiser and VAE decoder, with classifier-free guidance driven by the
//! negative prompt.

use anyhow::Result;
use candle_core::{DType, Device, IndexOp, Module, Tensor};
use candle_transformers::models::stable_diffusion::{
    self, clip::ClipTextTransformer, schedulers::Scheduler, unet_2d::UNet2DConditionModel,
    vae::AutoEncoderKL, StableDiffusionConfig,
};
use pixelforge_runtime_api::{DiffusionModel, GenerateError, GenerationRequest, ImageGenResponse};
use std::path::Path;
use std::sync::Mutex;
use tokenizers::Tokenizer;

use crate::files::WeightFiles;

/// Latent scaling factor of the SD 1.x VAE
const VAE_SCALE: f64 = 0.18215;

const END_OF_TEXT: &str = "<|endoftext|>";

pub struct StableDiffusionPipeline {
    name: String,
    config: StableDiffusionConfig,
    tokenizer: Tokenizer,
    pad_id: u32,
    text_model: ClipTextTransformer,
    unet: UNet2DConditionModel,
    vae: AutoEncoderKL,
    device: Device,
    dtype: DType,
    /// One generation at a time per loaded model
    in_flight: Mutex<()>,
}

impl StableDiffusionPipeline {
    /// Load a pipeline rendering `width`x`height` images. `unet` may point at
    /// merged adapter weights instead of `files.unet`.
    pub fn load(
        name: String,
        files: &WeightFiles,
        unet: &Path,
        width: u32,
        height: u32,
        device: &Device,
        dtype: DType,
    ) -> Result<Self> {
        if width % 8 != 0 || height % 8 != 0 {
            anyhow::bail!(
                "Image dimensions must be divisible by 8. Got {}x{}",
                width,
                height
            );
        }

        let config =
            StableDiffusionConfig::v1_5(None, Some(height as usize), Some(width as usize));

        let tokenizer = Tokenizer::from_file(&files.tokenizer)
            .map_err(|e| anyhow::anyhow!("Failed to load tokenizer: {}", e))?;
        let pad_token = config.clip.pad_with.as_deref().unwrap_or(END_OF_TEXT);
        let pad_id = *tokenizer
            .get_vocab(true)
            .get(pad_token)
            .ok_or_else(|| anyhow::anyhow!("Tokenizer has no '{}' token", pad_token))?;

        tracing::info!("Building the CLIP text encoder");
        let text_model =
            stable_diffusion::build_clip_transformer(&config.clip, &files.text_encoder, device, dtype)?;

        tracing::info!("Building the autoencoder");
        let vae = config.build_vae(&files.vae, device, dtype)?;

        tracing::info!("Building the UNet");
        let unet = config.build_unet(unet, device, 4, false, dtype)?;

        Ok(Self {
            name,
            config,
            tokenizer,
            pad_id,
            text_model,
            unet,
            vae,
            device: device.clone(),
            dtype,
            in_flight: Mutex::new(()),
        })
    }

    fn encode_prompt(&self, prompt: &str) -> Result<Tensor, GenerateError> {
        let tokens = self
            .tokenizer
            .encode(prompt, true)
            .map_err(|e| GenerateError::InvalidRequest(format!("tokenization failed: {}", e)))?
            .get_ids()
            .to_vec();
        let tokens = pad_tokens(tokens, self.config.clip.max_position_embeddings, self.pad_id)?;

        let ids = Tensor::new(tokens.as_slice(), &self.device)
            .and_then(|t| t.unsqueeze(0))
            .map_err(inference)?;
        self.text_model.forward(&ids).map_err(inference)
    }

    /// Conditioning for the UNet: `[uncond, cond]` when guidance is on
    fn text_embeddings(&self, request: &GenerationRequest, guided: bool) -> Result<Tensor, GenerateError> {
        let cond = self.encode_prompt(&request.prompt)?;
        let embeddings = if guided {
            let uncond = self.encode_prompt(request.negative_prompt.as_deref().unwrap_or(""))?;
            Tensor::cat(&[uncond, cond], 0).map_err(inference)?
        } else {
            cond
        };
        embeddings.to_dtype(self.dtype).map_err(inference)
    }

    fn denoise(
        &self,
        text_embeddings: &Tensor,
        steps: usize,
        guidance_scale: Option<f64>,
    ) -> candle_core::Result<Tensor> {
        let mut scheduler = self.config.build_scheduler(steps)?;
        let timesteps = scheduler.timesteps().to_vec();

        let latents = Tensor::randn(
            0f32,
            1f32,
            (1, 4, self.config.height / 8, self.config.width / 8),
            &self.device,
        )?;
        let mut latents = (latents * scheduler.init_noise_sigma())?.to_dtype(self.dtype)?;

        for (index, &timestep) in timesteps.iter().enumerate() {
            let input = match guidance_scale {
                Some(_) => Tensor::cat(&[&latents, &latents], 0)?,
                None => latents.clone(),
            };
            let input = scheduler.scale_model_input(input, timestep)?;
            let noise_pred = self.unet.forward(&input, timestep as f64, text_embeddings)?;

            let noise_pred = match guidance_scale {
                Some(scale) => {
                    let chunks = noise_pred.chunk(2, 0)?;
                    let (uncond, cond) = (&chunks[0], &chunks[1]);
                    (uncond + ((cond - uncond)? * scale)?)?
                }
                None => noise_pred,
            };

            latents = scheduler.step(&noise_pred, timestep, &latents)?;
            tracing::debug!("Timestep {}/{}", index + 1, timesteps.len());
        }

        Ok(latents)
    }

    fn decode(&self, latents: &Tensor) -> candle_core::Result<ImageGenResponse> {
        let image = self.vae.decode(&(latents / VAE_SCALE)?)?;
        let image = ((image / 2.)? + 0.5)?.to_device(&Device::Cpu)?;
        let image = (image.clamp(0f32, 1.)? * 255.)?.to_dtype(DType::U8)?.i(0)?;

        let (channels, height, width) = image.dims3()?;
        if channels != 3 {
            candle_core::bail!("expected 3 channels, VAE produced {}", channels);
        }
        let pixels = image.permute((1, 2, 0))?.flatten_all()?.to_vec1::<u8>()?;

        Ok(ImageGenResponse {
            pixels,
            width: width as u32,
            height: height as u32,
        })
    }

    fn generate_internal(&self, request: &GenerationRequest) -> Result<ImageGenResponse, GenerateError> {
        if request.prompt.trim().is_empty() {
            return Err(GenerateError::InvalidRequest("prompt is empty".into()));
        }
        if request.steps == 0 {
            return Err(GenerateError::InvalidRequest("steps must be positive".into()));
        }

        let _guard = self
            .in_flight
            .lock()
            .map_err(|_| GenerateError::Inference("model lock poisoned".into()))?;

        if let Some(seed) = request.seed {
            self.device.set_seed(seed).map_err(inference)?;
        }

        let guidance = (request.guidance_scale > 1.0).then_some(f64::from(request.guidance_scale));
        let text_embeddings = self.text_embeddings(request, guidance.is_some())?;

        tracing::info!(
            "Generating {}x{} with {} ({} steps)",
            self.config.width,
            self.config.height,
            self.name,
            request.steps
        );
        let latents = self
            .denoise(&text_embeddings, request.steps as usize, guidance)
            .map_err(inference)?;
        self.decode(&latents).map_err(inference)
    }
}

impl DiffusionModel for StableDiffusionPipeline {
    fn generate(&self, request: &GenerationRequest) -> Result<ImageGenResponse, GenerateError> {
        self.generate_internal(request)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

// The candle modules hold immutable weights and every generation runs under
// `in_flight`.
unsafe impl Send for StableDiffusionPipeline {}
unsafe impl Sync for StableDiffusionPipeline {}

fn inference(e: candle_core::Error) -> GenerateError {
    GenerateError::Inference(e.to_string())
}

/// Pad CLIP token ids to the model's context length.
pub fn pad_tokens(mut tokens: Vec<u32>, max_len: usize, pad_id: u32) -> Result<Vec<u32>, GenerateError> {
    if tokens.len() > max_len {
        return Err(GenerateError::InvalidRequest(format!(
            "prompt is too long: {} tokens, the model accepts {}",
            tokens.len(),
            max_len
        )));
    }
    tokens.resize(max_len, pad_id);
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pads_to_context_length() {
        let tokens = pad_tokens(vec![49406, 320, 49407], 6, 49407).unwrap();
        assert_eq!(tokens, vec![49406, 320, 49407, 49407, 49407, 49407]);
    }

    #[test]
    fn exact_length_is_kept() {
        let tokens = pad_tokens(vec![1, 2, 3], 3, 0).unwrap();
        assert_eq!(tokens, vec![1, 2, 3]);
    }

    #[test]
    fn overlong_prompt_is_invalid() {
        let err = pad_tokens(vec![0; 78], 77, 0).unwrap_err();
        assert!(matches!(err, GenerateError::InvalidRequest(_)));
    }
}
