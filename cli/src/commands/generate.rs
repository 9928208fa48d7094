//! One-shot generation without the daemon

use anyhow::Result;
use image::DynamicImage;
use pixelforge_core::{downscale_dynamic, Config};
use pixelforge_runtime_api::{CheckpointSource, GenerationRequest, ModelLoader, ModelSpec};
use pixelforge_runtime_diffusion::{SdLoader, SdLoaderOptions};

pub struct GenerateArgs {
    pub prompt: String,
    pub negative_prompt: Option<String>,
    pub checkpoint: Option<String>,
    pub adapter: Option<String>,
    pub width: Option<i64>,
    pub height: Option<i64>,
    pub steps: Option<u32>,
    pub seed: Option<u64>,
    pub cpu: bool,
}

pub async fn execute(args: GenerateArgs) -> Result<()> {
    let config = Config::load()?;
    let catalog = config.catalog();

    let target = config.pixel_target(args.width, args.height)?;

    let checkpoint = args
        .checkpoint
        .unwrap_or_else(|| config.models.base_model.clone());
    let source = if checkpoint == config.models.base_model {
        CheckpointSource::Hub(checkpoint.clone())
    } else {
        CheckpointSource::Local(catalog.resolve_checkpoint(&checkpoint)?)
    };
    let adapter = args
        .adapter
        .as_deref()
        .filter(|name| !name.is_empty())
        .map(|name| catalog.resolve_adapter(name))
        .transpose()?;

    let spec = ModelSpec {
        checkpoint: source,
        adapter,
        width: config.inference.width,
        height: config.inference.height,
    };
    let request = GenerationRequest {
        prompt: args.prompt.clone(),
        negative_prompt: args.negative_prompt,
        steps: args.steps.unwrap_or(config.inference.steps),
        guidance_scale: config.inference.guidance_scale,
        seed: args.seed,
    };

    println!("Pixel Art Generation");
    println!("====================");
    println!("Checkpoint: {}", checkpoint);
    if let Some(adapter) = &args.adapter {
        println!("Adapter: {}", adapter);
    }
    println!("Prompt: {}", request.prompt);
    println!("Render size: {}x{}", spec.width, spec.height);
    println!("Pixel size: {}", target);
    println!("Steps: {}", request.steps);
    if let Some(seed) = request.seed {
        println!("Seed: {}", seed);
    }
    println!();

    let options = SdLoaderOptions {
        use_gpu: config.inference.use_gpu && !args.cpu,
        use_f16: config.inference.use_f16,
        cache_dir: config.models.cache_dir.clone(),
        hf_token: config.models.hf_token.clone(),
    };

    let start = std::time::Instant::now();
    let full = tokio::task::spawn_blocking(move || -> Result<image::RgbImage> {
        let loader = SdLoader::new(options)?;
        let model = loader.load(&spec)?;
        println!("Model loaded: {}", model.name());
        println!("\nGenerating image...");
        Ok(model.generate(&request)?.into_image()?)
    })
    .await??;
    println!("Generation completed in {:.2}s", start.elapsed().as_secs_f64());

    let full = DynamicImage::ImageRgb8(full);
    let pixel = downscale_dynamic(&full, target)?;
    let saved = config.output_store().save(&args.prompt, &full, &pixel)?;

    println!("\nSaved full image to: {}", saved.full.display());
    println!("Saved pixel art to: {}", saved.pixel.display());
    println!("\nDone!");
    Ok(())
}
