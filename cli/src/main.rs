mod commands;
mod gpu;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "pixelforge")]
#[command(author, version, about = "Generate pixel art from text prompts", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve {
        /// Host to bind to (defaults to daemon.host)
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on (defaults to daemon.port)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Generate one pixel-art image without the server
    Generate {
        /// Text prompt for image generation
        prompt: String,

        /// Negative prompt (for CFG)
        #[arg(long)]
        negative_prompt: Option<String>,

        /// Local checkpoint name or the hub base model (defaults to models.base_model)
        #[arg(short, long)]
        checkpoint: Option<String>,

        /// Style adapter file in the adapters directory
        #[arg(short, long)]
        adapter: Option<String>,

        /// Pixel-art width (defaults to output.pixel_width)
        #[arg(long, allow_negative_numbers = true)]
        width: Option<i64>,

        /// Pixel-art height (defaults to output.pixel_height)
        #[arg(long, allow_negative_numbers = true)]
        height: Option<i64>,

        /// Number of inference steps
        #[arg(short, long)]
        steps: Option<u32>,

        /// Random seed for reproducibility
        #[arg(long)]
        seed: Option<u64>,

        /// Run on CPU instead of GPU
        #[arg(long)]
        cpu: bool,
    },

    /// Downscale every image in a folder with nearest-neighbor sampling
    Downscale {
        /// Folder with the source images
        #[arg(short, long, default_value = "input_images")]
        input: PathBuf,

        /// Folder for the downscaled copies
        #[arg(short, long, default_value = "downscaled_images")]
        output: PathBuf,

        /// Target width (prompted for when omitted)
        #[arg(long, allow_negative_numbers = true)]
        width: Option<i64>,

        /// Target height (prompted for when omitted)
        #[arg(long, allow_negative_numbers = true)]
        height: Option<i64>,

        /// Include images in sub-folders
        #[arg(short, long)]
        recursive: bool,
    },

    /// Check whether GPU acceleration is available
    Gpu,

    /// List checkpoints and style adapters
    #[command(alias = "ls")]
    Models,

    /// View or set configuration
    Config {
        /// Config key (e.g., "daemon.port", "output.pixel_width")
        key: Option<String>,

        /// Value to set (if omitted, shows current value)
        value: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { host, port } => {
            commands::serve::execute(host, port).await?;
        }
        Commands::Generate {
            prompt,
            negative_prompt,
            checkpoint,
            adapter,
            width,
            height,
            steps,
            seed,
            cpu,
        } => {
            commands::generate::execute(commands::generate::GenerateArgs {
                prompt,
                negative_prompt,
                checkpoint,
                adapter,
                width,
                height,
                steps,
                seed,
                cpu,
            })
            .await?;
        }
        Commands::Downscale {
            input,
            output,
            width,
            height,
            recursive,
        } => {
            commands::downscale::execute(&input, &output, width, height, recursive)?;
        }
        Commands::Gpu => {
            commands::gpu::execute();
        }
        Commands::Models => {
            commands::models::execute()?;
        }
        Commands::Config { key, value } => {
            commands::config::execute(key.as_deref(), value.as_deref())?;
        }
    }

    Ok(())
}
