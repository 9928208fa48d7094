use anyhow::Result;
use pixelforge_core::Config;
use pixelforge_runtime_diffusion::{SdLoader, SdLoaderOptions};
use std::sync::Arc;

pub async fn execute(host: Option<String>, port: Option<u16>) -> Result<()> {
    let mut config = Config::load()?;
    if let Some(host) = host {
        config.daemon.host = host;
    }
    if let Some(port) = port {
        config.daemon.port = port;
    }

    let loader = SdLoader::new(SdLoaderOptions {
        use_gpu: config.inference.use_gpu,
        use_f16: config.inference.use_f16,
        cache_dir: config.models.cache_dir.clone(),
        hf_token: config.models.hf_token.clone(),
    })?;

    println!("Starting pixelforge daemon...");
    println!("Listening on http://{}:{}", config.daemon.host, config.daemon.port);
    println!("\nAPI endpoints:");
    println!("  GET  /health           - Health check");
    println!("  GET  /api/checkpoints  - List checkpoints");
    println!("  GET  /api/loras        - List style adapters");
    println!("  POST /api/generate     - Generate pixel art");
    println!("\nPress Ctrl+C to stop.\n");

    pixelforge_daemon::run_server(config, Arc::new(loader)).await?;

    Ok(())
}
