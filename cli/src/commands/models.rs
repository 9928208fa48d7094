use anyhow::Result;
use pixelforge_core::Config;

pub fn execute() -> Result<()> {
    let config = Config::load()?;
    let catalog = config.catalog();

    println!("Checkpoints ({})", catalog.checkpoints_dir().display());
    println!("  {} (HuggingFace)", config.models.base_model);
    for name in catalog.list_checkpoints()? {
        println!("  {}", name);
    }

    println!();
    println!("Adapters ({})", catalog.adapters_dir().display());
    let adapters = catalog.list_adapters()?;
    if adapters.is_empty() {
        println!("  (none)");
    }
    for name in adapters {
        println!("  {}", name);
    }

    Ok(())
}
