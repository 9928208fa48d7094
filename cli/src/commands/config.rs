use anyhow::Result;
use pixelforge_core::Config;

const KEYS: &[(&str, &[&str])] = &[
    ("daemon", &["host", "port", "allowed_origins"]),
    (
        "models",
        &["checkpoints_dir", "adapters_dir", "base_model", "cache_dir", "cache_capacity", "hf_token"],
    ),
    (
        "inference",
        &["width", "height", "steps", "guidance_scale", "use_gpu", "use_f16", "max_concurrent"],
    ),
    (
        "output",
        &[
            "pixel_width",
            "pixel_height",
            "max_pixel_size",
            "save",
            "full_dir",
            "pixel_dir",
            "slug_len",
        ],
    ),
];

pub fn execute(key: Option<&str>, value: Option<&str>) -> Result<()> {
    let mut config = Config::load()?;

    match (key, value) {
        // Show all config
        (None, _) => {
            println!("Configuration file: {:?}", Config::config_path()?);
            for (section, keys) in KEYS {
                println!();
                println!("[{}]", section);
                for key in *keys {
                    let value = config.get_value(&format!("{}.{}", section, key))?;
                    let value = if value.is_empty() { "(not set)".to_string() } else { value };
                    println!("  {} = {}", key, value);
                }
            }
        }

        // Get a specific key
        (Some(key), None) => {
            println!("{}", config.get_value(key)?);
        }

        // Set a specific key
        (Some(key), Some(value)) => {
            config.set_value(key, value)?;
            config.save()?;
            println!("Set {} = {}", key, config.get_value(key)?);
        }
    }

    Ok(())
}
