use pixelforge_runtime_diffusion::accelerator;

use crate::gpu::detect_gpus;

pub fn execute() {
    println!("--- Checking for GPU Acceleration ---");
    println!();

    let gpus = detect_gpus();
    match accelerator() {
        Some(backend) => {
            println!("GPU acceleration is available ({}).", backend);
            println!("Number of GPUs found: {}", gpus.len());
            for (i, gpu) in gpus.iter().enumerate() {
                match gpu.vram_mb {
                    Some(mb) => println!("  - GPU {}: {} ({:.1} GB)", i, gpu.name, mb as f64 / 1024.0),
                    None => println!("  - GPU {}: {}", i, gpu.name),
                }
            }
        }
        None => {
            println!("GPU acceleration is not available.");
            println!("Generation will run on the CPU instead. This will be very slow.");
            if gpus.is_empty() {
                println!("Please ensure you have installed the correct NVIDIA drivers.");
            } else {
                for gpu in &gpus {
                    println!("  Found {} GPU: {}", gpu.backend, gpu.name);
                }
                #[cfg(target_os = "macos")]
                println!("Rebuild with `--features metal` to use it.");
                #[cfg(not(target_os = "macos"))]
                println!("Rebuild with `--features cuda` to use it.");
            }
        }
    }
}
