//! GPU discovery through vendor tools

use std::process::Command;

#[derive(Debug, Clone, PartialEq)]
pub struct GpuInfo {
    pub backend: GpuBackend,
    pub name: String,
    /// Dedicated memory, or unified memory on Apple Silicon
    pub vram_mb: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GpuBackend {
    Metal,
    Cuda,
}

impl std::fmt::Display for GpuBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GpuBackend::Metal => write!(f, "Metal"),
            GpuBackend::Cuda => write!(f, "CUDA"),
        }
    }
}

/// Every GPU the host reports, whether or not this build can use it
pub fn detect_gpus() -> Vec<GpuInfo> {
    let mut gpus = detect_cuda();
    if gpus.is_empty() {
        gpus.extend(detect_metal());
    }
    gpus
}

fn detect_cuda() -> Vec<GpuInfo> {
    let output = match Command::new("nvidia-smi")
        .args([
            "--query-gpu=name,memory.total",
            "--format=csv,noheader,nounits",
        ])
        .output()
    {
        Ok(output) if output.status.success() => output,
        _ => return Vec::new(),
    };

    parse_nvidia_smi(&String::from_utf8_lossy(&output.stdout))
}

/// Parse `name, memory` lines from nvidia-smi's CSV output
pub fn parse_nvidia_smi(output: &str) -> Vec<GpuInfo> {
    output
        .lines()
        .filter_map(|line| {
            let (name, memory) = match line.rsplit_once(',') {
                Some((name, memory)) => (name, Some(memory)),
                None => (line, None),
            };
            let name = name.trim();
            if name.is_empty() {
                return None;
            }
            Some(GpuInfo {
                backend: GpuBackend::Cuda,
                name: name.to_string(),
                vram_mb: memory.and_then(|m| m.trim().parse().ok()),
            })
        })
        .collect()
}

#[cfg(target_os = "macos")]
fn detect_metal() -> Option<GpuInfo> {
    let sysctl = |key: &str| -> Option<String> {
        let output = Command::new("sysctl").args(["-n", key]).output().ok()?;
        output
            .status
            .success()
            .then(|| String::from_utf8_lossy(&output.stdout).trim().to_string())
    };

    let name = sysctl("machdep.cpu.brand_string")?;
    if !name.contains("Apple") {
        return None;
    }
    // Unified memory: the GPU shares system RAM
    let vram_mb = sysctl("hw.memsize")
        .and_then(|bytes| bytes.parse::<u64>().ok())
        .map(|bytes| bytes / (1024 * 1024));

    Some(GpuInfo {
        backend: GpuBackend::Metal,
        name,
        vram_mb,
    })
}

#[cfg(not(target_os = "macos"))]
fn detect_metal() -> Option<GpuInfo> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_multiple_gpus() {
        let out = "NVIDIA GeForce RTX 4090, 24564\nNVIDIA A100-SXM4-80GB, 81920\n";
        let gpus = parse_nvidia_smi(out);
        assert_eq!(gpus.len(), 2);
        assert_eq!(gpus[0].name, "NVIDIA GeForce RTX 4090");
        assert_eq!(gpus[0].vram_mb, Some(24564));
        assert_eq!(gpus[1].vram_mb, Some(81920));
        assert!(gpus.iter().all(|g| g.backend == GpuBackend::Cuda));
    }

    #[test]
    fn unknown_memory_keeps_the_name() {
        let gpus = parse_nvidia_smi("Tesla T4, [N/A]\n\n");
        assert_eq!(gpus.len(), 1);
        assert_eq!(gpus[0].name, "Tesla T4");
        assert_eq!(gpus[0].vram_mb, None);
    }

    #[test]
    fn empty_output_has_no_gpus() {
        assert!(parse_nvidia_smi("").is_empty());
    }
}
