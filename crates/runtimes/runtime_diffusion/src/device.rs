use candle_core::utils::{cuda_is_available, metal_is_available};
use candle_core::{DType, Device, Result};

/// Accelerator this build can drive, if any
pub fn accelerator() -> Option<&'static str> {
    if cuda_is_available() {
        Some("CUDA")
    } else if metal_is_available() {
        Some("Metal")
    } else {
        None
    }
}

pub fn select_device(use_gpu: bool) -> Result<Device> {
    if !use_gpu {
        tracing::info!("Using CPU device (GPU disabled)");
        return Ok(Device::Cpu);
    }

    if cuda_is_available() {
        tracing::info!("Using CUDA device");
        Ok(Device::new_cuda(0)?)
    } else if metal_is_available() {
        tracing::info!("Using Metal device");
        Ok(Device::new_metal(0)?)
    } else {
        #[cfg(all(target_os = "macos", target_arch = "aarch64"))]
        tracing::warn!("Running on CPU, to run on GPU(metal), build with `--features metal`");
        #[cfg(not(all(target_os = "macos", target_arch = "aarch64")))]
        tracing::warn!("Running on CPU, to run on GPU, build with `--features cuda`");
        Ok(Device::Cpu)
    }
}

/// Half precision only where it is fast and numerically safe for SD 1.x
pub fn weight_dtype(device: &Device, use_f16: bool) -> DType {
    if use_f16 && device.is_cuda() {
        DType::F16
    } else {
        DType::F32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cpu_when_gpu_disabled() {
        assert!(select_device(false).unwrap().is_cpu());
    }

    #[test]
    fn cpu_stays_f32() {
        assert_eq!(weight_dtype(&Device::Cpu, true), DType::F32);
        assert_eq!(weight_dtype(&Device::Cpu, false), DType::F32);
    }
}
