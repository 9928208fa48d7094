//! Style adapters laid over a checkpoint's UNet
//!
//! An adapter is a safetensors file of UNet tensors in diffusers naming.
//! Every tensor it carries replaces the checkpoint tensor of the same name
//! and shape; the rest of the UNet is untouched. The merged weights are
//! written once per (checkpoint, adapter) pair and reused while the adapter
//! file is not newer than the merged copy.

use candle_core::{Device, Tensor};
use pixelforge_runtime_api::GenerateError;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Replace base tensors with adapter tensors. Returns how many were replaced.
pub fn overlay_tensors(
    base: &mut HashMap<String, Tensor>,
    adapter: HashMap<String, Tensor>,
) -> Result<usize, GenerateError> {
    if adapter.keys().any(|name| name.contains("lora")) {
        return Err(GenerateError::UnsupportedAdapter(
            "file holds LoRA low-rank factors; only full UNet tensor sets can be applied".into(),
        ));
    }

    let mut replaced = 0;
    for (name, tensor) in adapter {
        let target = base.get_mut(&name).ok_or_else(|| {
            GenerateError::Load(format!("adapter tensor '{}' does not exist in the UNet", name))
        })?;
        if target.dims() != tensor.dims() {
            return Err(GenerateError::Load(format!(
                "adapter tensor '{}' has shape {:?}, UNet expects {:?}",
                name,
                tensor.dims(),
                target.dims()
            )));
        }
        *target = tensor.to_dtype(target.dtype()).map_err(load_error)?;
        replaced += 1;
    }
    Ok(replaced)
}

fn load_error(e: candle_core::Error) -> GenerateError {
    GenerateError::Load(e.to_string())
}

fn is_fresh(merged: &Path, adapter: &Path) -> bool {
    let modified = |p: &Path| fs::metadata(p).and_then(|m| m.modified()).ok();
    match (modified(merged), modified(adapter)) {
        (Some(merged), Some(adapter)) => merged >= adapter,
        _ => false,
    }
}

/// File name of the merged UNet for `checkpoint_label` + `adapter`
pub fn merged_file_name(checkpoint_label: &str, adapter: &Path) -> String {
    let stem = adapter
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "adapter".to_string());
    format!("{}__{}.safetensors", checkpoint_label.replace('/', "--"), stem)
}

/// Path of UNet weights with `adapter` applied, merging on first use
pub fn merged_unet(
    base_unet: &Path,
    adapter: &Path,
    checkpoint_label: &str,
    merged_dir: &Path,
) -> Result<PathBuf, GenerateError> {
    if !adapter.is_file() {
        return Err(GenerateError::AdapterNotFound(adapter.display().to_string()));
    }

    let merged = merged_dir.join(merged_file_name(checkpoint_label, adapter));
    if is_fresh(&merged, adapter) {
        tracing::debug!("Reusing merged UNet {}", merged.display());
        return Ok(merged);
    }

    tracing::info!(
        "Applying adapter {} to {}",
        adapter.display(),
        base_unet.display()
    );
    let mut tensors = candle_core::safetensors::load(base_unet, &Device::Cpu).map_err(load_error)?;
    let adapter_tensors = candle_core::safetensors::load(adapter, &Device::Cpu).map_err(load_error)?;
    let replaced = overlay_tensors(&mut tensors, adapter_tensors)?;

    fs::create_dir_all(merged_dir).map_err(|e| GenerateError::Load(e.to_string()))?;
    candle_core::safetensors::save(&tensors, &merged).map_err(load_error)?;
    tracing::info!("Replaced {} UNet tensors, wrote {}", replaced, merged.display());

    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::DType;

    fn tensor(value: f32, shape: (usize, usize)) -> Tensor {
        Tensor::full(value, shape, &Device::Cpu).unwrap()
    }

    fn base() -> HashMap<String, Tensor> {
        HashMap::from([
            ("down_blocks.0.attentions.0.proj_in.weight".to_string(), tensor(1.0, (2, 2))),
            ("mid_block.resnets.0.conv1.weight".to_string(), tensor(1.0, (3, 1))),
        ])
    }

    fn values(t: &Tensor) -> Vec<f32> {
        t.flatten_all().unwrap().to_vec1::<f32>().unwrap()
    }

    #[test]
    fn matching_tensors_are_replaced() {
        let mut unet = base();
        let adapter = HashMap::from([(
            "mid_block.resnets.0.conv1.weight".to_string(),
            tensor(5.0, (3, 1)),
        )]);

        assert_eq!(overlay_tensors(&mut unet, adapter).unwrap(), 1);
        assert_eq!(values(&unet["mid_block.resnets.0.conv1.weight"]), vec![5.0; 3]);
        assert_eq!(values(&unet["down_blocks.0.attentions.0.proj_in.weight"]), vec![1.0; 4]);
    }

    #[test]
    fn adapter_dtype_follows_base() {
        let mut unet = base();
        let half = tensor(2.0, (2, 2)).to_dtype(DType::F16).unwrap();
        let adapter = HashMap::from([("down_blocks.0.attentions.0.proj_in.weight".to_string(), half)]);

        overlay_tensors(&mut unet, adapter).unwrap();
        assert_eq!(unet["down_blocks.0.attentions.0.proj_in.weight"].dtype(), DType::F32);
    }

    #[test]
    fn unknown_or_misshapen_tensors_are_rejected() {
        let mut unet = base();
        let adapter = HashMap::from([("not.a.unet.weight".to_string(), tensor(1.0, (1, 1)))]);
        assert!(matches!(overlay_tensors(&mut unet, adapter), Err(GenerateError::Load(_))));

        let adapter = HashMap::from([(
            "mid_block.resnets.0.conv1.weight".to_string(),
            tensor(1.0, (1, 3)),
        )]);
        assert!(matches!(overlay_tensors(&mut unet, adapter), Err(GenerateError::Load(_))));
    }

    #[test]
    fn low_rank_files_are_rejected() {
        let mut unet = base();
        let adapter = HashMap::from([(
            "lora_unet_mid_block_attentions_0_proj_in.lora_down.weight".to_string(),
            tensor(1.0, (4, 2)),
        )]);
        let err = overlay_tensors(&mut unet, adapter).unwrap_err();
        assert!(matches!(err, GenerateError::UnsupportedAdapter(_)));
        assert!(err.to_string().contains("low-rank"));
    }

    #[test]
    fn merged_file_is_written_and_reused() {
        let dir = tempfile::tempdir().unwrap();
        let base_path = dir.path().join("unet.safetensors");
        let adapter_path = dir.path().join("pixel-style.safetensors");
        candle_core::safetensors::save(&base(), &base_path).unwrap();
        let adapter = HashMap::from([(
            "mid_block.resnets.0.conv1.weight".to_string(),
            tensor(9.0, (3, 1)),
        )]);
        candle_core::safetensors::save(&adapter, &adapter_path).unwrap();

        let merged_dir = dir.path().join("merged");
        let merged = merged_unet(&base_path, &adapter_path, "org/model", &merged_dir).unwrap();
        assert_eq!(merged, merged_dir.join("org--model__pixel-style.safetensors"));

        let loaded = candle_core::safetensors::load(&merged, &Device::Cpu).unwrap();
        assert_eq!(values(&loaded["mid_block.resnets.0.conv1.weight"]), vec![9.0; 3]);

        let again = merged_unet(&base_path, &adapter_path, "org/model", &merged_dir).unwrap();
        assert_eq!(again, merged);
    }

    #[test]
    fn missing_adapter_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = merged_unet(
            &dir.path().join("unet.safetensors"),
            &dir.path().join("missing.safetensors"),
            "base",
            dir.path(),
        )
        .unwrap_err();
        assert!(matches!(err, GenerateError::AdapterNotFound(_)));
    }
}
