//! Folder-wide nearest-neighbor downscaling

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::downscale::{decode, downscale_dynamic, TargetSize};

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp"];

#[derive(Debug, Default)]
pub struct BatchReport {
    /// Output paths that were written
    pub written: Vec<PathBuf>,
    /// Input paths that could not be processed, with the reason
    pub failed: Vec<(PathBuf, String)>,
}

pub fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.iter().any(|ext| e.eq_ignore_ascii_case(ext)))
        .unwrap_or(false)
}

/// Image files under `input_dir`, sorted. Only the top level unless `recursive`.
pub fn collect_images(input_dir: &Path, recursive: bool) -> Result<Vec<PathBuf>> {
    if !input_dir.is_dir() {
        anyhow::bail!("Input folder not found: {}", input_dir.display());
    }

    let max_depth = if recursive { usize::MAX } else { 1 };
    let mut files: Vec<PathBuf> = WalkDir::new(input_dir)
        .max_depth(max_depth)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file() && is_image_file(e.path()))
        .map(|e| e.into_path())
        .collect();
    files.sort();
    Ok(files)
}

/// Downscale one file into `output`, creating parent directories.
pub fn downscale_file(input: &Path, output: &Path, target: TargetSize) -> Result<()> {
    let bytes = fs::read(input).with_context(|| format!("failed to read {}", input.display()))?;
    let source = decode(&bytes)?;
    let resized = downscale_dynamic(&source, target)?;

    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent)?;
    }
    resized
        .save(output)
        .with_context(|| format!("failed to write {}", output.display()))?;
    Ok(())
}

/// Downscale every image in `input_dir` into `output_dir`, keeping file names.
///
/// A file that fails is recorded in the report and the batch carries on.
/// `on_file` is called after each file, whatever its outcome.
pub fn downscale_folder(
    input_dir: &Path,
    output_dir: &Path,
    target: TargetSize,
    recursive: bool,
    mut on_file: impl FnMut(&Path),
) -> Result<BatchReport> {
    let files = collect_images(input_dir, recursive)?;

    if !output_dir.exists() {
        fs::create_dir_all(output_dir)
            .with_context(|| format!("failed to create {}", output_dir.display()))?;
        tracing::info!("Created directory: {}", output_dir.display());
    }

    let mut report = BatchReport::default();
    for input in files {
        let relative = input.strip_prefix(input_dir).unwrap_or(&input);
        let output = output_dir.join(relative);

        match downscale_file(&input, &output, target) {
            Ok(()) => {
                tracing::info!("Downscaled '{}' to {} px", relative.display(), target);
                report.written.push(output);
            }
            Err(e) => {
                tracing::warn!("Could not process {}: {:#}", relative.display(), e);
                report.failed.push((input.clone(), format!("{:#}", e)));
            }
        }
        on_file(&input);
    }

    Ok(report)
}
