//! Folder batch downscale

use anyhow::Result;
use dialoguer::Input;
use indicatif::{ProgressBar, ProgressStyle};
use pixelforge_core::batch::{collect_images, downscale_folder};
use pixelforge_core::TargetSize;
use std::path::Path;

fn prompt_side(label: &str) -> Result<i64> {
    Ok(Input::<i64>::new().with_prompt(label).interact_text()?)
}

pub fn execute(
    input: &Path,
    output: &Path,
    width: Option<i64>,
    height: Option<i64>,
    recursive: bool,
) -> Result<()> {
    let width = match width {
        Some(width) => width,
        None => prompt_side("Enter Width")?,
    };
    let height = match height {
        Some(height) => height,
        None => prompt_side("Enter Height")?,
    };
    let target = TargetSize::new(width, height)?;

    let total = collect_images(input, recursive)?.len();
    if total == 0 {
        println!("No images found in {}", input.display());
        return Ok(());
    }

    let pb = ProgressBar::new(total as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
            .progress_chars("#>-"),
    );

    let report = downscale_folder(input, output, target, recursive, |file| {
        if let Some(name) = file.file_name() {
            pb.set_message(name.to_string_lossy().to_string());
        }
        pb.inc(1);
    })?;
    pb.finish_and_clear();

    println!(
        "Downscaled {} of {} images to {} px into {}",
        report.written.len(),
        total,
        target,
        output.display()
    );
    for (file, reason) in &report.failed {
        println!("  Could not process {}: {}", file.display(), reason);
    }

    Ok(())
}
