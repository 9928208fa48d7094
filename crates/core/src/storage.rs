//! Persistence of generated images
//!
//! Every generation produces two files with the same name: the full-size
//! render in `full_dir` and the pixel-art copy in `pixel_dir`. Names are
//! `<timestamp>_<prompt slug>.png`.

use anyhow::{Context, Result};
use chrono::Local;
use image::DynamicImage;
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct OutputStore {
    full_dir: PathBuf,
    pixel_dir: PathBuf,
    slug_len: usize,
}

/// Where a generation was written
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedImages {
    pub full: PathBuf,
    pub pixel: PathBuf,
}

impl OutputStore {
    pub fn new(full_dir: impl Into<PathBuf>, pixel_dir: impl Into<PathBuf>, slug_len: usize) -> Self {
        Self {
            full_dir: full_dir.into(),
            pixel_dir: pixel_dir.into(),
            slug_len,
        }
    }

    pub fn save(&self, prompt: &str, full: &DynamicImage, pixel: &DynamicImage) -> Result<SavedImages> {
        let timestamp = Local::now().format("%Y%m%d_%H%M%S");
        let stem = format!("{}_{}", timestamp, prompt_slug(prompt, self.slug_len));
        self.save_with_stem(&stem, full, pixel)
    }

    fn save_with_stem(&self, stem: &str, full: &DynamicImage, pixel: &DynamicImage) -> Result<SavedImages> {
        fs::create_dir_all(&self.full_dir)
            .with_context(|| format!("failed to create {}", self.full_dir.display()))?;
        fs::create_dir_all(&self.pixel_dir)
            .with_context(|| format!("failed to create {}", self.pixel_dir.display()))?;

        let name = self.free_name(stem);
        let full_path = self.full_dir.join(&name);
        let pixel_path = self.pixel_dir.join(&name);

        full.save_with_format(&full_path, image::ImageFormat::Png)
            .with_context(|| format!("failed to write {}", full_path.display()))?;
        pixel
            .save_with_format(&pixel_path, image::ImageFormat::Png)
            .with_context(|| format!("failed to write {}", pixel_path.display()))?;

        tracing::info!("Saved {} and {}", full_path.display(), pixel_path.display());

        Ok(SavedImages {
            full: full_path,
            pixel: pixel_path,
        })
    }

    /// First `<stem>.png`, `<stem>-1.png`, ... not taken in either directory.
    fn free_name(&self, stem: &str) -> String {
        let taken = |name: &str| self.full_dir.join(name).exists() || self.pixel_dir.join(name).exists();

        let mut name = format!("{}.png", stem);
        let mut n = 1;
        while taken(&name) {
            name = format!("{}-{}.png", stem, n);
            n += 1;
        }
        name
    }
}

/// Filesystem-safe, truncated form of a prompt.
pub fn prompt_slug(prompt: &str, max_len: usize) -> String {
    let mut slug = String::with_capacity(prompt.len());
    for c in prompt.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('_') {
            slug.push('_');
        }
    }

    // slug is ASCII, byte truncation is safe
    slug.truncate(max_len);
    let slug = slug.trim_matches('_');

    if slug.is_empty() {
        "image".to_string()
    } else {
        slug.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn slug_collapses_and_lowercases() {
        assert_eq!(
            prompt_slug("A pixelated knight, with sword!  16-bit style", 100),
            "a_pixelated_knight_with_sword_16_bit_style"
        );
    }

    #[test]
    fn slug_truncates_without_trailing_separator() {
        assert_eq!(prompt_slug("hello world foo", 6), "hello");
        assert_eq!(prompt_slug("hello world foo", 8), "hello_wo");
    }

    #[test]
    fn slug_of_symbols_falls_back() {
        assert_eq!(prompt_slug("!!! ???", 30), "image");
        assert_eq!(prompt_slug("", 30), "image");
        assert_eq!(prompt_slug("日本語 castle", 30), "castle");
    }

    #[test]
    fn saves_both_images_under_same_name() {
        let dir = tempfile::tempdir().unwrap();
        let store = OutputStore::new(dir.path().join("full"), dir.path().join("pixel"), 30);
        let full = DynamicImage::ImageRgb8(RgbImage::from_pixel(64, 64, Rgb([1, 2, 3])));
        let pixel = DynamicImage::ImageRgb8(RgbImage::from_pixel(16, 16, Rgb([1, 2, 3])));

        let saved = store.save("a red dragon", &full, &pixel).unwrap();

        assert_eq!(saved.full.file_name(), saved.pixel.file_name());
        let name = saved.full.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.ends_with("_a_red_dragon.png"), "{}", name);
        assert_eq!(image::open(&saved.pixel).unwrap().width(), 16);
        assert_eq!(image::open(&saved.full).unwrap().width(), 64);
    }

    #[test]
    fn name_collisions_get_suffix() {
        let dir = tempfile::tempdir().unwrap();
        let store = OutputStore::new(dir.path().join("full"), dir.path().join("pixel"), 30);
        let img = DynamicImage::ImageRgb8(RgbImage::new(2, 2));

        let first = store.save_with_stem("20260101_000000_cat", &img, &img).unwrap();
        let second = store.save_with_stem("20260101_000000_cat", &img, &img).unwrap();

        assert!(first.full.ends_with("20260101_000000_cat.png"));
        assert!(second.full.ends_with("20260101_000000_cat-1.png"));
        assert!(second.pixel.ends_with("20260101_000000_cat-1.png"));
    }
}
