//! End-to-end: decoded render -> nearest-neighbor pixel art -> data URI

use base64::{prelude::BASE64_STANDARD, Engine};
use image::{DynamicImage, Rgb, RgbImage, Rgba, RgbaImage};
use pixelforge_core::downscale::{decode, downscale_dynamic, DownscaleError, TargetSize};
use pixelforge_core::encode::{to_data_uri, to_png, PNG_DATA_URI_PREFIX};
use std::collections::HashSet;

fn sprite_sheet() -> DynamicImage {
    // 512x512 made of 32x32 flat blocks, one color per block
    DynamicImage::ImageRgb8(RgbImage::from_fn(512, 512, |x, y| {
        let (bx, by) = ((x / 32) as u8, (y / 32) as u8);
        Rgb([bx * 16, by * 16, bx ^ by])
    }))
}

#[test]
fn solid_red_render_becomes_solid_red_sprite() {
    let render = DynamicImage::ImageRgb8(RgbImage::from_pixel(512, 512, Rgb([255, 0, 0])));
    let png = to_png(&render).unwrap();

    let decoded = decode(&png).unwrap();
    let sprite = downscale_dynamic(&decoded, TargetSize::new(16, 16).unwrap()).unwrap();

    assert_eq!((sprite.width(), sprite.height()), (16, 16));
    assert!(sprite.to_rgb8().pixels().all(|p| *p == Rgb([255, 0, 0])));
}

#[test]
fn block_aligned_downscale_takes_one_pixel_per_block() {
    let render = sprite_sheet();
    let sprite = downscale_dynamic(&render, TargetSize::new(16, 16).unwrap())
        .unwrap()
        .to_rgb8();
    let source = render.to_rgb8();

    for y in 0..16 {
        for x in 0..16 {
            assert_eq!(sprite.get_pixel(x, y), source.get_pixel(x * 32, y * 32));
        }
    }
}

#[test]
fn non_square_targets_use_only_source_colors() {
    let render = sprite_sheet();
    let palette: HashSet<Rgb<u8>> = render.to_rgb8().pixels().copied().collect();

    for (w, h) in [(16, 9), (3, 40), (1, 1), (700, 3)] {
        let sprite = downscale_dynamic(&render, TargetSize::new(w, h).unwrap()).unwrap();
        assert_eq!((sprite.width() as i64, sprite.height() as i64), (w, h));
        assert!(sprite.to_rgb8().pixels().all(|p| palette.contains(p)));
    }
}

#[test]
fn transparency_survives_encoding() {
    let render = DynamicImage::ImageRgba8(RgbaImage::from_fn(64, 64, |x, _| {
        if x < 32 {
            Rgba([0, 0, 0, 0])
        } else {
            Rgba([200, 100, 50, 255])
        }
    }));
    let sprite = downscale_dynamic(&render, TargetSize::new(2, 1).unwrap()).unwrap();
    let uri = to_data_uri(&sprite).unwrap();

    let png = BASE64_STANDARD
        .decode(uri.strip_prefix(PNG_DATA_URI_PREFIX).unwrap())
        .unwrap();
    let back = decode(&png).unwrap().to_rgba8();
    assert_eq!(back.get_pixel(0, 0), &Rgba([0, 0, 0, 0]));
    assert_eq!(back.get_pixel(1, 0), &Rgba([200, 100, 50, 255]));
}

#[test]
fn invalid_target_is_reported_before_any_work() {
    assert!(matches!(
        TargetSize::new(0, 16),
        Err(DownscaleError::InvalidDimension { .. })
    ));
    assert!(matches!(
        TargetSize::new(16, -16),
        Err(DownscaleError::InvalidDimension { .. })
    ));
}

#[test]
fn truncated_png_is_unsupported() {
    let png = to_png(&sprite_sheet()).unwrap();
    let err = decode(&png[..png.len() / 2]).unwrap_err();
    assert!(matches!(err, DownscaleError::UnsupportedFormat(_)));
}
