//! PNG and data-URI encoding for transport

use anyhow::{Context, Result};
use base64::{prelude::BASE64_STANDARD, Engine};
use image::DynamicImage;
use std::io::Cursor;

pub const PNG_DATA_URI_PREFIX: &str = "data:image/png;base64,";

pub fn to_png(img: &DynamicImage) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    img.write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
        .context("failed to encode image as PNG")?;
    Ok(bytes)
}

/// Encode as `data:image/png;base64,...`, ready to drop into an `<img src>`.
pub fn to_data_uri(img: &DynamicImage) -> Result<String> {
    let png = to_png(img)?;
    Ok(format!("{}{}", PNG_DATA_URI_PREFIX, BASE64_STANDARD.encode(png)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn data_uri_round_trips_pixels() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_fn(16, 16, |x, y| {
            Rgb([x as u8 * 16, y as u8 * 16, 0])
        }));
        let uri = to_data_uri(&img).unwrap();
        let payload = uri.strip_prefix(PNG_DATA_URI_PREFIX).unwrap();
        let png = BASE64_STANDARD.decode(payload).unwrap();
        let decoded = image::load_from_memory(&png).unwrap();
        assert_eq!(decoded.to_rgb8(), img.to_rgb8());
    }

    #[test]
    fn png_has_signature() {
        let img = DynamicImage::ImageRgb8(RgbImage::new(1, 1));
        let png = to_png(&img).unwrap();
        assert_eq!(&png[..8], b"\x89PNG\r\n\x1a\n");
    }
}
