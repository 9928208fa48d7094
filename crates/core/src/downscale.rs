//! Nearest-neighbor downscaling
//!
//! Maps every output pixel `(x, y)` to the source pixel
//! `(min(x * src_w / dst_w, src_w - 1), min(y * src_h / dst_h, src_h - 1))`
//! and copies it verbatim. No filtering, no blending: the output only ever
//! contains colors that exist in the source. The same mapping handles
//! upscaling, and equal sizes give back the source unchanged.

use image::{DynamicImage, ImageBuffer, Pixel};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DownscaleError {
    /// A source or target dimension was zero or negative
    #[error("invalid {side} dimensions {width}x{height}: width and height must be at least 1")]
    InvalidDimension {
        side: Side,
        width: i64,
        height: i64,
    },

    /// The source pixel data could not be read
    #[error("unsupported image format: {0}")]
    UnsupportedFormat(String),

    /// The output buffer would not fit in memory, or exceeds a configured limit
    #[error("target size {width}x{height} is too large")]
    TooLarge { width: u32, height: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Source,
    Target,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Source => write!(f, "source"),
            Side::Target => write!(f, "target"),
        }
    }
}

/// Requested output size. Both sides are at least 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TargetSize {
    width: u32,
    height: u32,
}

impl TargetSize {
    /// Validate a caller-supplied size.
    ///
    /// Takes signed values so that negative sizes coming from JSON or the
    /// command line surface as [`DownscaleError::InvalidDimension`].
    pub fn new(width: i64, height: i64) -> Result<Self, DownscaleError> {
        let invalid = || DownscaleError::InvalidDimension {
            side: Side::Target,
            width,
            height,
        };
        let w = u32::try_from(width).map_err(|_| invalid())?;
        let h = u32::try_from(height).map_err(|_| invalid())?;
        if w == 0 || h == 0 {
            return Err(invalid());
        }
        Ok(Self {
            width: w,
            height: h,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }
}

impl std::fmt::Display for TargetSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Output buffer length in bytes, if it is addressable
fn buffer_len<P: Pixel>(target: TargetSize) -> Option<usize> {
    let bytes = usize::try_from(target.width)
        .ok()?
        .checked_mul(usize::try_from(target.height).ok()?)?
        .checked_mul(usize::from(P::CHANNEL_COUNT))?
        .checked_mul(std::mem::size_of::<P::Subpixel>())?;
    (bytes <= isize::MAX as usize).then_some(bytes)
}

#[inline]
fn source_index(dst: u32, src_len: u32, dst_len: u32) -> u32 {
    let idx = (u64::from(dst) * u64::from(src_len)) / u64::from(dst_len);
    // idx < src_len always holds for dst < dst_len; the clamp keeps it that way
    idx.min(u64::from(src_len) - 1) as u32
}

/// Resize `source` to `target` with nearest-neighbor sampling.
///
/// Fails before allocating anything with [`DownscaleError::InvalidDimension`]
/// if the source has a zero side, or [`DownscaleError::TooLarge`] if the output
/// buffer length overflows.
pub fn downscale<P: Pixel>(
    source: &ImageBuffer<P, Vec<P::Subpixel>>,
    target: TargetSize,
) -> Result<ImageBuffer<P, Vec<P::Subpixel>>, DownscaleError> {
    let (src_w, src_h) = source.dimensions();
    if src_w == 0 || src_h == 0 {
        return Err(DownscaleError::InvalidDimension {
            side: Side::Source,
            width: i64::from(src_w),
            height: i64::from(src_h),
        });
    }

    if buffer_len::<P>(target).is_none() {
        return Err(DownscaleError::TooLarge {
            width: target.width,
            height: target.height,
        });
    }

    let (dst_w, dst_h) = (target.width, target.height);
    let columns: Vec<u32> = (0..dst_w).map(|x| source_index(x, src_w, dst_w)).collect();
    let rows: Vec<u32> = (0..dst_h).map(|y| source_index(y, src_h, dst_h)).collect();

    Ok(ImageBuffer::from_fn(dst_w, dst_h, |x, y| {
        *source.get_pixel(columns[x as usize], rows[y as usize])
    }))
}

/// [`downscale`] over any [`DynamicImage`], keeping its pixel layout.
pub fn downscale_dynamic(
    source: &DynamicImage,
    target: TargetSize,
) -> Result<DynamicImage, DownscaleError> {
    let out = match source {
        DynamicImage::ImageLuma8(img) => DynamicImage::ImageLuma8(downscale(img, target)?),
        DynamicImage::ImageLumaA8(img) => DynamicImage::ImageLumaA8(downscale(img, target)?),
        DynamicImage::ImageRgb8(img) => DynamicImage::ImageRgb8(downscale(img, target)?),
        DynamicImage::ImageRgba8(img) => DynamicImage::ImageRgba8(downscale(img, target)?),
        DynamicImage::ImageLuma16(img) => DynamicImage::ImageLuma16(downscale(img, target)?),
        DynamicImage::ImageLumaA16(img) => DynamicImage::ImageLumaA16(downscale(img, target)?),
        DynamicImage::ImageRgb16(img) => DynamicImage::ImageRgb16(downscale(img, target)?),
        DynamicImage::ImageRgba16(img) => DynamicImage::ImageRgba16(downscale(img, target)?),
        DynamicImage::ImageRgb32F(img) => DynamicImage::ImageRgb32F(downscale(img, target)?),
        DynamicImage::ImageRgba32F(img) => DynamicImage::ImageRgba32F(downscale(img, target)?),
        other => {
            return Err(DownscaleError::UnsupportedFormat(format!(
                "pixel layout {:?}",
                other.color()
            )))
        }
    };
    Ok(out)
}

/// Decode encoded image bytes (PNG, JPEG, BMP, ...).
pub fn decode(bytes: &[u8]) -> Result<DynamicImage, DownscaleError> {
    image::load_from_memory(bytes).map_err(|e| DownscaleError::UnsupportedFormat(e.to_string()))
}
