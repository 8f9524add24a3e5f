//! Payload reduction for rendered pages.
//!
//! The inference service rejects or stalls on large images, so every page is
//! brought under a byte ceiling before the first call: first a JPEG quality
//! ladder, then grayscale, then geometric downscaling down to a minimum edge.

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView};
use thiserror::Error;
use tracing::debug;

/// Qualities tried in order before giving up colour.
pub const QUALITY_LADDER: [u8; 4] = [90, 75, 60, 45];

const DOWNSCALE_FACTOR: f64 = 0.75;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ImageError {
    #[error("Failed to decode image: {0}")]
    Decode(String),

    #[error("Failed to encode image: {0}")]
    Encode(String),

    #[error("Image is still {size} bytes at the minimum size (limit {limit})")]
    TooLarge { size: usize, limit: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PayloadLimits {
    pub max_bytes: usize,
    pub min_edge_px: u32,
}

/// A JPEG ready to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub quality: u8,
    pub grayscale: bool,
}

impl EncodedImage {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Decodes a rendered page and reduces it until it fits `limits.max_bytes`.
pub fn prepare_payload(rendered: &[u8], limits: &PayloadLimits) -> Result<EncodedImage, ImageError> {
    let img = image::load_from_memory(rendered).map_err(|e| ImageError::Decode(e.to_string()))?;

    let mut last_size = 0;
    for quality in QUALITY_LADDER {
        let encoded = encode_jpeg(&img, quality, false)?;
        if encoded.len() <= limits.max_bytes {
            return Ok(encoded);
        }
        last_size = encoded.len();
    }

    let lowest = QUALITY_LADDER[QUALITY_LADDER.len() - 1];
    let mut gray = DynamicImage::ImageLuma8(img.to_luma8());
    let encoded = encode_jpeg(&gray, lowest, true)?;
    if encoded.len() <= limits.max_bytes {
        return Ok(encoded);
    }
    last_size = last_size.min(encoded.len());

    loop {
        let (width, height) = gray.dimensions();
        let Some((next_w, next_h)) = downscaled(width, height, limits.min_edge_px) else {
            return Err(ImageError::TooLarge {
                size: last_size,
                limit: limits.max_bytes,
            });
        };

        gray = gray.resize_exact(next_w, next_h, FilterType::Triangle);
        let encoded = encode_jpeg(&gray, lowest, true)?;
        debug!(
            width = next_w,
            height = next_h,
            bytes = encoded.len(),
            "Downscaled page payload"
        );
        if encoded.len() <= limits.max_bytes {
            return Ok(encoded);
        }
        last_size = encoded.len();
    }
}

/// Halves both dimensions and re-encodes at `quality`. Used after a
/// timeout; colour mode is preserved.
pub fn halve(image: &EncodedImage, quality: u8) -> Result<EncodedImage, ImageError> {
    let img =
        image::load_from_memory(&image.bytes).map_err(|e| ImageError::Decode(e.to_string()))?;
    let width = (image.width / 2).max(1);
    let height = (image.height / 2).max(1);
    let resized = img.resize_exact(width, height, FilterType::Triangle);
    encode_jpeg(&resized, quality, image.grayscale)
}

/// Next size in the downscale sequence, or `None` once the shorter edge is
/// already at the minimum.
fn downscaled(width: u32, height: u32, min_edge: u32) -> Option<(u32, u32)> {
    let short = width.min(height);
    if short <= min_edge {
        return None;
    }

    let mut scale = DOWNSCALE_FACTOR;
    if (short as f64 * scale) < min_edge as f64 {
        scale = min_edge as f64 / short as f64;
    }

    let w = ((width as f64 * scale).round() as u32).max(1);
    let h = ((height as f64 * scale).round() as u32).max(1);
    Some((w, h))
}

fn encode_jpeg(img: &DynamicImage, quality: u8, grayscale: bool) -> Result<EncodedImage, ImageError> {
    let source = if grayscale {
        DynamicImage::ImageLuma8(img.to_luma8())
    } else {
        DynamicImage::ImageRgb8(img.to_rgb8())
    };

    let mut bytes = Vec::new();
    source
        .write_with_encoder(JpegEncoder::new_with_quality(&mut bytes, quality))
        .map_err(|e| ImageError::Encode(e.to_string()))?;

    let (width, height) = source.dimensions();
    Ok(EncodedImage {
        bytes,
        width,
        height,
        quality,
        grayscale,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;

    /// Deterministic colour noise; compresses badly, which is the point.
    fn noisy_png(width: u32, height: u32) -> Vec<u8> {
        let mut state: u32 = 0x2545_f491;
        let img = RgbImage::from_fn(width, height, |_, _| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            let [r, g, b, _] = state.to_le_bytes();
            Rgb([r, g, b])
        });
        let mut buf = Vec::new();
        DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .unwrap();
        buf
    }

    fn flat_png(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_pixel(width, height, Rgb([250, 250, 250]));
        let mut buf = Vec::new();
        DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .unwrap();
        buf
    }

    #[test]
    fn test_small_page_keeps_top_quality() {
        let limits = PayloadLimits {
            max_bytes: 4 * 1024 * 1024,
            min_edge_px: 256,
        };
        let encoded = prepare_payload(&flat_png(400, 300), &limits).unwrap();
        assert_eq!(encoded.quality, 90);
        assert!(!encoded.grayscale);
        assert_eq!((encoded.width, encoded.height), (400, 300));
    }

    #[test]
    fn test_large_page_is_reduced_under_limit() {
        let limits = PayloadLimits {
            max_bytes: 30_000,
            min_edge_px: 64,
        };
        let encoded = prepare_payload(&noisy_png(600, 800), &limits).unwrap();
        assert!(encoded.len() <= limits.max_bytes);
        assert!(encoded.grayscale);
        assert!(encoded.width < 600);
        assert!(encoded.width.min(encoded.height) >= 64);
    }

    #[test]
    fn test_impossible_limit_is_too_large() {
        let limits = PayloadLimits {
            max_bytes: 10,
            min_edge_px: 256,
        };
        assert!(matches!(
            prepare_payload(&noisy_png(300, 300), &limits),
            Err(ImageError::TooLarge { limit: 10, .. })
        ));
    }

    #[test]
    fn test_garbage_input_is_decode_error() {
        let limits = PayloadLimits {
            max_bytes: 1024,
            min_edge_px: 16,
        };
        assert!(matches!(
            prepare_payload(b"not an image", &limits),
            Err(ImageError::Decode(_))
        ));
    }

    #[test]
    fn test_halve_uses_retry_quality() {
        let limits = PayloadLimits {
            max_bytes: 4 * 1024 * 1024,
            min_edge_px: 16,
        };
        let encoded = prepare_payload(&flat_png(400, 300), &limits).unwrap();
        let halved = halve(&encoded, 85).unwrap();
        assert_eq!((halved.width, halved.height), (200, 150));
        assert_eq!(halved.quality, 85);
        assert!(!halved.grayscale);
    }

    #[test]
    fn test_downscaled_sequence() {
        assert_eq!(downscaled(1000, 800, 256), Some((750, 600)));
        // Clamped so the short edge lands exactly on the minimum.
        assert_eq!(downscaled(400, 300, 256), Some((341, 256)));
        assert_eq!(downscaled(341, 256, 256), None);
    }
}
