//! Pixel-level JPEG encode/decode for thumbnails and replacement images.
//!
//! The lossless path never goes through here; only images supplied as pixels
//! (`set_image`, `set_thumbnail`) are compressed.

use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ExtendedColorType, ImageEncoder, ImageFormat};

/// Compresses `image` as a baseline JPEG. Grayscale images stay single-channel;
/// everything else is flattened to RGB.
pub fn encode_jpeg(image: &DynamicImage, quality: u8) -> Result<Vec<u8>, String> {
    let (width, height) = (image.width(), image.height());
    if width == 0 || height == 0 {
        return Err("cannot encode an empty image".to_string());
    }
    let mut buf = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut buf, quality.clamp(1, 100));
    let written = match image {
        DynamicImage::ImageLuma8(gray) => encoder.write_image(gray.as_raw(), width, height, ExtendedColorType::L8),
        other => {
            let rgb = other.to_rgb8();
            encoder.write_image(rgb.as_raw(), width, height, ExtendedColorType::Rgb8)
        }
    };
    written.map_err(|e| format!("JPEG encode: {e}"))?;
    Ok(buf)
}

pub fn decode_jpeg(bytes: &[u8]) -> Result<DynamicImage, String> {
    image::load_from_memory_with_format(bytes, ImageFormat::Jpeg).map_err(|e| format!("JPEG decode: {e}"))
}
