//! Image download, PNG normalisation and base64 encoding for vision APIs.

use std::io::Cursor;
use std::path::{Path, PathBuf};

use base64::{engine::general_purpose::STANDARD, Engine};
use image::{DynamicImage, ImageFormat};
use tracing::{info, warn};

use crate::scraper::ScraperHttpClient;
use crate::writer::write_atomic;

/// Longest edge of images sent to vision APIs.
pub const MAX_IMAGE_DIMENSION: u32 = 1024;

/// Shortest side below which an image is useless for object listing.
pub const MIN_IMAGE_DIMENSION: u32 = 64;

fn load(bytes: &[u8]) -> Result<DynamicImage, String> {
    image::load_from_memory(bytes)
        .map_err(|e| format!("Failed to load image: {}. Ensure it's a valid JPEG/PNG/WebP/GIF.", e))
}

/// Decode any supported format and re-encode as PNG. Alpha is kept when the
/// source has it, everything else becomes 8-bit RGB.
pub fn normalize_to_png(bytes: &[u8]) -> Result<Vec<u8>, String> {
    let img = load(bytes)?;
    let normalized = if img.color().has_alpha() {
        DynamicImage::ImageRgba8(img.to_rgba8())
    } else {
        DynamicImage::ImageRgb8(img.to_rgb8())
    };

    let mut buffer = Cursor::new(Vec::new());
    normalized
        .write_to(&mut buffer, ImageFormat::Png)
        .map_err(|e| format!("Failed to encode image to PNG: {}", e))?;
    Ok(buffer.into_inner())
}

pub fn save_png_atomic(png_bytes: &[u8], path: &Path) -> Result<(), String> {
    write_atomic(path, png_bytes).map_err(|e| format!("Failed to save image to {:?}: {}", path, e))
}

/// Resize, JPEG-encode and base64 an image for a vision request.
///
/// Returns `Ok(None)` for images whose short side is under
/// [`MIN_IMAGE_DIMENSION`]; undecodable bytes are still an error.
pub fn prepare_image_for_vision(bytes: &[u8]) -> Result<Option<String>, String> {
    let img = load(bytes)?;
    let (width, height) = (img.width(), img.height());

    if width.min(height) < MIN_IMAGE_DIMENSION {
        warn!(
            "Image too small for reliable analysis: {}x{}. Minimum dimension is {}px.",
            width, height, MIN_IMAGE_DIMENSION
        );
        return Ok(None);
    }

    let resized = resize_if_needed(img, MAX_IMAGE_DIMENSION);
    // JPEG has no alpha channel
    let rgb = DynamicImage::ImageRgb8(resized.to_rgb8());

    let mut buffer = Cursor::new(Vec::new());
    rgb.write_to(&mut buffer, ImageFormat::Jpeg)
        .map_err(|e| format!("Failed to encode image to JPEG: {}", e))?;
    let jpeg = buffer.into_inner();
    info!(
        "Prepared {}x{} image for vision ({} JPEG bytes)",
        rgb.width(),
        rgb.height(),
        jpeg.len()
    );

    Ok(Some(STANDARD.encode(&jpeg)))
}

/// Media type of images produced by [`prepare_image_for_vision`].
pub fn vision_media_type() -> &'static str {
    "image/jpeg"
}

fn resize_if_needed(img: DynamicImage, max_dimension: u32) -> DynamicImage {
    let (width, height) = (img.width(), img.height());
    if width <= max_dimension && height <= max_dimension {
        return img;
    }

    let scale = max_dimension as f32 / width.max(height) as f32;
    let new_width = ((width as f32 * scale) as u32).max(1);
    let new_height = ((height as f32 * scale) as u32).max(1);
    img.resize(new_width, new_height, image::imageops::FilterType::Lanczos3)
}

/// Download `image_url`, store it as PNG at `out_path` and hand back the
/// saved path together with the downloaded bytes.
pub async fn save_best_image(
    image_url: &str,
    out_path: &Path,
    http: &ScraperHttpClient,
) -> Result<(PathBuf, Vec<u8>), String> {
    if image_url.trim().is_empty() {
        return Err("image_url is empty.".to_string());
    }

    let bytes = http.fetch_bytes(image_url).await?;
    let png = normalize_to_png(&bytes)?;
    save_png_atomic(&png, out_path)?;

    info!("Saved best image from {} to {:?}", image_url, out_path);
    Ok((out_path.to_path_buf(), bytes))
}
