use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, Rgba, RgbaImage};
use menushot_contracts::session::MenuImage;

use crate::client::{ContentRequest, GenerativeClient, Part};

pub const MENU_IMAGE_MAX_DIM: u32 = 2048;

const OCR_INSTRUCTION: &str = "Transcribe all of the text on this restaurant menu exactly as \
written. Preserve the layout: keep each dish, description and price on its own line, in the \
order they appear. Return only the transcribed text.";

/// Reads the menu in `image`. An empty reply is `""`, not an error.
pub fn transcribe_menu(
    client: &dyn GenerativeClient,
    model: &str,
    image: &MenuImage,
) -> Result<String> {
    let request = ContentRequest::new(
        model,
        vec![
            Part::image(image.mime_type.as_str(), image.data.as_str()),
            Part::text(OCR_INSTRUCTION),
        ],
    );
    let response = client
        .generate_content(&request)
        .context("menu transcription failed")?;
    Ok(response.text().unwrap_or_default().trim().to_string())
}

/// Loads a menu photo, shrinking it to `max_dim` on the long side and
/// flattening transparency onto white. Undecodable files are sent as-is.
pub fn menu_image_from_path(path: &Path, max_dim: u32) -> Result<MenuImage> {
    let (bytes, mime_type) = prepare_menu_image(path, max_dim)?;
    Ok(MenuImage {
        data: BASE64.encode(bytes),
        mime_type,
    })
}

fn prepare_menu_image(path: &Path, max_dim: u32) -> Result<(Vec<u8>, String)> {
    let dim = max_dim.max(128);
    if let Ok(image) = image::open(path) {
        let rgba = image.to_rgba8();
        let mut flattened = RgbaImage::new(rgba.width(), rgba.height());
        for (x, y, pixel) in rgba.enumerate_pixels() {
            let alpha = u16::from(pixel[3]);
            let blend = |channel: u8| -> u8 {
                (((u16::from(channel) * alpha) + (255 * (255 - alpha))) / 255) as u8
            };
            flattened.put_pixel(
                x,
                y,
                Rgba([blend(pixel[0]), blend(pixel[1]), blend(pixel[2]), 255]),
            );
        }
        let mut flattened = DynamicImage::ImageRgba8(flattened);
        if flattened.width() > dim || flattened.height() > dim {
            flattened = flattened.resize(dim, dim, FilterType::Triangle);
        }
        let mut bytes = Vec::new();
        let mut encoder = JpegEncoder::new_with_quality(&mut bytes, 90);
        if encoder
            .encode_image(&DynamicImage::ImageRgb8(flattened.to_rgb8()))
            .is_ok()
        {
            return Ok((bytes, "image/jpeg".to_string()));
        }
    }

    let bytes = fs::read(path).with_context(|| format!("failed reading {}", path.display()))?;
    Ok((bytes, guess_image_mime(path).to_string()))
}

fn guess_image_mime(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|value| value.to_str())
        .map(|value| value.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        "heic" | "heif" => "image/heic",
        "gif" => "image/gif",
        _ => "image/png",
    }
}
