use std::io::Cursor;

use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use sha2::{Digest, Sha256};

use crate::client::{
    ContentRequest, ContentResponse, GenerativeClient, ImageGenerationRequest,
    ImageGenerationResponse, InlineImage, Part,
};

const DRYRUN_IMAGE_SIZE: u32 = 256;

/// Offline client. Every image is a solid colour derived from the prompt;
/// text requests fail so callers exercise their fallback paths.
#[derive(Debug, Default, Clone, Copy)]
pub struct DryrunClient;

impl GenerativeClient for DryrunClient {
    fn name(&self) -> &str {
        "dryrun"
    }

    fn generate_content(&self, request: &ContentRequest) -> Result<ContentResponse> {
        if !request.wants_image() {
            bail!("dryrun provider does not generate text ({})", request.model);
        }
        let prompt = prompt_text(&request.parts);
        let image = solid_png(&prompt)?;
        Ok(ContentResponse {
            parts: vec![
                Part::text(format!("dryrun {}", short_id(&prompt))),
                Part::Image(image),
            ],
            grounding_chunks: Vec::new(),
        })
    }

    fn generate_images(
        &self,
        request: &ImageGenerationRequest,
    ) -> Result<ImageGenerationResponse> {
        let images = (0..request.number_of_images.max(1))
            .map(|idx| solid_png(&format!("{}#{idx}", request.prompt)))
            .collect::<Result<Vec<_>>>()?;
        Ok(ImageGenerationResponse { images })
    }
}

fn prompt_text(parts: &[Part]) -> String {
    parts
        .iter()
        .filter_map(|part| match part {
            Part::Text(text) => Some(text.as_str()),
            Part::Image(_) => None,
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn color_from_prompt(prompt: &str) -> (u8, u8, u8) {
    let digest = Sha256::digest(prompt.as_bytes());
    (digest[0], digest[1], digest[2])
}

fn short_id(prompt: &str) -> String {
    let digest = Sha256::digest(prompt.as_bytes());
    hex::encode(&digest[..4])
}

fn solid_png(prompt: &str) -> Result<InlineImage> {
    let (r, g, b) = color_from_prompt(prompt);
    let mut image = RgbImage::new(DRYRUN_IMAGE_SIZE, DRYRUN_IMAGE_SIZE);
    for pixel in image.pixels_mut() {
        *pixel = Rgb([r, g, b]);
    }
    let mut bytes = Vec::new();
    DynamicImage::ImageRgb8(image)
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .context("dryrun image encode failed")?;
    Ok(InlineImage {
        mime_type: "image/png".to_string(),
        data: BASE64.encode(bytes),
    })
}
