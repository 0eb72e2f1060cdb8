use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use reqwest::blocking::Client as HttpClient;
use reqwest::header::CONTENT_TYPE;

use crate::client::{truncate_text, InlineImage};

/// Downloads a reference photo for reference-guided synthesis.
pub trait ImageFetcher: Send + Sync {
    fn fetch(&self, url: &str) -> Result<InlineImage>;
}

pub struct HttpImageFetcher {
    http: HttpClient,
}

impl HttpImageFetcher {
    /// The download runs without a request timeout, like the provider calls.
    pub fn new() -> Result<Self> {
        let http = HttpClient::builder()
            .timeout(None)
            .build()
            .context("failed to build reference fetch HTTP client")?;
        Ok(Self { http })
    }
}

impl ImageFetcher for HttpImageFetcher {
    fn fetch(&self, url: &str) -> Result<InlineImage> {
        if !is_http_url(url) {
            bail!("reference url is not http(s): {url}");
        }
        let response = self
            .http
            .get(url)
            .send()
            .with_context(|| format!("failed downloading reference image ({url})"))?;
        let status = response.status();
        if !status.is_success() {
            let code = status.as_u16();
            let body = response.text().unwrap_or_default();
            bail!(
                "reference image download failed ({code}): {}",
                truncate_text(&body, 256)
            );
        }
        let mime_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.split(';').next().unwrap_or_default().trim().to_string())
            .unwrap_or_default();
        if !mime_type.starts_with("image/") {
            bail!("reference url did not return an image (content-type '{mime_type}')");
        }
        let bytes = response
            .bytes()
            .context("reference image body read failed")?;
        if bytes.is_empty() {
            bail!("reference image body is empty");
        }
        Ok(InlineImage {
            mime_type,
            data: BASE64.encode(&bytes),
        })
    }
}

pub fn is_http_url(value: &str) -> bool {
    let lowered = value.trim().to_ascii_lowercase();
    lowered.starts_with("http://") || lowered.starts_with("https://")
}
