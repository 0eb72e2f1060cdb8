use anyhow::Result;
use serde_json::Value;

/// Base64 image bytes plus their MIME type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineImage {
    pub mime_type: String,
    pub data: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Part {
    Text(String),
    Image(InlineImage),
}

impl Part {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    pub fn image(mime_type: impl Into<String>, data: impl Into<String>) -> Self {
        Self::Image(InlineImage {
            mime_type: mime_type.into(),
            data: data.into(),
        })
    }
}

/// One `generateContent`-style call.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ContentRequest {
    pub model: String,
    pub parts: Vec<Part>,
    pub response_mime_type: Option<String>,
    pub response_schema: Option<Value>,
    pub response_modalities: Vec<String>,
    pub google_search: bool,
}

impl ContentRequest {
    pub fn new(model: impl Into<String>, parts: Vec<Part>) -> Self {
        Self {
            model: model.into(),
            parts,
            ..Self::default()
        }
    }

    /// Constrains the reply to JSON matching `schema`.
    pub fn with_json_schema(mut self, schema: Value) -> Self {
        self.response_mime_type = Some("application/json".to_string());
        self.response_schema = Some(schema);
        self
    }

    pub fn with_google_search(mut self) -> Self {
        self.google_search = true;
        self
    }

    pub fn with_image_output(mut self) -> Self {
        self.response_modalities = vec!["TEXT".to_string(), "IMAGE".to_string()];
        self
    }

    pub fn wants_image(&self) -> bool {
        self.response_modalities.iter().any(|value| value == "IMAGE")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GroundingChunk {
    pub title: Option<String>,
    pub uri: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ContentResponse {
    pub parts: Vec<Part>,
    pub grounding_chunks: Vec<GroundingChunk>,
}

impl ContentResponse {
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            parts: vec![Part::Text(text.into())],
            grounding_chunks: Vec::new(),
        }
    }

    /// Concatenated text parts, `None` when the reply carried no text.
    pub fn text(&self) -> Option<String> {
        let texts: Vec<&str> = self
            .parts
            .iter()
            .filter_map(|part| match part {
                Part::Text(text) => Some(text.as_str()),
                Part::Image(_) => None,
            })
            .collect();
        if texts.is_empty() {
            return None;
        }
        Some(texts.concat())
    }

    pub fn first_image(&self) -> Option<&InlineImage> {
        self.parts.iter().find_map(|part| match part {
            Part::Image(image) if !image.data.is_empty() => Some(image),
            _ => None,
        })
    }
}

/// One text-to-image (`predict`) call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageGenerationRequest {
    pub model: String,
    pub prompt: String,
    pub number_of_images: u32,
    pub aspect_ratio: String,
}

impl ImageGenerationRequest {
    pub fn square(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            prompt: prompt.into(),
            number_of_images: 1,
            aspect_ratio: "1:1".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ImageGenerationResponse {
    pub images: Vec<InlineImage>,
}

/// The hosted generative model, as seen by every adapter.
///
/// Implementations are built once and shared across generation workers,
/// so they must not keep per-call state.
pub trait GenerativeClient: Send + Sync {
    fn name(&self) -> &str;
    fn generate_content(&self, request: &ContentRequest) -> Result<ContentResponse>;
    fn generate_images(&self, request: &ImageGenerationRequest)
        -> Result<ImageGenerationResponse>;
}

pub(crate) fn strip_code_fence(text: &str) -> String {
    let raw = text.trim();
    if !(raw.starts_with("```") && raw.ends_with("```")) {
        return raw.to_string();
    }
    let lines: Vec<&str> = raw.lines().collect();
    if lines.len() < 2 {
        return raw.to_string();
    }
    let mut body = lines[1..lines.len() - 1].join("\n").trim().to_string();
    if body.to_ascii_lowercase().starts_with("json") {
        body = body[4..].trim().to_string();
    }
    body
}

pub(crate) fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}

pub(crate) fn error_chain_text(err: &anyhow::Error, max_chars: usize) -> String {
    let mut parts: Vec<String> = Vec::new();
    for cause in err.chain() {
        let text = cause.to_string();
        let trimmed = text.trim();
        if trimmed.is_empty() {
            continue;
        }
        if parts.last().map(|existing| existing == trimmed).unwrap_or(false) {
            continue;
        }
        parts.push(trimmed.to_string());
    }
    truncate_text(&parts.join(": "), max_chars)
}
