use anyhow::{bail, Context, Result};
use reqwest::blocking::{Client as HttpClient, Response as HttpResponse};
use serde_json::{json, Map, Value};

use crate::client::{
    truncate_text, ContentRequest, ContentResponse, GenerativeClient, GroundingChunk,
    ImageGenerationRequest, ImageGenerationResponse, InlineImage, Part,
};

pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// REST client for `generateContent` and Imagen `predict`.
pub struct GeminiClient {
    api_base: String,
    api_key: String,
    http: HttpClient,
}

impl GeminiClient {
    /// Provider calls are never cut short: the HTTP client runs without a
    /// request timeout.
    pub fn new(api_key: impl Into<String>, api_base: Option<&str>) -> Result<Self> {
        let api_base = api_base
            .map(|value| value.trim().trim_end_matches('/').to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string());
        let http = HttpClient::builder()
            .timeout(None)
            .build()
            .context("failed to build Gemini HTTP client")?;
        Ok(Self {
            api_base,
            api_key: api_key.into(),
            http,
        })
    }

    fn endpoint(&self, model: &str, method: &str) -> String {
        let trimmed = model.trim();
        let model_path = if trimmed.starts_with("models/") {
            trimmed.to_string()
        } else {
            format!("models/{trimmed}")
        };
        format!("{}/{}:{}", self.api_base, model_path, method)
    }

    fn post(&self, label: &str, endpoint: &str, payload: &Value) -> Result<Value> {
        let response = self
            .http
            .post(endpoint)
            .query(&[("key", self.api_key.as_str())])
            .json(payload)
            .send()
            .with_context(|| format!("{label} request failed"))?;
        response_json_or_error(label, response)
    }
}

impl GenerativeClient for GeminiClient {
    fn name(&self) -> &str {
        "gemini"
    }

    fn generate_content(&self, request: &ContentRequest) -> Result<ContentResponse> {
        let endpoint = self.endpoint(&request.model, "generateContent");
        let payload = build_content_payload(request);
        let response = self.post("Gemini", &endpoint, &payload)?;
        parse_content_response(&response)
    }

    fn generate_images(
        &self,
        request: &ImageGenerationRequest,
    ) -> Result<ImageGenerationResponse> {
        let endpoint = self.endpoint(&request.model, "predict");
        let payload = build_predict_payload(request);
        let response = self.post("Imagen", &endpoint, &payload)?;
        Ok(ImageGenerationResponse {
            images: extract_predictions(&response),
        })
    }
}

pub(crate) fn build_content_payload(request: &ContentRequest) -> Value {
    let parts: Vec<Value> = request
        .parts
        .iter()
        .map(|part| match part {
            Part::Text(text) => json!({ "text": text }),
            Part::Image(image) => json!({
                "inlineData": {
                    "mimeType": image.mime_type,
                    "data": image.data,
                }
            }),
        })
        .collect();

    let mut payload = Map::new();
    payload.insert(
        "contents".to_string(),
        json!([{ "role": "user", "parts": parts }]),
    );

    let mut generation_config = Map::new();
    if let Some(mime) = request.response_mime_type.as_ref() {
        generation_config.insert("responseMimeType".to_string(), json!(mime));
    }
    if let Some(schema) = request.response_schema.as_ref() {
        generation_config.insert("responseSchema".to_string(), schema.clone());
    }
    if !request.response_modalities.is_empty() {
        generation_config.insert(
            "responseModalities".to_string(),
            json!(request.response_modalities),
        );
    }
    if !generation_config.is_empty() {
        payload.insert(
            "generationConfig".to_string(),
            Value::Object(generation_config),
        );
    }
    if request.google_search {
        payload.insert("tools".to_string(), json!([{ "googleSearch": {} }]));
    }
    Value::Object(payload)
}

pub(crate) fn build_predict_payload(request: &ImageGenerationRequest) -> Value {
    json!({
        "instances": [{ "prompt": request.prompt }],
        "parameters": {
            "sampleCount": request.number_of_images.max(1),
            "aspectRatio": request.aspect_ratio,
        }
    })
}

pub(crate) fn parse_content_response(payload: &Value) -> Result<ContentResponse> {
    if let Some(reason) = payload
        .get("promptFeedback")
        .and_then(|feedback| feedback.get("blockReason"))
        .and_then(Value::as_str)
    {
        bail!("Gemini blocked the request ({reason})");
    }

    let Some(candidate) = payload
        .get("candidates")
        .and_then(Value::as_array)
        .and_then(|rows| rows.first())
    else {
        return Ok(ContentResponse::default());
    };

    let mut out = ContentResponse::default();
    let parts = candidate
        .get("content")
        .and_then(|content| content.get("parts"))
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    for part in parts {
        if let Some(text) = part.get("text").and_then(Value::as_str) {
            out.parts.push(Part::text(text));
            continue;
        }
        let Some(inline) = part
            .get("inlineData")
            .or_else(|| part.get("inline_data"))
            .and_then(Value::as_object)
        else {
            continue;
        };
        let data = inline
            .get("data")
            .and_then(Value::as_str)
            .unwrap_or_default();
        if data.is_empty() {
            continue;
        }
        let mime_type = inline
            .get("mimeType")
            .or_else(|| inline.get("mime_type"))
            .and_then(Value::as_str)
            .unwrap_or("image/png");
        out.parts.push(Part::image(mime_type, data));
    }

    let chunks = candidate
        .get("groundingMetadata")
        .and_then(|meta| meta.get("groundingChunks"))
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    for chunk in chunks {
        let Some(web) = chunk.get("web").and_then(Value::as_object) else {
            continue;
        };
        out.grounding_chunks.push(GroundingChunk {
            title: web.get("title").and_then(Value::as_str).map(str::to_string),
            uri: web.get("uri").and_then(Value::as_str).map(str::to_string),
        });
    }
    Ok(out)
}

pub(crate) fn extract_predictions(payload: &Value) -> Vec<InlineImage> {
    let mut out = Vec::new();
    let predictions = payload
        .get("predictions")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    for row in predictions {
        let Some(obj) = row.as_object() else {
            continue;
        };
        let nested = obj
            .get("image")
            .or_else(|| obj.get("generatedImage"))
            .and_then(Value::as_object);
        let encoded = obj
            .get("bytesBase64Encoded")
            .or_else(|| obj.get("bytes_base64_encoded"))
            .or_else(|| nested.and_then(|img| img.get("imageBytes")))
            .or_else(|| nested.and_then(|img| img.get("bytesBase64Encoded")))
            .and_then(Value::as_str)
            .unwrap_or_default();
        if encoded.is_empty() {
            continue;
        }
        let mime_type = obj
            .get("mimeType")
            .or_else(|| obj.get("mime_type"))
            .or_else(|| nested.and_then(|img| img.get("mimeType")))
            .and_then(Value::as_str)
            .unwrap_or("image/png");
        out.push(InlineImage {
            mime_type: mime_type.to_string(),
            data: encoded.to_string(),
        });
    }
    out
}

pub(crate) fn response_json_or_error(provider: &str, response: HttpResponse) -> Result<Value> {
    let status = response.status();
    let code = status.as_u16();
    let body = response
        .text()
        .with_context(|| format!("{provider} response body read failed"))?;
    if !status.is_success() {
        bail!(
            "{provider} request failed ({code}): {}",
            truncate_text(&body, 512)
        );
    }
    let parsed: Value = serde_json::from_str(&body)
        .with_context(|| format!("{provider} returned invalid JSON payload"))?;
    Ok(parsed)
}
