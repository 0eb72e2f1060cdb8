use anyhow::{bail, Context, Result};
use menushot_contracts::events::{EventPayload, EventWriter};
use menushot_contracts::menu::find_menu_excerpt;
use serde::Serialize;
use serde_json::{json, Value};

use crate::client::{
    error_chain_text, ContentRequest, GenerativeClient, ImageGenerationRequest, InlineImage, Part,
};
use crate::fetch::ImageFetcher;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SynthesisStrategy {
    Reference,
    Text,
}

impl SynthesisStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Reference => "reference",
            Self::Text => "text",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DishImageRequest<'a> {
    pub dish_name: &'a str,
    pub menu_text: &'a str,
    pub style_summary: Option<&'a str>,
    pub reference_url: Option<&'a str>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesizedImage {
    pub image: InlineImage,
    pub strategy: SynthesisStrategy,
}

/// Everything one synthesis call needs, borrowed from the engine.
pub struct Synthesizer<'a> {
    pub client: &'a dyn GenerativeClient,
    pub fetcher: &'a dyn ImageFetcher,
    pub edit_model: &'a str,
    pub image_model: &'a str,
    pub events: &'a EventWriter,
}

impl Synthesizer<'_> {
    /// Reference-guided first when a reference url is known, then
    /// text-to-image. Only the text-to-image step can fail the call.
    pub fn synthesize(&self, request: &DishImageRequest<'_>) -> Result<SynthesizedImage> {
        if let Some(url) = request.reference_url.filter(|url| !url.trim().is_empty()) {
            if let Some(image) = self.from_reference(request, url) {
                return Ok(SynthesizedImage {
                    image,
                    strategy: SynthesisStrategy::Reference,
                });
            }
        }
        let image = self.from_text(request)?;
        Ok(SynthesizedImage {
            image,
            strategy: SynthesisStrategy::Text,
        })
    }

    fn from_reference(&self, request: &DishImageRequest<'_>, url: &str) -> Option<InlineImage> {
        let reference = match self.fetcher.fetch(url) {
            Ok(image) => image,
            Err(err) => {
                self.record_failure("reference_fetch_failed", request.dish_name, url, &err);
                return None;
            }
        };

        let content = ContentRequest::new(
            self.edit_model,
            vec![
                Part::Image(reference),
                Part::text(reference_prompt(request.dish_name, request.style_summary)),
            ],
        )
        .with_image_output();
        let outcome = self
            .client
            .generate_content(&content)
            .context("reference-guided synthesis failed")
            .and_then(|response| match response.first_image() {
                Some(image) => Ok(image.clone()),
                None => bail!("reference-guided synthesis returned no image"),
            });
        match outcome {
            Ok(image) => Some(image),
            Err(err) => {
                self.record_failure("reference_synthesis_failed", request.dish_name, url, &err);
                None
            }
        }
    }

    fn from_text(&self, request: &DishImageRequest<'_>) -> Result<InlineImage> {
        let prompt = text_prompt(
            request.dish_name,
            find_menu_excerpt(request.dish_name, request.menu_text).as_deref(),
            request.style_summary,
        );
        let response = self
            .client
            .generate_images(&ImageGenerationRequest::square(self.image_model, prompt))
            .with_context(|| format!("text-to-image failed for '{}'", request.dish_name))?;
        match response
            .images
            .into_iter()
            .find(|image| !image.data.is_empty())
        {
            Some(image) => Ok(image),
            None => bail!("no image returned for '{}'", request.dish_name),
        }
    }

    fn record_failure(&self, event: &str, dish: &str, url: &str, err: &anyhow::Error) {
        let mut payload = EventPayload::new();
        payload.insert("dish".to_string(), json!(dish));
        payload.insert("reference_url".to_string(), json!(url));
        payload.insert(
            "error".to_string(),
            Value::String(error_chain_text(err, 512)),
        );
        self.events.record(event, payload);
    }
}

fn reference_prompt(dish_name: &str, style_summary: Option<&str>) -> String {
    let mut prompt = format!(
        "Using the attached photo as a reference for plating, style and ingredients, create a \
new, realistic, professional photograph of \"{dish_name}\". Do not reproduce the reference \
exactly."
    );
    if let Some(summary) = style_summary.map(str::trim).filter(|value| !value.is_empty()) {
        prompt.push_str(&format!(" The restaurant's style: {summary}"));
    }
    prompt
}

pub(crate) fn text_prompt(
    dish_name: &str,
    excerpt: Option<&str>,
    style_summary: Option<&str>,
) -> String {
    let mut sections = vec![format!(
        "A realistic, appetizing food photograph of \"{dish_name}\"."
    )];
    if let Some(excerpt) = excerpt.map(str::trim).filter(|value| !value.is_empty()) {
        sections.push(format!("Menu description: {excerpt}."));
    }
    match style_summary.map(str::trim).filter(|value| !value.is_empty()) {
        Some(summary) => sections.push(format!(
            "Match the restaurant's style: {summary} Plate the dish the way this restaurant \
would, use lighting that fits its ambiance, and choose a background and tableware consistent \
with it."
        )),
        None => sections.push(
            "Photograph it well-lit on a neutral background, in a professional food \
photography style."
                .to_string(),
        ),
    }
    sections.join(" ")
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::client::{ContentResponse, ImageGenerationResponse};

    #[derive(Default)]
    struct RecordingClient {
        edit_returns_image: bool,
        text_returns_image: bool,
        content_calls: Mutex<Vec<ContentRequest>>,
        image_calls: Mutex<Vec<ImageGenerationRequest>>,
    }

    impl GenerativeClient for RecordingClient {
        fn name(&self) -> &str {
            "recording"
        }

        fn generate_content(&self, request: &ContentRequest) -> Result<ContentResponse> {
            self.content_calls.lock().expect("lock").push(request.clone());
            if self.edit_returns_image {
                return Ok(ContentResponse {
                    parts: vec![Part::text("here"), Part::image("image/png", "EDIT")],
                    grounding_chunks: Vec::new(),
                });
            }
            Ok(ContentResponse::from_text("I cannot draw that."))
        }

        fn generate_images(
            &self,
            request: &ImageGenerationRequest,
        ) -> Result<ImageGenerationResponse> {
            self.image_calls.lock().expect("lock").push(request.clone());
            if !self.text_returns_image {
                return Ok(ImageGenerationResponse::default());
            }
            Ok(ImageGenerationResponse {
                images: vec![InlineImage {
                    mime_type: "image/png".to_string(),
                    data: "TEXT".to_string(),
                }],
            })
        }
    }

    struct StaticFetcher {
        ok: bool,
    }

    impl ImageFetcher for StaticFetcher {
        fn fetch(&self, url: &str) -> Result<InlineImage> {
            if !self.ok {
                bail!("404 for {url}");
            }
            Ok(InlineImage {
                mime_type: "image/jpeg".to_string(),
                data: "REF".to_string(),
            })
        }
    }

    fn synthesizer<'a>(
        client: &'a RecordingClient,
        fetcher: &'a StaticFetcher,
        events: &'a EventWriter,
    ) -> Synthesizer<'a> {
        Synthesizer {
            client,
            fetcher,
            edit_model: "edit-m",
            image_model: "image-m",
            events,
        }
    }

    const MENU: &str = "Tacos al Pastor $9\nspit-roasted pork, pineapple\nFlan $5";

    #[test]
    fn reference_strategy_wins_when_it_returns_an_image() -> anyhow::Result<()> {
        let client = RecordingClient {
            edit_returns_image: true,
            ..RecordingClient::default()
        };
        let events = EventWriter::disabled("test");
        let result = synthesizer(&client, &StaticFetcher { ok: true }, &events).synthesize(
            &DishImageRequest {
                dish_name: "Tacos al Pastor",
                menu_text: MENU,
                style_summary: Some("Neon-lit street stall."),
                reference_url: Some("https://img.test/tacos.jpg"),
            },
        )?;
        assert_eq!(result.strategy, SynthesisStrategy::Reference);
        assert_eq!(result.image.data, "EDIT");

        let calls = client.content_calls.lock().expect("lock");
        assert_eq!(calls[0].model, "edit-m");
        assert!(calls[0].wants_image());
        assert!(matches!(&calls[0].parts[0], Part::Image(img) if img.data == "REF"));
        assert!(matches!(
            &calls[0].parts[1],
            Part::Text(text) if text.contains("Neon-lit street stall.")
        ));
        assert!(client.image_calls.lock().expect("lock").is_empty());
        Ok(())
    }

    #[test]
    fn failed_fetch_falls_back_to_text_to_image() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let log = dir.path().join("events.jsonl");
        let events = EventWriter::new(&log, "test");
        let client = RecordingClient {
            edit_returns_image: true,
            text_returns_image: true,
            ..RecordingClient::default()
        };
        let result = synthesizer(&client, &StaticFetcher { ok: false }, &events).synthesize(
            &DishImageRequest {
                dish_name: "Flan",
                menu_text: MENU,
                style_summary: None,
                reference_url: Some("https://img.test/flan.jpg"),
            },
        )?;
        assert_eq!(result.strategy, SynthesisStrategy::Text);
        assert_eq!(result.image.data, "TEXT");
        assert!(client.content_calls.lock().expect("lock").is_empty());

        let logged = std::fs::read_to_string(&log)?;
        assert!(logged.contains("\"type\":\"reference_fetch_failed\""));
        assert!(logged.contains("404 for https://img.test/flan.jpg"));
        Ok(())
    }

    #[test]
    fn imageless_reference_reply_falls_back() -> anyhow::Result<()> {
        let client = RecordingClient {
            text_returns_image: true,
            ..RecordingClient::default()
        };
        let events = EventWriter::disabled("test");
        let result = synthesizer(&client, &StaticFetcher { ok: true }, &events).synthesize(
            &DishImageRequest {
                dish_name: "Flan",
                menu_text: MENU,
                style_summary: None,
                reference_url: Some("https://img.test/flan.jpg"),
            },
        )?;
        assert_eq!(result.strategy, SynthesisStrategy::Text);
        assert_eq!(client.content_calls.lock().expect("lock").len(), 1);
        Ok(())
    }

    #[test]
    fn text_prompt_uses_excerpt_and_square_request() -> anyhow::Result<()> {
        let client = RecordingClient {
            text_returns_image: true,
            ..RecordingClient::default()
        };
        let events = EventWriter::disabled("test");
        synthesizer(&client, &StaticFetcher { ok: true }, &events).synthesize(
            &DishImageRequest {
                dish_name: "Tacos al Pastor",
                menu_text: MENU,
                style_summary: None,
                reference_url: None,
            },
        )?;
        let calls = client.image_calls.lock().expect("lock");
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].model, "image-m");
        assert_eq!(calls[0].number_of_images, 1);
        assert_eq!(calls[0].aspect_ratio, "1:1");
        assert!(calls[0].prompt.contains("spit-roasted pork, pineapple"));
        assert!(calls[0].prompt.contains("well-lit on a neutral background"));
        Ok(())
    }

    #[test]
    fn no_image_from_text_to_image_is_fatal() {
        let client = RecordingClient::default();
        let events = EventWriter::disabled("test");
        let err = synthesizer(&client, &StaticFetcher { ok: false }, &events)
            .synthesize(&DishImageRequest {
                dish_name: "Flan",
                menu_text: "",
                style_summary: None,
                reference_url: None,
            })
            .unwrap_err();
        assert_eq!(err.to_string(), "no image returned for 'Flan'");
    }

    #[test]
    fn text_prompt_sections() {
        let styled = text_prompt("Flan", Some(""), Some("Candlelit bistro."));
        assert!(styled.contains("Candlelit bistro."));
        assert!(styled.contains("lighting"));
        assert!(!styled.contains("Menu description"));
        assert!(!styled.contains("neutral background"));

        let plain = text_prompt("Flan", Some("caramel custard"), None);
        assert!(plain.contains("Menu description: caramel custard."));
    }
}
