pub mod client;
pub mod config;
pub mod context;
pub mod dishes;
pub mod dryrun;
pub mod fetch;
pub mod gemini;
pub mod ocr;
pub mod session;
pub mod synth;
#[cfg(test)]
mod test_http;

use std::sync::Arc;
use std::thread;

use anyhow::{anyhow, Result};
use menushot_contracts::events::{EventPayload, EventWriter};
use menushot_contracts::session::{ContextualInfo, GeneratedDish, MenuImage};
use serde_json::json;

pub use crate::client::{
    ContentRequest, ContentResponse, GenerativeClient, GroundingChunk, ImageGenerationRequest,
    ImageGenerationResponse, InlineImage, Part,
};
pub use crate::config::{EngineConfig, EngineModels, ModelOverrides};
pub use crate::dishes::{DishSource, DishSuggestions};
pub use crate::fetch::{HttpImageFetcher, ImageFetcher};
pub use crate::session::WizardSession;
pub use crate::synth::{DishImageRequest, SynthesisStrategy, SynthesizedImage, Synthesizer};

use crate::client::error_chain_text;

pub const UNKNOWN_ERROR_MESSAGE: &str = "An unknown error occurred.";

/// Shared, read-only handle on the provider plus the models chosen for
/// each capability. Cheap to share across generation workers.
pub struct Engine {
    client: Arc<dyn GenerativeClient>,
    fetcher: Arc<dyn ImageFetcher>,
    models: EngineModels,
    events: EventWriter,
}

impl Engine {
    pub fn new(
        client: Arc<dyn GenerativeClient>,
        fetcher: Arc<dyn ImageFetcher>,
        models: EngineModels,
        events: EventWriter,
    ) -> Self {
        Self {
            client,
            fetcher,
            models,
            events,
        }
    }

    pub fn from_config(config: &EngineConfig, events: EventWriter) -> Result<Self> {
        Ok(Self::new(
            config.build_client()?,
            Arc::new(HttpImageFetcher::new()?),
            config.models.clone(),
            events,
        ))
    }

    pub fn models(&self) -> &EngineModels {
        &self.models
    }

    pub fn events(&self) -> &EventWriter {
        &self.events
    }

    pub fn provider_name(&self) -> &str {
        self.client.name()
    }

    pub fn transcribe_menu(&self, image: &MenuImage) -> Result<String> {
        ocr::transcribe_menu(self.client.as_ref(), &self.models.ocr, image)
    }

    pub fn suggest_dishes(&self, menu_text: &str) -> DishSuggestions {
        let suggestions =
            dishes::extract_dish_names(self.client.as_ref(), &self.models.text, menu_text);
        if let Some(reason) = suggestions.fallback_reason.as_deref() {
            let mut payload = EventPayload::new();
            payload.insert("reason".to_string(), json!(reason));
            payload.insert("dishes".to_string(), json!(suggestions.names));
            self.events.record("dish_extraction_fallback", payload);
        }
        suggestions
    }

    pub fn resolve_context(
        &self,
        restaurant: &str,
        dish_names: &[String],
    ) -> Result<ContextualInfo> {
        context::resolve_context(
            self.client.as_ref(),
            &self.models.search,
            &self.models.text,
            restaurant,
            dish_names,
        )
    }

    fn synthesizer(&self) -> Synthesizer<'_> {
        Synthesizer {
            client: self.client.as_ref(),
            fetcher: self.fetcher.as_ref(),
            edit_model: &self.models.edit,
            image_model: &self.models.image,
            events: &self.events,
        }
    }

    pub fn synthesize_dish(&self, request: &DishImageRequest<'_>) -> Result<SynthesizedImage> {
        self.synthesizer().synthesize(request)
    }

    /// Generates one image per dish, concurrently, in dish order.
    ///
    /// All-or-nothing: if any dish fails the first failure in dish order is
    /// returned and no partial list escapes.
    pub fn generate_dishes(
        &self,
        menu_text: &str,
        dish_names: &[String],
        context: Option<&ContextualInfo>,
    ) -> Result<Vec<GeneratedDish>> {
        let style_summary = context.map(|info| info.summary.as_str());
        let outcomes: Vec<Result<GeneratedDish>> = thread::scope(|scope| {
            let handles: Vec<_> = dish_names
                .iter()
                .enumerate()
                .map(|(index, dish_name)| {
                    let reference_url = context.and_then(|info| info.reference_for(index));
                    scope.spawn(move || {
                        self.generate_one(&DishImageRequest {
                            dish_name,
                            menu_text,
                            style_summary,
                            reference_url,
                        })
                    })
                })
                .collect();
            handles
                .into_iter()
                .zip(dish_names)
                .map(|(handle, dish_name)| {
                    handle.join().unwrap_or_else(|_| {
                        Err(anyhow!("generation worker for '{dish_name}' panicked"))
                    })
                })
                .collect()
        });
        outcomes.into_iter().collect()
    }

    fn generate_one(&self, request: &DishImageRequest<'_>) -> Result<GeneratedDish> {
        let synthesized = self.synthesize_dish(request)?;
        let mut payload = EventPayload::new();
        payload.insert("dish".to_string(), json!(request.dish_name));
        payload.insert("strategy".to_string(), json!(synthesized.strategy.as_str()));
        payload.insert("mime_type".to_string(), json!(synthesized.image.mime_type));
        payload.insert("reference_url".to_string(), json!(request.reference_url));
        self.events.record("dish_generated", payload);
        Ok(GeneratedDish {
            name: request.dish_name.to_string(),
            image_data: synthesized.image.data,
            mime_type: synthesized.image.mime_type,
        })
    }
}

/// Human-readable message for a failed step, e.g.
/// `"Context search failed: quota exceeded"`.
pub fn user_message(prefix: &str, err: &anyhow::Error) -> String {
    let detail = error_chain_text(err, 512);
    if detail.is_empty() {
        return UNKNOWN_ERROR_MESSAGE.to_string();
    }
    format!("{prefix}: {detail}")
}
