use std::sync::Arc;

use anyhow::Result;
use chrono::{SecondsFormat, Utc};
use menushot_contracts::events::EventPayload;
use menushot_contracts::session::{
    transition, InvalidTransition, MenuImage, ResultsSummary, SummaryDish, WizardAction,
    WizardState,
};
use serde_json::json;

use crate::{user_message, Engine};

/// Owns one wizard run: the state, and the provider calls each step needs.
///
/// Every method returns `Err(InvalidTransition)` when the step does not
/// accept it, leaving the state as it was. Provider failures are not
/// errors here; they land in `state().error` as user-facing messages.
pub struct WizardSession {
    engine: Arc<Engine>,
    state: WizardState,
    started_at: String,
}

impl WizardSession {
    pub fn new(engine: Arc<Engine>) -> Self {
        let started_at = now_utc_iso();
        let mut payload = EventPayload::new();
        payload.insert("provider".to_string(), json!(engine.provider_name()));
        let models = engine.models();
        payload.insert(
            "models".to_string(),
            json!({
                "ocr": models.ocr,
                "text": models.text,
                "search": models.search,
                "edit": models.edit,
                "image": models.image,
            }),
        );
        engine.events().record("session_started", payload);
        Self {
            engine,
            state: WizardState::new(),
            started_at,
        }
    }

    pub fn state(&self) -> &WizardState {
        &self.state
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn session_id(&self) -> &str {
        self.engine.events().session_id()
    }

    pub fn started_at(&self) -> &str {
        &self.started_at
    }

    fn apply(&mut self, action: WizardAction) -> Result<&WizardState, InvalidTransition> {
        self.state = transition(&self.state, action)?;
        Ok(&self.state)
    }

    fn record(&self, event: &str, payload: EventPayload) {
        self.engine.events().record(event, payload);
    }

    pub fn submit_menu_image(
        &mut self,
        image: &MenuImage,
    ) -> Result<&WizardState, InvalidTransition> {
        transition(
            &self.state,
            WizardAction::SubmitMenu {
                text: String::new(),
            },
        )?;
        self.apply(WizardAction::StartLoading)?;
        match self.engine.transcribe_menu(image) {
            Ok(text) => self.capture_menu(text, "image"),
            Err(err) => {
                let message = user_message("Failed to read menu", &err);
                let mut payload = EventPayload::new();
                payload.insert("error".to_string(), json!(message));
                self.record("menu_failed", payload);
                self.apply(WizardAction::Fail { message })
            }
        }
    }

    /// Stores typed or pasted menu text and suggests dishes from it.
    pub fn submit_menu_text(&mut self, text: &str) -> Result<&WizardState, InvalidTransition> {
        self.capture_menu(text.to_string(), "text")
    }

    fn capture_menu(
        &mut self,
        text: String,
        source: &str,
    ) -> Result<&WizardState, InvalidTransition> {
        let chars = text.chars().count();
        self.apply(WizardAction::SubmitMenu { text })?;
        let mut payload = EventPayload::new();
        payload.insert("source".to_string(), json!(source));
        payload.insert("chars".to_string(), json!(chars));
        self.record("menu_captured", payload);

        self.apply(WizardAction::StartLoading)?;
        let menu_text = self.state.menu_text.clone().unwrap_or_default();
        let suggestions = self.engine.suggest_dishes(&menu_text);
        let mut payload = EventPayload::new();
        payload.insert("dishes".to_string(), json!(suggestions.names));
        payload.insert("source".to_string(), json!(suggestions.source.as_str()));
        self.record("dishes_suggested", payload);
        self.apply(WizardAction::SuggestDishes(suggestions.names))
    }

    pub fn select_dishes(&mut self, names: &[String]) -> Result<&WizardState, InvalidTransition> {
        self.apply(WizardAction::SelectDishes(names.to_vec()))?;
        let mut payload = EventPayload::new();
        payload.insert("dishes".to_string(), json!(self.state.dish_names));
        self.record("dishes_selected", payload);
        Ok(&self.state)
    }

    pub fn skip_context(&mut self) -> Result<&WizardState, InvalidTransition> {
        self.apply(WizardAction::SkipContext)?;
        self.record_decision("skip");
        self.run_generation()
    }

    pub fn search_context(
        &mut self,
        restaurant: &str,
    ) -> Result<&WizardState, InvalidTransition> {
        self.apply(WizardAction::SubmitRestaurant {
            name: restaurant.to_string(),
        })?;
        let restaurant = self.state.restaurant_name.clone().unwrap_or_default();
        let mut payload = EventPayload::new();
        payload.insert("restaurant".to_string(), json!(restaurant));
        payload.insert("dishes".to_string(), json!(self.state.dish_names));
        self.record("context_requested", payload);

        match self.engine.resolve_context(&restaurant, &self.state.dish_names) {
            Ok(info) => {
                let mut payload = EventPayload::new();
                payload.insert("summary".to_string(), json!(info.summary));
                payload.insert("sources".to_string(), json!(info.sources.len()));
                payload.insert(
                    "references".to_string(),
                    json!(info
                        .dish_contexts
                        .iter()
                        .filter(|ctx| ctx.image_url.is_some())
                        .count()),
                );
                self.record("context_resolved", payload);
                self.apply(WizardAction::ContextFound(info))
            }
            Err(err) => {
                let message = user_message("Context search failed", &err);
                let mut payload = EventPayload::new();
                payload.insert("error".to_string(), json!(message));
                self.record("context_failed", payload);
                self.apply(WizardAction::ContextSearchFailed { message })
            }
        }
    }

    pub fn accept_context(&mut self) -> Result<&WizardState, InvalidTransition> {
        self.apply(WizardAction::AcceptContext)?;
        self.record_decision("accept");
        self.run_generation()
    }

    pub fn reject_context(&mut self) -> Result<&WizardState, InvalidTransition> {
        self.apply(WizardAction::RejectContext)?;
        self.record_decision("reject");
        self.run_generation()
    }

    pub fn dismiss_error(&mut self) -> Result<&WizardState, InvalidTransition> {
        let dismissed = self.state.error.clone();
        self.apply(WizardAction::DismissError)?;
        let mut payload = EventPayload::new();
        payload.insert("error".to_string(), json!(dismissed));
        payload.insert("step".to_string(), json!(self.state.step.as_str()));
        self.record("error_dismissed", payload);
        Ok(&self.state)
    }

    pub fn reset(&mut self) -> &WizardState {
        self.state = transition(&self.state, WizardAction::Reset).unwrap_or_default();
        self.record("session_reset", EventPayload::new());
        &self.state
    }

    fn record_decision(&self, decision: &str) {
        let mut payload = EventPayload::new();
        payload.insert("decision".to_string(), json!(decision));
        self.record("context_decision", payload);
    }

    fn run_generation(&mut self) -> Result<&WizardState, InvalidTransition> {
        let mut payload = EventPayload::new();
        payload.insert("dishes".to_string(), json!(self.state.dish_names));
        payload.insert("with_context".to_string(), json!(self.state.context.is_some()));
        self.record("generation_started", payload);

        let menu_text = self.state.menu_text.as_deref().unwrap_or_default();
        let outcome = self.engine.generate_dishes(
            menu_text,
            &self.state.dish_names,
            self.state.context.as_ref(),
        );
        match outcome {
            Ok(dishes) => {
                let mut payload = EventPayload::new();
                payload.insert("count".to_string(), json!(dishes.len()));
                self.record("generation_finished", payload);
                self.apply(WizardAction::GenerationFinished(dishes))
            }
            Err(err) => {
                let message = user_message("Image generation failed", &err);
                let mut payload = EventPayload::new();
                payload.insert("error".to_string(), json!(message));
                self.record("generation_failed", payload);
                self.apply(WizardAction::GenerationFailed { message })
            }
        }
    }

    /// Results manifest for the generated dishes; `image_paths` lines up
    /// with `state().generated`.
    pub fn results_summary(&self, image_paths: &[String]) -> ResultsSummary {
        let context = self.state.context.as_ref();
        let dishes = self
            .state
            .generated
            .iter()
            .enumerate()
            .map(|(index, dish)| SummaryDish {
                name: dish.name.clone(),
                image_path: image_paths.get(index).cloned().unwrap_or_default(),
                reference_url: context
                    .and_then(|info| info.reference_for(index))
                    .map(str::to_string),
            })
            .collect();
        ResultsSummary {
            session_id: self.session_id().to_string(),
            started_at: self.started_at.clone(),
            finished_at: now_utc_iso(),
            restaurant_name: context.and(self.state.restaurant_name.clone()),
            context_summary: context.map(|info| info.summary.clone()),
            sources: context.map(|info| info.sources.clone()).unwrap_or_default(),
            dishes,
        }
    }
}

fn now_utc_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false)
}
