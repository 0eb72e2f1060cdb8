use anyhow::{bail, Result};
use menushot_contracts::menu::heuristic_dish_names;
use serde::Serialize;
use serde_json::{json, Value};

use crate::client::{strip_code_fence, ContentRequest, GenerativeClient, Part};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DishSource {
    Provider,
    Heuristic,
}

impl DishSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Provider => "provider",
            Self::Heuristic => "heuristic",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DishSuggestions {
    pub names: Vec<String>,
    pub source: DishSource,
    /// Why the provider answer was not used, when it was not.
    pub fallback_reason: Option<String>,
}

fn dish_list_prompt(menu_text: &str) -> String {
    format!(
        "Extract the names of the dishes from this restaurant menu. Return a JSON array of \
strings containing only dish names, without prices, descriptions or section headings.\n\n\
Menu:\n{menu_text}"
    )
}

/// Suggests dish names for `menu_text`, provider first.
///
/// Never fails: any provider error or malformed answer falls back to the
/// line heuristic and the reason is returned alongside.
pub fn extract_dish_names(
    client: &dyn GenerativeClient,
    model: &str,
    menu_text: &str,
) -> DishSuggestions {
    if menu_text.trim().is_empty() {
        return DishSuggestions {
            names: Vec::new(),
            source: DishSource::Heuristic,
            fallback_reason: None,
        };
    }
    match extract_via_provider(client, model, menu_text) {
        Ok(names) => DishSuggestions {
            names,
            source: DishSource::Provider,
            fallback_reason: None,
        },
        Err(err) => DishSuggestions {
            names: heuristic_dish_names(menu_text),
            source: DishSource::Heuristic,
            fallback_reason: Some(format!("{err:#}")),
        },
    }
}

fn extract_via_provider(
    client: &dyn GenerativeClient,
    model: &str,
    menu_text: &str,
) -> Result<Vec<String>> {
    let request = ContentRequest::new(model, vec![Part::text(dish_list_prompt(menu_text))])
        .with_json_schema(json!({
            "type": "ARRAY",
            "items": { "type": "STRING" }
        }));
    let response = client.generate_content(&request)?;
    let Some(text) = response.text() else {
        bail!("dish list response had no text");
    };
    parse_dish_list(&text)
}

pub(crate) fn parse_dish_list(text: &str) -> Result<Vec<String>> {
    let parsed: Value = serde_json::from_str(&strip_code_fence(text))?;
    let Some(items) = parsed.as_array() else {
        bail!("dish list is not a JSON array");
    };
    items
        .iter()
        .map(|item| match item.as_str() {
            Some(name) => Ok(name.to_string()),
            None => bail!("dish list contains a non-string entry: {item}"),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::client::{ContentResponse, ImageGenerationRequest, ImageGenerationResponse};

    struct ReplyClient {
        reply: Result<&'static str, &'static str>,
        calls: AtomicUsize,
    }

    impl ReplyClient {
        fn new(reply: Result<&'static str, &'static str>) -> Self {
            Self {
                reply,
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl GenerativeClient for ReplyClient {
        fn name(&self) -> &str {
            "reply"
        }

        fn generate_content(&self, request: &ContentRequest) -> Result<ContentResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            assert_eq!(request.response_mime_type.as_deref(), Some("application/json"));
            match self.reply {
                Ok(text) => Ok(ContentResponse::from_text(text)),
                Err(message) => bail!("{message}"),
            }
        }

        fn generate_images(
            &self,
            _request: &ImageGenerationRequest,
        ) -> Result<ImageGenerationResponse> {
            bail!("not used")
        }
    }

    const MENU: &str = "Grilled Salmon $24\nCaesar Salad $12";

    #[test]
    fn blank_menu_makes_no_call() {
        let client = ReplyClient::new(Ok("[\"x\"]"));
        let suggestions = extract_dish_names(&client, "m", "  \n ");
        assert!(suggestions.names.is_empty());
        assert_eq!(client.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn provider_list_is_used_verbatim() {
        let client = ReplyClient::new(Ok("```json\n[\"Grilled Salmon\", \"Caesar Salad\"]\n```"));
        let suggestions = extract_dish_names(&client, "m", MENU);
        assert_eq!(suggestions.source, DishSource::Provider);
        assert_eq!(suggestions.names, vec!["Grilled Salmon", "Caesar Salad"]);
        assert_eq!(suggestions.fallback_reason, None);
    }

    #[test]
    fn provider_error_falls_back_to_heuristic() {
        let client = ReplyClient::new(Err("quota exceeded"));
        let suggestions = extract_dish_names(&client, "m", MENU);
        assert_eq!(suggestions.source, DishSource::Heuristic);
        assert_eq!(suggestions.names, vec!["Grilled Salmon", "Caesar Salad"]);
        assert_eq!(suggestions.fallback_reason.as_deref(), Some("quota exceeded"));
    }

    #[test]
    fn malformed_lists_fall_back_to_heuristic() {
        for reply in ["{\"dishes\": []}", "[\"Salmon\", 3]", "not json"] {
            let client = ReplyClient::new(Ok(reply));
            let suggestions = extract_dish_names(&client, "m", MENU);
            assert_eq!(suggestions.source, DishSource::Heuristic, "{reply}");
            assert_eq!(suggestions.names.len(), 2);
        }
    }

    #[test]
    fn parse_accepts_empty_array() -> anyhow::Result<()> {
        assert!(parse_dish_list("[]")?.is_empty());
        Ok(())
    }
}
