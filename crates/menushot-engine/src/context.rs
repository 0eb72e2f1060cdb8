use anyhow::{Context, Result};
use menushot_contracts::session::{
    ContextualInfo, DishContext, GroundingSource, NO_SUMMARY_FALLBACK,
};
use serde_json::{json, Map, Value};

use crate::client::{strip_code_fence, ContentRequest, GenerativeClient, GroundingChunk, Part};
use crate::fetch::is_http_url;

const UNTITLED_SOURCE: &str = "Untitled";
const MISSING_URI: &str = "#";

fn search_prompt(restaurant: &str, dishes: &[String]) -> String {
    let list = dishes
        .iter()
        .map(|dish| format!("- {dish}"))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "Research the restaurant \"{restaurant}\". Describe its ambiance, how its food is \
plated and presented, and the overall visual style of its dishes (tableware, lighting, \
colours). Then, for each dish below, give the URL of one publicly accessible photo of that \
dish as served at this restaurant, or say \"none found\" if there is none.\n\n\
Dishes:\n{list}"
    )
}

fn extraction_prompt(search_text: &str, dishes: &[String]) -> String {
    format!(
        "From the research notes below, write a short summary of the restaurant's visual \
style for a food photographer, and list every dish with its photo URL. Use null for \
imageUrl when no URL was found. Dishes: {}.\n\nResearch notes:\n{search_text}",
        dishes.join(", ")
    )
}

fn extraction_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "summary": { "type": "STRING" },
            "dishContexts": {
                "type": "ARRAY",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "dishName": { "type": "STRING" },
                        "imageUrl": { "type": "STRING", "nullable": true }
                    },
                    "required": ["dishName"]
                }
            }
        },
        "required": ["summary", "dishContexts"]
    })
}

/// Grounded search followed by structured extraction.
///
/// Either call failing is an error. A malformed extraction is not: it
/// yields the fallback summary and no reference images.
pub fn resolve_context(
    client: &dyn GenerativeClient,
    search_model: &str,
    text_model: &str,
    restaurant: &str,
    dishes: &[String],
) -> Result<ContextualInfo> {
    let search = client
        .generate_content(
            &ContentRequest::new(search_model, vec![Part::text(search_prompt(restaurant, dishes))])
                .with_google_search(),
        )
        .context("grounded search failed")?;
    let sources = grounding_sources(&search.grounding_chunks);
    let search_text = search.text().unwrap_or_default();

    let extraction = client
        .generate_content(
            &ContentRequest::new(
                text_model,
                vec![Part::text(extraction_prompt(&search_text, dishes))],
            )
            .with_json_schema(extraction_schema()),
        )
        .context("context extraction failed")?;
    let extracted = extraction
        .text()
        .and_then(|text| serde_json::from_str::<Value>(&strip_code_fence(&text)).ok())
        .and_then(|value| value.as_object().cloned())
        .unwrap_or_default();

    Ok(assemble_context(&extracted, sources, dishes))
}

fn grounding_sources(chunks: &[GroundingChunk]) -> Vec<GroundingSource> {
    chunks
        .iter()
        .map(|chunk| GroundingSource {
            title: chunk
                .title
                .clone()
                .filter(|value| !value.trim().is_empty())
                .unwrap_or_else(|| UNTITLED_SOURCE.to_string()),
            uri: chunk
                .uri
                .clone()
                .filter(|value| !value.trim().is_empty())
                .unwrap_or_else(|| MISSING_URI.to_string()),
        })
        .filter(|source| source.uri != MISSING_URI)
        .collect()
}

/// Builds exactly one `DishContext` per requested dish, in request order.
pub(crate) fn assemble_context(
    extracted: &Map<String, Value>,
    sources: Vec<GroundingSource>,
    dishes: &[String],
) -> ContextualInfo {
    let summary = extracted
        .get("summary")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(NO_SUMMARY_FALLBACK)
        .to_string();

    let rows = extracted
        .get("dishContexts")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    let dish_contexts = dishes
        .iter()
        .map(|dish| {
            let wanted = dish.trim().to_lowercase();
            let image_url = rows
                .iter()
                .find(|row| {
                    row.get("dishName")
                        .and_then(Value::as_str)
                        .map(|name| name.trim().to_lowercase() == wanted)
                        .unwrap_or(false)
                })
                .and_then(|row| row.get("imageUrl"))
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|url| is_http_url(url))
                .map(str::to_string);
            DishContext {
                dish_name: dish.clone(),
                image_url,
            }
        })
        .collect();

    ContextualInfo {
        summary,
        sources,
        dish_contexts,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use anyhow::bail;

    use super::*;
    use crate::client::{ContentResponse, ImageGenerationRequest, ImageGenerationResponse};

    struct TwoStepClient {
        search: Result<ContentResponse, &'static str>,
        extraction: Result<ContentResponse, &'static str>,
        seen: Mutex<Vec<ContentRequest>>,
    }

    impl GenerativeClient for TwoStepClient {
        fn name(&self) -> &str {
            "two-step"
        }

        fn generate_content(&self, request: &ContentRequest) -> Result<ContentResponse> {
            let mut seen = self.seen.lock().expect("lock");
            seen.push(request.clone());
            let reply = if seen.len() == 1 {
                &self.search
            } else {
                &self.extraction
            };
            match reply {
                Ok(response) => Ok(response.clone()),
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

    fn dishes(items: &[&str]) -> Vec<String> {
        items.iter().map(|item| item.to_string()).collect()
    }

    fn search_reply() -> ContentResponse {
        ContentResponse {
            parts: vec![Part::text("Dim room, slate plates.")],
            grounding_chunks: vec![
                GroundingChunk {
                    title: Some("Eater review".to_string()),
                    uri: Some("https://eater.test/la-palma".to_string()),
                },
                GroundingChunk {
                    title: None,
                    uri: Some("https://maps.test/la-palma".to_string()),
                },
                GroundingChunk {
                    title: Some("Broken".to_string()),
                    uri: None,
                },
            ],
        }
    }

    #[test]
    fn resolves_sources_summary_and_ordered_references() -> anyhow::Result<()> {
        let extraction = ContentResponse::from_text(
            json!({
                "summary": "Slate plates under warm pendant light.",
                "dishContexts": [
                    {"dishName": "flan", "imageUrl": "https://img.test/flan.jpg"},
                    {"dishName": "TACOS AL PASTOR", "imageUrl": "  "},
                    {"dishName": "Churros", "imageUrl": "https://img.test/churros.jpg"}
                ]
            })
            .to_string(),
        );
        let client = TwoStepClient {
            search: Ok(search_reply()),
            extraction: Ok(extraction),
            seen: Mutex::new(Vec::new()),
        };
        let requested = dishes(&["Tacos al Pastor", "Flan", "Mole"]);
        let info = resolve_context(&client, "search-m", "text-m", "La Palma", &requested)?;

        assert_eq!(info.summary, "Slate plates under warm pendant light.");
        assert_eq!(info.sources.len(), 2);
        assert_eq!(info.sources[1].title, "Untitled");
        let names: Vec<&str> = info
            .dish_contexts
            .iter()
            .map(|ctx| ctx.dish_name.as_str())
            .collect();
        assert_eq!(names, vec!["Tacos al Pastor", "Flan", "Mole"]);
        assert_eq!(info.reference_for(0), None);
        assert_eq!(info.reference_for(1), Some("https://img.test/flan.jpg"));
        assert_eq!(info.reference_for(2), None);

        let seen = client.seen.lock().expect("lock");
        assert_eq!(seen[0].model, "search-m");
        assert!(seen[0].google_search);
        assert_eq!(seen[1].model, "text-m");
        assert!(seen[1].response_schema.is_some());
        assert!(matches!(&seen[1].parts[0], Part::Text(text) if text.contains("slate plates")));
        Ok(())
    }

    #[test]
    fn unparseable_extraction_backfills_every_dish() -> anyhow::Result<()> {
        let client = TwoStepClient {
            search: Ok(search_reply()),
            extraction: Ok(ContentResponse::from_text("Sorry, I can't help with that.")),
            seen: Mutex::new(Vec::new()),
        };
        let info = resolve_context(&client, "s", "t", "La Palma", &dishes(&["A", "B"]))?;
        assert_eq!(info.summary, NO_SUMMARY_FALLBACK);
        assert_eq!(info.dish_contexts.len(), 2);
        assert!(info.dish_contexts.iter().all(|ctx| ctx.image_url.is_none()));
        Ok(())
    }

    #[test]
    fn either_call_failing_is_an_error() {
        let search_fails = TwoStepClient {
            search: Err("search quota"),
            extraction: Ok(ContentResponse::from_text("{}")),
            seen: Mutex::new(Vec::new()),
        };
        let err = resolve_context(&search_fails, "s", "t", "X", &dishes(&["A"])).unwrap_err();
        assert_eq!(format!("{err:#}"), "grounded search failed: search quota");

        let extraction_fails = TwoStepClient {
            search: Ok(search_reply()),
            extraction: Err("timeout"),
            seen: Mutex::new(Vec::new()),
        };
        assert!(resolve_context(&extraction_fails, "s", "t", "X", &dishes(&["A"])).is_err());
    }

    #[test]
    fn non_http_references_count_as_absent() {
        let extracted = json!({
            "dishContexts": [
                {"dishName": "A", "imageUrl": "none found"},
                {"dishName": "B", "imageUrl": null}
            ]
        });
        let info = assemble_context(
            extracted.as_object().expect("object"),
            Vec::new(),
            &dishes(&["A", "B"]),
        );
        assert!(info.dish_contexts.iter().all(|ctx| ctx.image_url.is_none()));
        assert_eq!(info.summary, NO_SUMMARY_FALLBACK);
    }
}
