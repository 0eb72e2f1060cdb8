use super::registry::{ModelRegistry, ModelSpec};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSelection {
    pub model: ModelSpec,
    pub requested: Option<String>,
    pub fallback_reason: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ModelSelector {
    pub registry: ModelRegistry,
}

impl ModelSelector {
    pub fn new(registry: Option<ModelRegistry>) -> Self {
        Self {
            registry: registry.unwrap_or_else(|| ModelRegistry::new(None)),
        }
    }

    /// Resolves a model for `capability`. An unknown or incapable request
    /// falls back to the registry default and says why; no request at all
    /// picks the default silently.
    pub fn select(
        &self,
        requested: Option<&str>,
        capability: &str,
    ) -> Result<ModelSelection, String> {
        let requested = requested.map(str::trim).filter(|value| !value.is_empty());
        let fallback_reason = if let Some(requested_value) = requested {
            if let Some(model) = self.registry.ensure(requested_value, capability) {
                return Ok(ModelSelection {
                    model,
                    requested: Some(requested_value.to_string()),
                    fallback_reason: None,
                });
            }
            Some(format!(
                "Requested model '{requested_value}' unavailable for capability '{capability}'."
            ))
        } else {
            None
        };

        let candidates = self.registry.by_capability(capability);
        let Some(model) = candidates.first().cloned() else {
            return Err(format!(
                "No models available for capability '{capability}'."
            ));
        };
        Ok(ModelSelection {
            model,
            requested: requested.map(str::to_string),
            fallback_reason,
        })
    }
}

#[cfg(test)]
mod tests {
    use indexmap::IndexMap;

    use super::ModelSelector;
    use crate::models::{ModelRegistry, ModelSpec};

    fn model(name: &str, capabilities: &[&str]) -> ModelSpec {
        ModelSpec {
            name: name.to_string(),
            provider: "gemini".to_string(),
            capabilities: capabilities.iter().map(|c| c.to_string()).collect(),
        }
    }

    fn selector() -> ModelSelector {
        let mut models = IndexMap::new();
        models.insert("flash".to_string(), model("flash", &["text", "search"]));
        models.insert("imagen".to_string(), model("imagen", &["image"]));
        ModelSelector::new(Some(ModelRegistry::new(Some(models))))
    }

    #[test]
    fn requested_model_is_used_when_capable() {
        let selection = selector().select(Some("imagen"), "image").unwrap();
        assert_eq!(selection.model.name, "imagen");
        assert_eq!(selection.fallback_reason, None);
    }

    #[test]
    fn incapable_request_falls_back_with_reason() {
        let selection = selector().select(Some("imagen"), "search").unwrap();
        assert_eq!(selection.model.name, "flash");
        assert_eq!(selection.requested.as_deref(), Some("imagen"));
        assert_eq!(
            selection.fallback_reason.as_deref(),
            Some("Requested model 'imagen' unavailable for capability 'search'.")
        );
    }

    #[test]
    fn blank_request_uses_default_without_reason() {
        let selection = selector().select(Some("  "), "text").unwrap();
        assert_eq!(selection.model.name, "flash");
        assert_eq!(selection.requested, None);
        assert_eq!(selection.fallback_reason, None);
    }

    #[test]
    fn missing_capability_is_an_error() {
        let err = selector().select(None, "ocr").err().unwrap_or_default();
        assert_eq!(err, "No models available for capability 'ocr'.");
    }
}
