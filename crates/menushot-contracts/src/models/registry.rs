use indexmap::IndexMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSpec {
    pub name: String,
    pub provider: String,
    pub capabilities: Vec<String>,
}

impl ModelSpec {
    pub fn supports(&self, capability: &str) -> bool {
        self.capabilities.iter().any(|item| item == capability)
    }
}

#[derive(Debug, Clone)]
pub struct ModelRegistry {
    models: IndexMap<String, ModelSpec>,
}

impl ModelRegistry {
    pub fn new(models: Option<IndexMap<String, ModelSpec>>) -> Self {
        Self {
            models: models.unwrap_or_else(default_models),
        }
    }

    /// Registry restricted to the models served by one provider backend.
    pub fn for_provider(provider: &str) -> Self {
        let models = default_models()
            .into_iter()
            .filter(|(_, spec)| spec.provider == provider)
            .collect();
        Self { models }
    }

    pub fn get(&self, name: &str) -> Option<&ModelSpec> {
        self.models.get(name)
    }

    pub fn list(&self) -> impl Iterator<Item = &ModelSpec> {
        self.models.values()
    }

    pub fn by_capability(&self, capability: &str) -> Vec<ModelSpec> {
        self.models
            .values()
            .filter(|model| model.supports(capability))
            .cloned()
            .collect()
    }

    pub fn ensure(&self, name: &str, capability: &str) -> Option<ModelSpec> {
        let model = self.get(name)?;
        if model.supports(capability) {
            return Some(model.clone());
        }
        None
    }
}

// Order matters: the first model listed for a capability is its default.
fn default_models() -> IndexMap<String, ModelSpec> {
    let mut map = IndexMap::new();

    let mut insert = |name: &str, provider: &str, capabilities: &[&str]| {
        map.insert(
            name.to_string(),
            ModelSpec {
                name: name.to_string(),
                provider: provider.to_string(),
                capabilities: capabilities
                    .iter()
                    .map(|item| (*item).to_string())
                    .collect(),
            },
        );
    };

    insert("gemini-2.5-flash", "gemini", &["ocr", "text", "search"]);
    insert("gemini-2.5-pro", "gemini", &["ocr", "text", "search"]);
    insert("gemini-2.5-flash-image", "gemini", &["edit"]);
    insert("gemini-2.5-flash-image-preview", "gemini", &["edit"]);
    insert("imagen-4.0-generate-001", "gemini", &["image"]);
    insert("imagen-4.0-ultra-generate-001", "gemini", &["image"]);
    insert("imagen-3.0-generate-002", "gemini", &["image"]);
    insert("dryrun-text-1", "dryrun", &["ocr", "text", "search"]);
    insert("dryrun-image-1", "dryrun", &["edit", "image"]);

    map
}

#[cfg(test)]
mod tests {
    use super::ModelRegistry;

    #[test]
    fn defaults_list_gemini_first_for_each_capability() {
        let registry = ModelRegistry::new(None);
        for (capability, expected) in [
            ("ocr", "gemini-2.5-flash"),
            ("text", "gemini-2.5-flash"),
            ("search", "gemini-2.5-flash"),
            ("edit", "gemini-2.5-flash-image"),
            ("image", "imagen-4.0-generate-001"),
        ] {
            let models = registry.by_capability(capability);
            assert_eq!(models[0].name, expected, "capability {capability}");
        }
    }

    #[test]
    fn provider_registry_only_keeps_that_provider() {
        let registry = ModelRegistry::for_provider("dryrun");
        let names: Vec<&str> = registry.list().map(|spec| spec.name.as_str()).collect();
        assert_eq!(names, vec!["dryrun-text-1", "dryrun-image-1"]);
        assert!(registry.ensure("dryrun-image-1", "image").is_some());
        assert!(registry.ensure("dryrun-image-1", "text").is_none());
    }
}
