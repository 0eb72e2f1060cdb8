/// Anything selectable by name from the CLI (`--provider gemini`).
pub trait NamedProvider {
    fn name(&self) -> &str;
}

/// Ordered set of provider backends. Insertion order is preserved and the
/// first entry is the default.
#[derive(Debug, Clone)]
pub struct ProviderRegistry<T: NamedProvider> {
    providers: Vec<T>,
}

impl<T: NamedProvider> ProviderRegistry<T> {
    pub fn new(providers: Vec<T>) -> Self {
        Self { providers }
    }

    pub fn get(&self, name: &str) -> Option<&T> {
        let wanted = name.trim();
        self.providers
            .iter()
            .find(|provider| provider.name().eq_ignore_ascii_case(wanted))
    }

    /// Like `get`, but an unknown name becomes a message listing the choices.
    pub fn resolve(&self, name: &str) -> Result<&T, String> {
        self.get(name).ok_or_else(|| {
            format!(
                "Unknown provider '{}'. Available: {}.",
                name.trim(),
                self.list().join(", ")
            )
        })
    }

    pub fn default_provider(&self) -> Option<&T> {
        self.providers.first()
    }

    pub fn list(&self) -> Vec<String> {
        let mut names = self
            .providers
            .iter()
            .map(|provider| provider.name().to_string())
            .collect::<Vec<String>>();
        names.sort();
        names
    }

    pub fn providers(&self) -> &[T] {
        self.providers.as_slice()
    }
}

#[cfg(test)]
mod tests {
    use super::{NamedProvider, ProviderRegistry};

    #[derive(Clone, Debug)]
    struct Backend(&'static str);

    impl NamedProvider for Backend {
        fn name(&self) -> &str {
            self.0
        }
    }

    fn registry() -> ProviderRegistry<Backend> {
        ProviderRegistry::new(vec![Backend("gemini"), Backend("dryrun")])
    }

    #[test]
    fn lookup_is_case_insensitive() {
        assert_eq!(registry().get(" Gemini ").map(|b| b.0), Some("gemini"));
        assert!(registry().get("openai").is_none());
    }

    #[test]
    fn unknown_provider_lists_sorted_choices() {
        let err = registry().resolve("openai").err().unwrap_or_default();
        assert_eq!(err, "Unknown provider 'openai'. Available: dryrun, gemini.");
    }

    #[test]
    fn first_registered_provider_is_default() {
        let registry = registry();
        assert_eq!(registry.default_provider().map(|b| b.0), Some("gemini"));
        assert_eq!(
            registry
                .providers()
                .iter()
                .map(|b| b.name().to_string())
                .collect::<Vec<String>>(),
            vec!["gemini", "dryrun"]
        );
    }
}
