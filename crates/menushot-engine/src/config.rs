use std::env;
use std::sync::Arc;

use anyhow::{anyhow, bail, Result};
use menushot_contracts::models::{
    ModelRegistry, ModelSelector, CAPABILITY_EDIT, CAPABILITY_IMAGE, CAPABILITY_OCR,
    CAPABILITY_SEARCH, CAPABILITY_TEXT,
};
use menushot_contracts::providers::{NamedProvider, ProviderRegistry};

use crate::client::GenerativeClient;
use crate::dryrun::DryrunClient;
use crate::gemini::GeminiClient;

pub const API_KEY_ENV_VARS: [&str; 3] = ["GEMINI_API_KEY", "GOOGLE_API_KEY", "API_KEY"];
pub const API_BASE_ENV_VAR: &str = "GEMINI_API_BASE";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderBackend {
    name: &'static str,
    pub requires_api_key: bool,
}

impl NamedProvider for ProviderBackend {
    fn name(&self) -> &str {
        self.name
    }
}

/// Client backends selectable with `--provider`; the first is the default.
pub fn provider_backends() -> ProviderRegistry<ProviderBackend> {
    ProviderRegistry::new(vec![
        ProviderBackend {
            name: "gemini",
            requires_api_key: true,
        },
        ProviderBackend {
            name: "dryrun",
            requires_api_key: false,
        },
    ])
}

/// Model names requested on the command line, one per capability.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelOverrides {
    pub ocr: Option<String>,
    pub text: Option<String>,
    pub search: Option<String>,
    pub edit: Option<String>,
    pub image: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineModels {
    pub ocr: String,
    pub text: String,
    pub search: String,
    pub edit: String,
    pub image: String,
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub provider: String,
    pub api_key: Option<String>,
    pub api_base: Option<String>,
    pub models: EngineModels,
    pub warnings: Vec<String>,
}

impl EngineConfig {
    pub fn from_env(provider: Option<&str>, overrides: &ModelOverrides) -> Result<Self> {
        Self::resolve(
            provider,
            first_non_empty_env(&API_KEY_ENV_VARS),
            non_empty_env(API_BASE_ENV_VAR),
            overrides,
        )
    }

    /// Resolves the backend and one model per capability. An unknown model
    /// name falls back to the backend default and is reported in `warnings`.
    pub fn resolve(
        provider: Option<&str>,
        api_key: Option<String>,
        api_base: Option<String>,
        overrides: &ModelOverrides,
    ) -> Result<Self> {
        let backends = provider_backends();
        let backend = match provider.map(str::trim).filter(|value| !value.is_empty()) {
            Some(name) => backends.resolve(name).map_err(|err| anyhow!(err))?,
            None => backends
                .default_provider()
                .ok_or_else(|| anyhow!("no provider backends registered"))?,
        };
        if backend.requires_api_key && api_key.is_none() {
            bail!(
                "{} not set (needed by the '{}' provider)",
                API_KEY_ENV_VARS.join(" or "),
                backend.name()
            );
        }

        let selector = ModelSelector::new(Some(ModelRegistry::for_provider(backend.name())));
        let mut warnings = Vec::new();
        let mut pick = |requested: &Option<String>, capability: &str| -> Result<String> {
            let selection = selector
                .select(requested.as_deref(), capability)
                .map_err(|err| anyhow!(err))?;
            if let Some(reason) = selection.fallback_reason {
                push_unique_warning(
                    &mut warnings,
                    format!("{reason} Using '{}'.", selection.model.name),
                );
            }
            Ok(selection.model.name)
        };
        let models = EngineModels {
            ocr: pick(&overrides.ocr, CAPABILITY_OCR)?,
            text: pick(&overrides.text, CAPABILITY_TEXT)?,
            search: pick(&overrides.search, CAPABILITY_SEARCH)?,
            edit: pick(&overrides.edit, CAPABILITY_EDIT)?,
            image: pick(&overrides.image, CAPABILITY_IMAGE)?,
        };

        Ok(Self {
            provider: backend.name().to_string(),
            api_key,
            api_base,
            models,
            warnings,
        })
    }

    pub fn build_client(&self) -> Result<Arc<dyn GenerativeClient>> {
        match self.provider.as_str() {
            "dryrun" => Ok(Arc::new(DryrunClient)),
            "gemini" => {
                let Some(api_key) = self.api_key.as_deref() else {
                    bail!("{} not set", API_KEY_ENV_VARS.join(" or "));
                };
                Ok(Arc::new(GeminiClient::new(api_key, self.api_base.as_deref())?))
            }
            other => bail!("no client for provider '{other}'"),
        }
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn first_non_empty_env(keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| non_empty_env(key))
}

fn push_unique_warning(warnings: &mut Vec<String>, message: String) {
    if message.trim().is_empty() {
        return;
    }
    if warnings.iter().any(|existing| existing == &message) {
        return;
    }
    warnings.push(message);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gemini_requires_an_api_key() {
        let err = EngineConfig::resolve(None, None, None, &ModelOverrides::default())
            .unwrap_err()
            .to_string();
        assert!(err.contains("GEMINI_API_KEY or GOOGLE_API_KEY or API_KEY"));
    }

    #[test]
    fn gemini_defaults_pick_first_capable_models() -> anyhow::Result<()> {
        let config = EngineConfig::resolve(
            Some("Gemini"),
            Some("k".to_string()),
            None,
            &ModelOverrides::default(),
        )?;
        assert_eq!(config.provider, "gemini");
        assert_eq!(config.models.ocr, "gemini-2.5-flash");
        assert_eq!(config.models.search, "gemini-2.5-flash");
        assert_eq!(config.models.edit, "gemini-2.5-flash-image");
        assert_eq!(config.models.image, "imagen-4.0-generate-001");
        assert!(config.warnings.is_empty());
        Ok(())
    }

    #[test]
    fn unknown_model_override_falls_back_with_warning() -> anyhow::Result<()> {
        let overrides = ModelOverrides {
            text: Some("gemini-2.5-pro".to_string()),
            image: Some("dall-e-3".to_string()),
            ..ModelOverrides::default()
        };
        let config = EngineConfig::resolve(None, Some("k".to_string()), None, &overrides)?;
        assert_eq!(config.models.text, "gemini-2.5-pro");
        assert_eq!(config.models.image, "imagen-4.0-generate-001");
        assert_eq!(config.warnings.len(), 1);
        assert!(config.warnings[0].contains("'dall-e-3' unavailable for capability 'image'"));
        Ok(())
    }

    #[test]
    fn dryrun_needs_no_key_and_builds_offline_client() -> anyhow::Result<()> {
        let config =
            EngineConfig::resolve(Some("dryrun"), None, None, &ModelOverrides::default())?;
        assert_eq!(config.models.text, "dryrun-text-1");
        assert_eq!(config.models.image, "dryrun-image-1");
        assert_eq!(config.build_client()?.name(), "dryrun");
        Ok(())
    }

    #[test]
    fn unknown_provider_lists_choices() {
        let err = EngineConfig::resolve(Some("openai"), None, None, &ModelOverrides::default())
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Unknown provider 'openai'. Available: dryrun, gemini."
        );
    }
}
