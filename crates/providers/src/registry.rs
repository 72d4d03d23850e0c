//! Provider registry — builds adapters from config and hands out shared
//! instances by id.

use std::collections::HashMap;
use std::sync::Arc;

use quarry_domain::config::{LlmConfig, ProviderKind};
use quarry_domain::{Error, Result};

use crate::openai_compat::OpenAiCompatProvider;
use crate::stub::StubProvider;
use crate::traits::LlmProvider;

pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn LlmProvider>>,
    default_id: String,
}

impl ProviderRegistry {
    /// Build all configured providers. A `stub` provider is always
    /// registered, even when the config omits it.
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let mut providers: HashMap<String, Arc<dyn LlmProvider>> = HashMap::new();
        providers.insert("stub".to_string(), Arc::new(StubProvider::new()));

        for (id, cfg) in &config.providers {
            let provider: Arc<dyn LlmProvider> = match cfg.kind {
                ProviderKind::Stub => Arc::new(StubProvider::new()),
                ProviderKind::OpenaiCompat => {
                    Arc::new(OpenAiCompatProvider::from_config(id, cfg)?)
                }
            };
            tracing::info!(provider_id = %id, kind = ?cfg.kind, "provider registered");
            providers.insert(id.clone(), provider);
        }

        if !providers.contains_key(&config.default_provider) {
            return Err(Error::Config(format!(
                "default provider '{}' is not configured",
                config.default_provider
            )));
        }

        Ok(Self {
            providers,
            default_id: config.default_provider.clone(),
        })
    }

    pub fn get(&self, id: &str) -> Result<Arc<dyn LlmProvider>> {
        self.providers
            .get(id)
            .cloned()
            .ok_or_else(|| Error::Config(format!("unknown llm provider '{id}'")))
    }

    pub fn default_provider(&self) -> Arc<dyn LlmProvider> {
        self.providers[&self.default_id].clone()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.providers.contains_key(id)
    }

    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.providers.keys().cloned().collect();
        ids.sort();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quarry_domain::config::ProviderConfig;

    #[test]
    fn stub_is_always_registered() {
        let registry = ProviderRegistry::from_config(&LlmConfig::default()).unwrap();
        assert!(registry.contains("stub"));
        assert_eq!(registry.default_provider().provider_id(), "stub");
    }

    #[test]
    fn unknown_provider_lookup_fails() {
        let registry = ProviderRegistry::from_config(&LlmConfig::default()).unwrap();
        assert!(registry.get("missing").is_err());
    }

    #[test]
    fn unknown_default_is_a_config_error() {
        let config = LlmConfig {
            default_provider: "missing".into(),
            providers: HashMap::new(),
        };
        assert!(ProviderRegistry::from_config(&config).is_err());
    }

    #[test]
    fn openai_compat_requires_base_url() {
        let mut config = LlmConfig::default();
        config.providers.insert(
            "local".into(),
            ProviderConfig {
                kind: ProviderKind::OpenaiCompat,
                base_url: String::new(),
                api_key_env: None,
                model: String::new(),
                timeout_secs: 10,
            },
        );
        assert!(ProviderRegistry::from_config(&config).is_err());
    }
}
