//! Provider registry — maps a provider key to its adapter.
//!
//! Handles adapter creation from config and resolves keys that have no
//! usable adapter to the offline responder.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use switchyard_config::AppConfig;
use switchyard_core::{ModelCatalog, ModelProvider, ProviderKey};
use tracing::debug;

use crate::anthropic::AnthropicProvider;
use crate::fallback::FallbackProvider;
use crate::offline::OfflineProvider;
use crate::openai_compat::OpenAiCompatProvider;

/// Holds one adapter per provider key.
pub struct ProviderRegistry {
    providers: HashMap<ProviderKey, Arc<dyn ModelProvider>>,
    offline: Arc<OfflineProvider>,
}

impl ProviderRegistry {
    /// Create an empty registry. Every key resolves offline until registered.
    pub fn new(catalog: Arc<ModelCatalog>) -> Self {
        Self {
            providers: HashMap::new(),
            offline: Arc::new(OfflineProvider::new(catalog)),
        }
    }

    /// Register an adapter under its own key, replacing any previous one.
    pub fn register(&mut self, provider: Arc<dyn ModelProvider>) {
        self.providers.insert(provider.key(), provider);
    }

    /// Get the adapter registered for a key, if any.
    pub fn get(&self, key: ProviderKey) -> Option<Arc<dyn ModelProvider>> {
        self.providers.get(&key).cloned()
    }

    /// Adapter to use for a key. Missing or disabled adapters resolve to the
    /// offline responder.
    pub fn resolve(&self, key: ProviderKey) -> Arc<dyn ModelProvider> {
        match self.providers.get(&key) {
            Some(provider) if provider.is_enabled() => provider.clone(),
            _ => self.offline.clone(),
        }
    }

    /// The shared offline responder.
    pub fn offline(&self) -> Arc<OfflineProvider> {
        self.offline.clone()
    }

    /// List registered provider keys in a stable order.
    pub fn list(&self) -> Vec<ProviderKey> {
        ProviderKey::ALL
            .iter()
            .copied()
            .filter(|key| self.providers.contains_key(key))
            .collect()
    }
}

/// Build a registry from configuration.
///
/// Every live vendor gets an adapter wrapped in [`FallbackProvider`], so a
/// model call never fails. `mock` maps to the offline responder.
pub fn build_from_config(config: &AppConfig, catalog: Arc<ModelCatalog>) -> ProviderRegistry {
    let mut registry = ProviderRegistry::new(catalog.clone());
    let offline = registry.offline();
    let timeout = Duration::from_secs(config.provider_timeout_secs);

    for key in ProviderKey::ALL {
        let live: Arc<dyn ModelProvider> = match key {
            ProviderKey::Mock => {
                registry.register(offline.clone());
                continue;
            }
            ProviderKey::Anthropic => {
                let provider_config = config.provider(key);
                let api_key = provider_config.and_then(|p| p.api_key.clone());
                let mut p = AnthropicProvider::new(api_key, catalog.clone());
                if let Some(url) = provider_config.and_then(|p| p.api_url.as_deref()) {
                    p = p.with_base_url(url);
                }
                Arc::new(p)
            }
            _ => {
                let provider_config = config.provider(key);
                let api_key = provider_config.and_then(|p| p.api_key.clone());
                let base_url = provider_config
                    .and_then(|p| p.api_url.clone())
                    .unwrap_or_else(|| default_base_url(key).to_string());
                Arc::new(OpenAiCompatProvider::new(key, base_url, api_key, catalog.clone()))
            }
        };

        debug!(
            provider = %key,
            enabled = live.is_enabled(),
            demo_mode = config.demo_mode,
            "Registering provider"
        );

        registry.register(Arc::new(
            FallbackProvider::new(live, offline.clone())
                .with_timeout(timeout)
                .with_demo_mode(config.demo_mode),
        ));
    }

    registry
}

/// Default base URL for OpenAI-compatible vendors.
fn default_base_url(key: ProviderKey) -> &'static str {
    match key {
        ProviderKey::OpenAi => "https://api.openai.com/v1",
        ProviderKey::Google => "https://generativelanguage.googleapis.com/v1beta/openai",
        ProviderKey::Mistral => "https://api.mistral.ai/v1",
        ProviderKey::Anthropic => "https://api.anthropic.com",
        ProviderKey::Mock => "",
    }
}
