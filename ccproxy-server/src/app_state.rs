//! Process state built from a loaded [`UserConfig`] (SPEC_FULL.md §12.3):
//! one [`ProviderClient`] per configured backend, the alias-driven
//! [`Router`], and the shared transformer constructor/instance machinery.
//! A config reload builds a brand new `AppState` and atomically swaps it
//! into the holder in `main.rs` — no generation-counted handoff (§14's
//! Open Question resolution), in-flight requests keep whatever `Arc`
//! they already cloned.

use ccproxy_core::config::UserConfig;
use ccproxy_core::descriptors::{self, DescriptorRegistry};
use ccproxy_core::error::{ProxyError, Result};
use ccproxy_core::provider_client::ProviderClient;
use ccproxy_core::router::{AliasTarget, Router, FALLBACK_PROVIDER_NAME};
use ccproxy_core::transformer_loader::{ConstructorRegistry, TransformerLoader};
use std::collections::HashMap;

use crate::fallback::build_fallback_client;

pub struct AppState {
    pub providers: HashMap<String, ProviderClient>,
    pub fallback: ProviderClient,
    pub router: Router,
    pub descriptors: &'static DescriptorRegistry,
}

impl AppState {
    pub fn build(config: &UserConfig) -> Result<Self> {
        let descriptors = descriptors::registry();

        let mut constructor_registry = ConstructorRegistry::new();
        ccproxy_transformers::register_all(&mut constructor_registry);
        let loader = TransformerLoader::new();

        let mut providers = HashMap::new();
        for provider_config in &config.providers {
            let descriptor = descriptors.get(provider_config.backend_type);
            let client = ProviderClient::new(provider_config, descriptor, &loader, &constructor_registry)?;
            providers.insert(provider_config.name.clone(), client);
        }

        let mut alias_table = HashMap::new();
        for model in &config.models {
            alias_table.insert(
                model.alias.clone(),
                AliasTarget {
                    provider: model.provider.clone(),
                    resolved_model_id: model.resolved_id().to_string(),
                },
            );
        }

        let routing = config.routing.clone().unwrap_or_default();
        let router = Router::new(alias_table, routing);

        let fallback = build_fallback_client(&loader, &constructor_registry)?;

        Ok(Self { providers, fallback, router, descriptors })
    }

    /// Resolve a [`ccproxy_core::types::RoutingResult::provider`] name to the
    /// client that should execute the request, falling back to the
    /// env-configured Anthropic client when the router used it.
    pub fn client_for(&self, provider_name: &str) -> Result<&ProviderClient> {
        if provider_name == FALLBACK_PROVIDER_NAME {
            return Ok(&self.fallback);
        }
        self.providers
            .get(provider_name)
            .ok_or_else(|| ProxyError::config(format!("routing selected unknown provider '{provider_name}'")))
    }
}
