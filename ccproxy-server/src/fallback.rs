//! Env-configured fallback Anthropic client (§4.4, §6.4): used whenever the
//! router's alias table misses and a request falls through untranslated to
//! Anthropic's own API. Not part of `UserConfig.providers` since it has no
//! alias and always speaks the Anthropic backend type, so it's built
//! straight from environment variables rather than the YAML file.

use ccproxy_core::config::{ProviderConfig, TransformerStageConfig};
use ccproxy_core::descriptors;
use ccproxy_core::error::Result;
use ccproxy_core::provider_client::ProviderClient;
use ccproxy_core::router::FALLBACK_PROVIDER_NAME;
use ccproxy_core::transformer_loader::{ConstructorRegistry, TransformerLoader};
use ccproxy_core::types::{Channel, TransformerRef};
use std::collections::HashMap;

const DEFAULT_FALLBACK_URL: &str = "https://api.anthropic.com";

/// Strips a trailing `/v1/messages` (with or without trailing slash) so the
/// same env var can hold either the bare host or a full endpoint URL (§6.4).
fn strip_messages_suffix(base_url: &str) -> String {
    let trimmed = base_url.trim_end_matches('/');
    trimmed.strip_suffix("/v1/messages").unwrap_or(trimmed).to_string()
}

/// Builds the `AuthHeaderTransformer` override that injects the fallback's
/// own `x-api-key` on both channels. The Anthropic descriptor's default
/// chains are empty pass-through (§4.2's note that a native-format provider
/// needs no translation), so without this override the fallback client
/// would forward upstream with no auth at all.
fn auth_override(api_key: &str) -> TransformerStageConfig {
    TransformerStageConfig {
        request: Some(vec![TransformerRef {
            class_path: "ccproxy_transformers::generic::AuthHeaderTransformer".to_string(),
            params: serde_json::json!({ "api_key": api_key, "style": "x_api_key" }).as_object().unwrap().clone(),
        }]),
        ..Default::default()
    }
}

pub fn build_fallback_client(loader: &TransformerLoader, registry: &ConstructorRegistry) -> Result<ProviderClient> {
    let base_url = std::env::var("CCPROXY_FALLBACK_URL").unwrap_or_else(|_| DEFAULT_FALLBACK_URL.to_string());
    let base_url = strip_messages_suffix(&base_url);
    let api_key = std::env::var("CCPROXY_FALLBACK_API_KEY").unwrap_or_default();

    let mut transformers = HashMap::new();
    transformers.insert(Channel::Claude, auth_override(&api_key));
    transformers.insert(Channel::Codex, auth_override(&api_key));

    let config = ProviderConfig {
        name: FALLBACK_PROVIDER_NAME.to_string(),
        base_url,
        api_key,
        backend_type: ccproxy_core::types::ProviderBackendType::Anthropic,
        capabilities: None,
        transformers,
        timeout: 180,
    };

    let descriptor = descriptors::registry().get(config.backend_type);
    ProviderClient::new(&config, descriptor, loader, registry)
}
