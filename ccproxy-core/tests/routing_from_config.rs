//! Multi-module routing behaviour built from a real parsed `UserConfig`
//! rather than hand-built `Router` fixtures, covering spec.md §8's
//! "End-to-end scenarios" 1 (direct-marker routing to a configured alias)
//! and 5 (fallback routing for an unconfigured alias).

use ccproxy_core::config::UserConfig;
use ccproxy_core::router::{AliasTarget, Router, FALLBACK_PROVIDER_NAME};
use ccproxy_core::types::{Channel, ExchangeRequest, RequestContext, RoutingKey};
use std::collections::HashMap;

const CONFIG_YAML: &str = r#"
providers:
  - name: openai-main
    type: openai
    base_url: https://api.openai.com
    api_key: server-key
models:
  - alias: alias-gpt
    id: gpt-4o
    provider: openai-main
routing:
  default: alias-gpt
"#;

fn router_from(config: &UserConfig) -> Router {
    let mut alias_table = HashMap::new();
    for model in &config.models {
        alias_table.insert(
            model.alias.clone(),
            AliasTarget { provider: model.provider.clone(), resolved_model_id: model.resolved_id().to_string() },
        );
    }
    Router::new(alias_table, config.routing.clone().unwrap_or_default())
}

#[test]
fn direct_marker_routes_to_configured_alias_model_id() {
    let config = UserConfig::from_yaml(CONFIG_YAML).unwrap();
    let router = router_from(&config);

    let mut exchange = ExchangeRequest::new(Channel::Claude, "alias-gpt!", serde_json::json!({"messages": [], "max_tokens": 1000}), true);
    let mut ctx = RequestContext::new("corr-1", "alias-gpt!");
    let result = router.route(&mut exchange, &mut ctx).unwrap();

    assert_eq!(result.routing_key, RoutingKey::Direct);
    assert_eq!(result.provider, "openai-main");
    assert_eq!(result.resolved_model_id, "gpt-4o");
    assert_eq!(exchange.payload["model"], "gpt-4o");
    assert!(!result.used_fallback);
}

#[test]
fn unconfigured_alias_falls_back_to_anthropic() {
    let config = UserConfig::from_yaml(CONFIG_YAML).unwrap();
    let router = router_from(&config);

    let mut exchange = ExchangeRequest::new(Channel::Claude, "claude-x", serde_json::json!({"messages": [], "max_tokens": 1000}), false);
    let mut ctx = RequestContext::new("corr-2", "claude-x");
    let result = router.route(&mut exchange, &mut ctx).unwrap();

    assert!(result.used_fallback);
    assert_eq!(result.provider, FALLBACK_PROVIDER_NAME);
    assert_eq!(result.resolved_model_id, "claude-x");
    assert_eq!(exchange.payload["model"], "claude-x");
}

#[test]
fn background_classification_reaches_configured_default_when_routing_key_unset() {
    let config = UserConfig::from_yaml(CONFIG_YAML).unwrap();
    let router = router_from(&config);

    let mut exchange = ExchangeRequest::new(Channel::Claude, "ignored", serde_json::json!({"messages": [], "max_tokens": 500}), false);
    let mut ctx = RequestContext::new("corr-3", "ignored");
    let result = router.route(&mut exchange, &mut ctx).unwrap();

    assert_eq!(result.routing_key, RoutingKey::Background);
    assert_eq!(result.provider, "openai-main");
    assert_eq!(result.resolved_model_id, "gpt-4o");
}
