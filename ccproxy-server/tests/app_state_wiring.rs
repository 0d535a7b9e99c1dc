//! `AppState::build` wiring a real parsed config into live `ProviderClient`s
//! plus the env-configured fallback client, and `Router`/`client_for`
//! composition resolving both a configured alias and an unconfigured one.
//! Covers spec.md §8's "End-to-end scenarios" 5 (fallback routing).

use ccproxy_core::config::UserConfig;
use ccproxy_core::router::FALLBACK_PROVIDER_NAME;
use ccproxy_core::types::{Channel, ExchangeRequest, RequestContext};
use ccproxy_server::app_state::AppState;

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

#[test]
fn configured_alias_routes_to_its_provider_client() {
    let config = UserConfig::from_yaml(CONFIG_YAML).unwrap();
    let state = AppState::build(&config).unwrap();

    let mut exchange = ExchangeRequest::new(Channel::Claude, "alias-gpt!", serde_json::json!({"messages": [], "max_tokens": 1000}), true);
    let mut ctx = RequestContext::new("corr-1", "alias-gpt!");
    let result = state.router.route(&mut exchange, &mut ctx).unwrap();

    assert!(!result.used_fallback);
    let client = state.client_for(&result.provider).unwrap();
    assert_eq!(client.name, "openai-main");
    assert_eq!(client.base_url, "https://api.openai.com");
}

#[test]
fn unconfigured_alias_resolves_through_client_for_to_the_fallback_client() {
    let config = UserConfig::from_yaml(CONFIG_YAML).unwrap();
    let state = AppState::build(&config).unwrap();

    let mut exchange = ExchangeRequest::new(Channel::Claude, "claude-3-5-sonnet", serde_json::json!({"messages": [], "max_tokens": 1000}), false);
    let mut ctx = RequestContext::new("corr-2", "claude-3-5-sonnet");
    let result = state.router.route(&mut exchange, &mut ctx).unwrap();

    assert!(result.used_fallback);
    assert_eq!(result.provider, FALLBACK_PROVIDER_NAME);
    let client = state.client_for(&result.provider).unwrap();
    assert_eq!(client.name, FALLBACK_PROVIDER_NAME);
}

#[test]
fn client_for_rejects_a_provider_name_the_router_never_produces() {
    let config = UserConfig::from_yaml(CONFIG_YAML).unwrap();
    let state = AppState::build(&config).unwrap();

    assert!(state.client_for("no-such-provider").is_err());
}
