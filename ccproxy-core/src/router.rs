//! Router (§4.4): maps an inspected request to a provider + resolved model
//! id. Owns the alias table built from config; does not own `ProviderClient`
//! instances — callers resolve the returned provider name to a client
//! themselves, keeping this module free of HTTP/transformer concerns.

use crate::config::RoutingConfig;
use crate::error::{ProxyError, Result};
use crate::inspector::{inspect, InspectionOutcome};
use crate::types::{Channel, ExchangeRequest, RequestContext, RoutingKey, RoutingResult};
use std::collections::HashMap;

/// One alias table entry: which provider serves it and what upstream model
/// id it resolves to.
#[derive(Debug, Clone)]
pub struct AliasTarget {
    pub provider: String,
    pub resolved_model_id: String,
}

/// Default Anthropic provider name used when no configured alias matches.
/// The actual client is constructed elsewhere from `CCPROXY_FALLBACK_URL` /
/// `CCPROXY_FALLBACK_API_KEY`; the Router only needs its name to stamp
/// `RoutingResult.provider`.
pub const FALLBACK_PROVIDER_NAME: &str = "__fallback_anthropic__";

pub struct Router {
    alias_table: HashMap<String, AliasTarget>,
    routing: RoutingConfig,
}

impl Router {
    pub fn new(alias_table: HashMap<String, AliasTarget>, routing: RoutingConfig) -> Self {
        Self { alias_table, routing }
    }

    /// Run the full precedence chain and mutate `exchange`/`ctx` per §4.4 step 3/5.
    pub fn route(&self, exchange: &mut ExchangeRequest, ctx: &mut RequestContext) -> Result<RoutingResult> {
        let result = match exchange.channel {
            Channel::Claude => self.route_claude(exchange)?,
            Channel::Codex => self.route_codex(exchange)?,
        };

        exchange.metadata.insert("routing_key".to_string(), result.routing_key.to_string());
        if let Some(obj) = exchange.payload.as_object_mut() {
            obj.insert("model".to_string(), serde_json::Value::String(result.resolved_model_id.clone()));
        }
        ctx.routing = Some(result.clone());
        Ok(result)
    }

    fn route_claude(&self, exchange: &ExchangeRequest) -> Result<RoutingResult> {
        let outcome = inspect(&exchange.payload, &exchange.model);

        let (routing_key, alias, is_direct_routing, is_agent_routing) = match outcome {
            InspectionOutcome::BuiltinTools => {
                (RoutingKey::BuiltinTools, self.routing.alias_for(RoutingKey::BuiltinTools).to_string(), false, false)
            }
            InspectionOutcome::AgentDirect(alias) => (RoutingKey::AgentDirect, alias, false, true),
            InspectionOutcome::Direct(alias) => (RoutingKey::Direct, alias, true, false),
            InspectionOutcome::Content(key) => (key, self.routing.alias_for(key).to_string(), false, false),
        };

        Ok(self.resolve(routing_key, alias, &exchange.model, Channel::Claude, is_direct_routing, is_agent_routing))
    }

    fn route_codex(&self, exchange: &ExchangeRequest) -> Result<RoutingResult> {
        let alias = exchange.model.clone();
        match self.alias_table.get(&alias) {
            Some(target) => Ok(RoutingResult {
                provider: target.provider.clone(),
                routing_key: RoutingKey::Default,
                model_alias: Some(alias),
                resolved_model_id: target.resolved_model_id.clone(),
                channel: Channel::Codex,
                is_direct_routing: false,
                is_agent_routing: false,
                used_fallback: false,
            }),
            None => Err(ProxyError::Routing(format!("codex channel: unknown model alias '{alias}'"))),
        }
    }

    fn resolve(
        &self,
        routing_key: RoutingKey,
        alias: String,
        original_model: &str,
        channel: Channel,
        is_direct_routing: bool,
        is_agent_routing: bool,
    ) -> RoutingResult {
        match self.alias_table.get(&alias) {
            Some(target) => RoutingResult {
                provider: target.provider.clone(),
                routing_key,
                model_alias: Some(alias),
                resolved_model_id: target.resolved_model_id.clone(),
                channel,
                is_direct_routing,
                is_agent_routing,
                used_fallback: false,
            },
            None => RoutingResult {
                provider: FALLBACK_PROVIDER_NAME.to_string(),
                routing_key,
                model_alias: Some(alias),
                // §4.4 step 4: resolved_model_id stays the original request model
                // string when falling back, not the (possibly stripped) alias.
                resolved_model_id: original_model.to_string(),
                channel,
                is_direct_routing,
                is_agent_routing,
                used_fallback: true,
            },
        }
    }
}
